//! Record of every email the application attempted to send.
//!
//! Rows are written by the sending side (including test emails); the
//! diagnostics only make sure the table exists.

use sea_orm::entity::prelude::*;
use serde::Serialize;
use time::OffsetDateTime;
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, ToSchema)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailType {
    #[sea_orm(string_value = "EXPORT")]
    Export,
    #[sea_orm(string_value = "REPORT")]
    Report,
    #[sea_orm(string_value = "NOTIFICATION")]
    Notification,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, ToSchema)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailStatus {
    #[sea_orm(string_value = "SENT")]
    Sent,
    #[sea_orm(string_value = "FAILED")]
    Failed,
    #[sea_orm(string_value = "PENDING")]
    Pending,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, ToSchema)]
#[sea_orm(table_name = "email_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub recipient_email: String,
    pub subject: String,
    pub email_type: EmailType,
    pub status: EmailStatus,
    #[sea_orm(column_type = "Text", nullable)]
    pub response_data: Option<String>,
    /// References `users.id`.
    pub admin_id: i32,
    #[schema(value_type = String)]
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
