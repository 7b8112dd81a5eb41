//! On-demand creation of the `email_logs` table.

use sea_orm::sea_query::{ColumnDef, Expr, ForeignKey, ForeignKeyAction, Table, TableCreateStatement};
use sea_orm::{ActiveEnum, ConnectionTrait, DbErr, DeriveIden, EntityTrait, QuerySelect};
use serde::Serialize;

use crate::entity::email_log::{self, EmailStatus, EmailType};
use crate::error::DiagnosticError;

/// Outcome of [`ensure_email_log_table`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Existing,
    Created,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}

/// `CREATE TABLE IF NOT EXISTS email_logs (...)` for any supported backend.
pub fn email_log_table() -> TableCreateStatement {
    use email_log::Column;

    Table::create()
        .table(email_log::Entity)
        .if_not_exists()
        .col(
            ColumnDef::new(Column::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(ColumnDef::new(Column::RecipientEmail).string_len(255).not_null())
        .col(ColumnDef::new(Column::Subject).string_len(255).not_null())
        .col(
            ColumnDef::new(Column::EmailType)
                .string_len(16)
                .not_null()
                .check(Expr::col(Column::EmailType).is_in(EmailType::values())),
        )
        .col(
            ColumnDef::new(Column::Status)
                .string_len(16)
                .not_null()
                .default(EmailStatus::Pending.to_value())
                .check(Expr::col(Column::Status).is_in(EmailStatus::values())),
        )
        .col(ColumnDef::new(Column::ResponseData).text().null())
        .col(ColumnDef::new(Column::AdminId).integer().not_null())
        .col(
            ColumnDef::new(Column::SentAt)
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .foreign_key(
            ForeignKey::create()
                .name("fk_email_logs_admin_id")
                .from(email_log::Entity, Column::AdminId)
                .to(Users::Table, Users::Id)
                .on_delete(ForeignKeyAction::Restrict),
        )
        .to_owned()
}

async fn probe_table<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    email_log::Entity::find().limit(0).all(db).await.map(|_| ())
}

/// Makes sure `email_logs` exists, creating it when the metadata query fails.
///
/// Safe to call repeatedly: the create statement is `IF NOT EXISTS` and only
/// runs when the table could not be queried.
#[tracing::instrument(skip(db))]
pub async fn ensure_email_log_table<C: ConnectionTrait>(
    db: &C,
) -> Result<TableStatus, DiagnosticError> {
    let Err(probe_err) = probe_table(db).await else {
        return Ok(TableStatus::Existing);
    };

    tracing::warn!(
        name = "diagnostics.schema.email_logs_missing",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        error = %probe_err,
        message = "email_logs table missing, creating it"
    );

    let backend = db.get_database_backend();
    db.execute(backend.build(&email_log_table())).await?;

    probe_table(db)
        .await
        .map_err(DiagnosticError::LogTableUnavailable)?;

    tracing::info!(
        name = "diagnostics.schema.email_logs_created",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        message = "email_logs table created"
    );
    Ok(TableStatus::Created)
}
