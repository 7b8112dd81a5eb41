//! Turns a [`DiagnosticReport`] into the human-readable checklist.
//!
//! Both renderers walk the same list of [`Block`]s so the HTML page and the
//! plain text output always say the same thing.

use askama::Template;
use std::fmt;

use crate::probe::ProbeOutcome;
use crate::report::{DiagnosticReport, MailLibrary};
use crate::schema::TableStatus;
use crate::settings::SettingsSummary;

const NOT_SET: &str = "Not set";
const MASKED: &str = "***SET***";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Ok,
    Info,
    Warning,
    Error,
}

impl Level {
    pub fn icon(&self) -> &'static str {
        match self {
            Level::Ok => "✅",
            Level::Info => "ℹ️",
            Level::Warning => "⚠️",
            Level::Error => "❌",
        }
    }

    pub fn css_class(&self) -> &'static str {
        match self {
            Level::Ok => "ok",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    pub label: &'static str,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Block {
    Heading(String),
    Notice { level: Level, text: String },
    List(Vec<Row>),
    Recommendation { text: String, command: String },
    Rule,
    Link { label: String, href: String },
    Trace(String),
}

fn notice(level: Level, text: impl Into<String>) -> Block {
    Block::Notice {
        level,
        text: text.into(),
    }
}

fn or_not_set(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| NOT_SET.to_string())
}

fn settings_rows(settings: &SettingsSummary) -> Vec<Row> {
    vec![
        Row {
            label: "SMTP Host",
            value: or_not_set(&settings.host),
        },
        Row {
            label: "SMTP Port",
            value: or_not_set(&settings.port),
        },
        Row {
            label: "SMTP Username",
            value: or_not_set(&settings.username),
        },
        Row {
            label: "SMTP Password",
            value: (if settings.password_set { MASKED } else { NOT_SET }).to_string(),
        },
        Row {
            label: "SMTP Encryption",
            value: or_not_set(&settings.encryption),
        },
        Row {
            label: "Hotel Name",
            value: or_not_set(&settings.hotel_name),
        },
    ]
}

/// Lays the report out in the order the checks ran.
pub fn blocks(report: &DiagnosticReport) -> Vec<Block> {
    let mut out = Vec::new();

    if report.database_connected {
        out.push(notice(Level::Ok, "Database connection successful"));
    }

    match report.email_log_table {
        Some(TableStatus::Existing) => out.push(notice(Level::Ok, "email_logs table exists")),
        Some(TableStatus::Created) => {
            out.push(notice(
                Level::Warning,
                "email_logs table missing - creating it...",
            ));
            out.push(notice(Level::Ok, "email_logs table created"));
        }
        None => {}
    }

    if let Some(settings) = &report.settings {
        out.push(Block::Heading("Current Email Settings:".into()));
        out.push(Block::List(settings_rows(settings)));
    }

    match report.mail_library {
        Some(MailLibrary::Lettre) => {
            out.push(notice(Level::Ok, "SMTP transport (lettre) available"));
        }
        Some(MailLibrary::Unavailable) => {
            out.push(notice(
                Level::Warning,
                "SMTP transport not compiled in - test emails cannot be sent from here",
            ));
            out.push(Block::Recommendation {
                text: "Build with the SMTP transport for email delivery:".into(),
                command: "cargo build --features smtp".into(),
            });
        }
        None => {}
    }

    match &report.missing_required {
        Some(missing) if !missing.is_empty() => {
            let keys: Vec<&str> = missing.iter().map(|k| k.as_str()).collect();
            out.push(notice(
                Level::Error,
                format!("Missing required settings: {}", keys.join(", ")),
            ));
        }
        Some(_) => out.push(notice(
            Level::Ok,
            "All required email settings are configured",
        )),
        None => {}
    }

    if let Some(probe) = &report.probe {
        out.push(Block::Heading("Testing SMTP Connection:".into()));
        match &probe.outcome {
            ProbeOutcome::Reachable => out.push(notice(
                Level::Ok,
                format!("SMTP server connection successful ({})", probe.target()),
            )),
            ProbeOutcome::Unreachable { error } => out.push(notice(
                Level::Error,
                format!(
                    "Cannot connect to SMTP server ({}) - Error: {error}",
                    probe.target()
                ),
            )),
        }
        out.push(notice(
            Level::Info,
            "Only TCP reachability was checked; login and TLS were not tested.",
        ));
    }

    if let Some(platform) = &report.platform_mail {
        out.push(Block::Heading("Platform Mail Configuration:".into()));
        out.push(Block::List(vec![
            Row {
                label: "sendmail_path",
                value: or_not_set(&platform.sendmail_path),
            },
            Row {
                label: "SMTP relay host",
                value: or_not_set(&platform.smtp_host),
            },
            Row {
                label: "SMTP relay port",
                value: or_not_set(&platform.smtp_port),
            },
        ]));
    }

    match &report.fatal {
        None => {
            out.push(Block::Rule);
            out.push(Block::Link {
                label: "Go to Settings".into(),
                href: report.settings_url.clone(),
            });
            out.push(Block::Link {
                label: "Test Email Configuration".into(),
                href: format!("{}#test-email", report.settings_url),
            });
        }
        Some(fatal) => {
            out.push(notice(Level::Error, format!("Error: {}", fatal.message)));
            out.push(Block::Heading("Stack trace:".into()));
            let trace = if fatal.trace.is_empty() {
                "(no further causes)".to_string()
            } else {
                fatal
                    .trace
                    .iter()
                    .enumerate()
                    .map(|(i, cause)| format!("#{i} {cause}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            out.push(Block::Trace(trace));
        }
    }

    out
}

#[derive(Template)]
#[template(path = "email_report.html")]
struct ReportPage<'a> {
    blocks: &'a [Block],
}

/// Renders the report as an HTML fragment. Every dynamic value is escaped.
#[tracing::instrument(skip(report))]
pub fn render_html(report: &DiagnosticReport) -> Result<String, askama::Error> {
    let blocks = blocks(report);
    ReportPage { blocks: &blocks }.render()
}

/// Plain text rendering, one line per entry.
impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Email Configuration Debug")?;
        for block in blocks(self) {
            match block {
                Block::Heading(text) => writeln!(f, "\n{text}")?,
                Block::Notice { level, text } => writeln!(f, "{} {text}", level.icon())?,
                Block::List(rows) => {
                    for row in rows {
                        writeln!(f, "  - {}: {}", row.label, row.value)?;
                    }
                }
                Block::Recommendation { text, command } => {
                    writeln!(f, "Recommendation: {text}\n    {command}")?
                }
                Block::Rule => writeln!(f, "----")?,
                Block::Link { label, href } => writeln!(f, "{label}: {href}")?,
                Block::Trace(trace) => writeln!(f, "{trace}")?,
            }
        }
        Ok(())
    }
}
