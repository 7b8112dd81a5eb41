use clap::{Parser, Subcommand};
use mail_diagnostics::AppResources;
use mail_diagnostics::api::start_webserver;
use mail_diagnostics::config::load_config;
use mail_diagnostics::render::render_html;
use mail_diagnostics::report::{ReportOptions, connect_lazy, report_for_url};
use rustls::crypto;
use rustls::crypto::CryptoProvider;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(version, about = "Diagnose the email configuration of the hotel management application")]
struct Cli {
    /// Configuration file, YAML. Environment variables override its values.
    #[arg(short, long, env = "MAIL_DIAGNOSTICS_CONFIG", default_value = "config.yaml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the diagnostics once and print the report to stdout.
    Report {
        /// Print plain text instead of HTML.
        #[arg(long)]
        text: bool,
    },
    /// Serve the report over HTTP.
    Serve,
}

fn initialize_standard_tracing() {
    let default_directives = "mail_diagnostics=info,sea_orm=warn,tower_http=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    // stdout carries the report itself.
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    initialize_standard_tracing();

    let cli = Cli::parse();
    let config = Arc::new(load_config(&cli.config)?);

    // rustls needs one process-wide provider when several are compiled in.
    let _ = CryptoProvider::install_default(crypto::ring::default_provider());

    match cli.command.unwrap_or(Command::Report { text: false }) {
        Command::Report { text } => {
            let report = report_for_url(&config.database_url, ReportOptions::from(config.as_ref())).await;
            if text {
                print!("{report}");
            } else {
                println!("{}", render_html(&report)?);
            }
        }
        Command::Serve => {
            let db = Arc::new(connect_lazy(&config.database_url, config.probe.timeout()).await?);
            tracing::info!(
                name = "main.serve.starting",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                listen_addr = %config.listen_addr,
                mail_library = ?mail_diagnostics::report::MailLibrary::detect(),
                message = "Starting email diagnostics service"
            );
            start_webserver(AppResources { db, config }).await?;
        }
    }
    Ok(())
}
