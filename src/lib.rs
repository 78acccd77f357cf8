pub mod audit;
pub mod bulk;
pub mod commands;
pub mod config;
pub mod db;
pub mod ingest;
pub mod linking;
pub mod models;
pub mod status;

use tracing_subscriber::EnvFilter;

use crate::commands::{execute, Cli, CommandError};
use crate::config::IngestConfig;

/// Consistency checks on the static tables, run once before any command.
pub fn startup_checks() -> Result<(), CommandError> {
    status::aliases::validate()?;
    let rules = status::validate_rules()?;
    tracing::debug!(rules, "Classification rules validated");
    Ok(())
}

pub fn run(cli: Cli) -> Result<(), CommandError> {
    // Initialize tracing
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .try_init();

    tracing::info!("Procsync starting v{}", config::APP_VERSION);
    startup_checks()?;

    let db_path = cli.db.unwrap_or_else(config::database_path);
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = db::open_database(&db_path)?;
    tracing::debug!(path = %db_path.display(), "Database opened");

    let output = execute(&conn, &cli.command, &IngestConfig::from_env())?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
