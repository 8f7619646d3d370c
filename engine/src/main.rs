// Otsenka Grading Engine
// Main entry point for the otsenka binary

use clap::Parser;
use otsenka_engine::cli::{Cli, Command};
use otsenka_engine::config::Config;
use otsenka_engine::handlers::{
    handle_analyze, handle_bot, handle_doctor, handle_evaluate, handle_serve, OutputFormat,
};
use otsenka_engine::telemetry::{init_telemetry, init_telemetry_with_level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize basic telemetry first (before config is loaded)
    init_telemetry();

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Otsenka Engine v{} ({} - {})", version, commit, timestamp);

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // Re-initialize telemetry with the --log or config-driven log level
    // (only takes effect if RUST_LOG env var is not set)
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    // Handle commands
    match cli.command {
        Command::Serve => {
            tracing::info!("Starting HTTP API...");
            handle_serve(&config).await
        }

        Command::Bot => {
            tracing::info!("Starting Telegram bot...");
            handle_bot(&config).await
        }

        Command::Analyze { file } => handle_analyze(file, &config, format).await,

        Command::Evaluate {
            file,
            criteria,
            summary,
        } => handle_evaluate(file, criteria, summary, &config, format).await,

        Command::Doctor => {
            tracing::info!("Running diagnostics...");
            handle_doctor(&config, format).await
        }
    }
}
