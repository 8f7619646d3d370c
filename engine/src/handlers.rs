//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - serve: Run the HTTP API, with the Telegram bot alongside it
//! - bot: Run only the Telegram registration bot
//! - analyze: Distill a methodology document on the command line
//! - evaluate: Grade a single report on the command line
//! - doctor: Validate configuration and check dependencies

use anyhow::{Context, Result};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use crate::bot::TelegramBot;
use crate::config::Config;
use crate::grading::analyzer::MethodAnalyzer;
use crate::grading::{Criterion, MethodSummary, ReportEvaluator};
use crate::llm::gigachat::GigaChatProvider;
use crate::llm::ModelProvider;
use crate::roster::Roster;
use crate::server::{self, ServerState};
use crate::tasks::TaskManager;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Build the GigaChat provider from configuration
fn build_provider(config: &Config) -> Result<Arc<dyn ModelProvider>> {
    let credentials = config.llm.resolve_credentials().ok_or_else(|| {
        anyhow::anyhow!(
            "No GigaChat credentials configured. Set llm.credentials in config.toml or the GIGACHAT_CREDENTIALS environment variable."
        )
    })?;

    Ok(Arc::new(GigaChatProvider::new(
        config.llm.clone(),
        credentials,
    )))
}

/// Start the HTTP API
///
/// Assembles the task registry, the evaluator and the roster, then runs the
/// axum server until the process is stopped. When a Telegram token is
/// configured the registration bot polls in a background task; without one
/// the API still serves, but registration and report delivery are disabled.
pub async fn handle_serve(config: &Config) -> Result<()> {
    let provider = build_provider(config)?;

    std::fs::create_dir_all(&config.storage.method_dir).with_context(|| {
        format!(
            "Failed to create method directory {}",
            config.storage.method_dir.display()
        )
    })?;

    let analyzer = Arc::new(MethodAnalyzer::new(provider.clone()));
    let evaluator = Arc::new(ReportEvaluator::new(provider));
    let tasks = TaskManager::new(analyzer, config.storage.method_dir.clone());

    let roster = Roster::new(config.storage.roster_path.clone());
    roster
        .ensure_exists()
        .context("Failed to create the roster file")?;

    let bot = match config.bot.resolve_token() {
        Some(token) => {
            let bot = TelegramBot::new(token, roster.clone());
            let polling = bot.clone();
            tokio::spawn(async move {
                if let Err(e) = polling.start_polling().await {
                    tracing::error!("Telegram bot stopped: {}", e);
                }
            });
            bot
        }
        None => {
            tracing::warn!(
                "No Telegram token configured; registration and report delivery are disabled"
            );
            TelegramBot::new(String::new(), roster.clone())
        }
    };

    let state = ServerState::new(
        tasks,
        evaluator,
        roster,
        bot,
        config.storage.labs_dir.clone(),
    )
    .with_context(|| {
        format!(
            "Failed to create labs directory {}",
            config.storage.labs_dir.display()
        )
    })?;

    server::serve(state, &config.server.bind_addr()).await
}

/// Run only the Telegram registration bot
pub async fn handle_bot(config: &Config) -> Result<()> {
    let token = config.bot.resolve_token().ok_or_else(|| {
        anyhow::anyhow!(
            "No Telegram token configured. Set bot.token in config.toml or the TELEGRAM_BOT_TOKEN environment variable."
        )
    })?;

    let roster = Roster::new(config.storage.roster_path.clone());
    let bot = TelegramBot::new(token, roster);

    bot.start_polling().await
}

/// Analyze a methodology document and print the distilled summary
pub async fn handle_analyze(file: PathBuf, config: &Config, format: OutputFormat) -> Result<()> {
    let provider = build_provider(config)?;
    let analyzer = MethodAnalyzer::new(provider);

    let summary = analyzer
        .analyze(&file)
        .await
        .with_context(|| format!("Failed to analyze {}", file.display()))?;

    match format {
        OutputFormat::Text => {
            println!("Requirements ({}):", summary.requirements.len());
            for (i, requirement) in summary.requirements.iter().enumerate() {
                println!("  {}. {}", i + 1, requirement);
            }

            println!();
            println!("Summary:");
            for line in &summary.summary {
                println!("  - {}", line);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

/// Grade a lab report against a rubric
///
/// The rubric and the methodology summary are optional JSON files in the
/// same shapes the HTTP API accepts. Without them the model grades the
/// report with an empty rubric, which mirrors an empty form submission.
pub async fn handle_evaluate(
    file: PathBuf,
    criteria: Option<PathBuf>,
    summary: Option<PathBuf>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let provider = build_provider(config)?;
    let evaluator = ReportEvaluator::new(provider);

    let criteria: Vec<Criterion> = match criteria {
        Some(path) => {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        }
        None => Vec::new(),
    };

    let method: MethodSummary = match summary {
        Some(path) => {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        }
        None => MethodSummary::default(),
    };

    let result = evaluator
        .evaluate(&file, &criteria, &method.requirements, &method.summary)
        .await
        .with_context(|| format!("Failed to evaluate {}", file.display()))?;

    match format {
        OutputFormat::Text => {
            println!("Evaluation:");
            for record in &result.results {
                println!("  {:<30} {:.1}", record.criterion, record.score);
                for line in record.comment.lines() {
                    println!("    {}", line);
                }
            }

            println!();
            println!("Author: {}", result.author);
        }
        OutputFormat::Json => {
            let output = json!({
                "results": result.results,
                "author": result.author
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Run system diagnostics
///
/// This handler validates the configuration, checks the GigaChat and
/// Telegram secrets, probes the GigaChat OAuth endpoint, and reports
/// any issues.
pub async fn handle_doctor(config: &Config, format: OutputFormat) -> Result<()> {
    let mut issues = Vec::new();
    let mut checks = Vec::new();

    // Check 1: Configuration validation
    checks.push(("Configuration", "Valid"));
    // Config is already validated when loaded

    // Check 2: GigaChat credentials
    let credentials = config.llm.resolve_credentials();
    if credentials.is_some() {
        checks.push(("GigaChat credentials", "Configured"));
    } else {
        checks.push(("GigaChat credentials", "Not configured"));
        issues.push(
            "No GigaChat credentials. Set llm.credentials in config.toml or the GIGACHAT_CREDENTIALS environment variable."
                .to_string(),
        );
    }

    // Check 3: GigaChat reachability (token fetch against the OAuth endpoint)
    if let Some(credentials) = credentials {
        let provider = GigaChatProvider::new(config.llm.clone(), credentials);
        if provider.check_health().await {
            checks.push(("GigaChat API", "Reachable"));
        } else {
            checks.push(("GigaChat API", "Unreachable"));
            issues.push(
                "GigaChat did not answer the health check. Check the credentials and the network."
                    .to_string(),
            );
        }
    }

    // Check 4: Telegram token
    if config.bot.resolve_token().is_some() {
        checks.push(("Telegram token", "Configured"));
    } else {
        checks.push(("Telegram token", "Not configured"));
        issues.push(
            "No Telegram token. Registration and report delivery will be disabled.".to_string(),
        );
    }

    // Check 5: Storage
    if config.storage.method_dir.exists() {
        checks.push(("Method directory", "Exists"));
    } else {
        checks.push(("Method directory", "Missing (created on serve)"));
    }

    if config.storage.labs_dir.exists() {
        checks.push(("Labs directory", "Exists"));
    } else {
        checks.push(("Labs directory", "Missing (created on serve)"));
    }

    if config.storage.roster_path.exists() {
        checks.push(("Roster file", "Exists"));
    } else {
        checks.push(("Roster file", "Missing (created on first registration)"));
    }

    // Output results
    match format {
        OutputFormat::Text => {
            println!("Otsenka System Diagnostics");
            println!("============================");
            println!();

            println!("System Checks:");
            for (check, status) in &checks {
                println!("  {:<25} {}", format!("{}:", check), status);
            }

            println!();

            if issues.is_empty() {
                println!("✓ All checks passed!");
            } else {
                println!("⚠ Issues found:");
                println!();
                for (i, issue) in issues.iter().enumerate() {
                    println!("  {}. {}", i + 1, issue);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "checks": checks.iter().map(|(name, status)| {
                    json!({
                        "name": name,
                        "status": status
                    })
                }).collect::<Vec<_>>(),
                "issues": issues,
                "healthy": issues.is_empty()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
