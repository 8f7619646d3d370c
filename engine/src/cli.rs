//! CLI interface for Otsenka
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags for the grading engine.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Otsenka Grading Engine
///
/// Grades student lab reports against a rubric with GigaChat, distills
/// methodology documents into requirements in the background, and delivers
/// graded reports to students over Telegram.
#[derive(Parser, Debug)]
#[command(name = "otsenka")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP API (and the Telegram bot when a token is configured)
    Serve,

    /// Run only the Telegram registration bot
    Bot,

    /// Analyze a methodology document and print its distilled summary
    Analyze {
        /// Path to the .docx methodology file
        file: PathBuf,
    },

    /// Grade a lab report against a rubric
    Evaluate {
        /// Path to the .docx report file
        file: PathBuf,

        /// JSON file with the rubric (a list of {"criteria", "score"} objects)
        #[arg(long, value_name = "PATH")]
        criteria: Option<PathBuf>,

        /// JSON file with a methodology summary ({"requirements", "summary"})
        #[arg(long, value_name = "PATH")]
        summary: Option<PathBuf>,
    },

    /// Run system diagnostics
    Doctor,
}
