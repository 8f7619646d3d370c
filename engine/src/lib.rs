//! Otsenka Engine Library
//!
//! This library provides the core functionality of the Otsenka grading
//! engine: docx extraction, GigaChat-backed evaluation, the background
//! task registry, the HTTP API and the Telegram registration bot.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Word document extraction module
pub mod docx;

/// Model provider abstraction layer
pub mod llm;

/// Report grading pipeline
pub mod grading;

/// Background task registry for methodology analysis
pub mod tasks;

/// Student roster persistence module
pub mod roster;

/// HTTP API module
pub mod server;

/// Telegram bot module
pub mod bot;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
