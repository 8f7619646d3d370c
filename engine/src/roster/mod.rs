//! Student roster
//!
//! A small CSV file (`ID,ФИО,Группа,Почта`) shared by the registration
//! bot, which appends a row per completed registration, and the report
//! delivery endpoint, which resolves a student's chat id from the name
//! embedded in an uploaded filename.

use std::fs::OpenOptions;
use std::path::PathBuf;

/// Errors from roster file operations
#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("roster I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("roster format error: {0}")]
    Csv(#[from] csv::Error),
}

const HEADER: [&str; 4] = ["ID", "ФИО", "Группа", "Почта"];

/// One registered student
#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub user_id: i64,
    pub full_name: String,
    pub group: String,
    pub email: String,
}

/// Handle to the roster file; all operations re-open the file, so external
/// edits between calls are picked up.
#[derive(Debug, Clone)]
pub struct Roster {
    path: PathBuf,
}

impl Roster {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Create the file with its header row when it does not exist yet.
    pub fn ensure_exists(&self) -> Result<(), RosterError> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut writer = csv::Writer::from_path(&self.path)?;
        writer.write_record(HEADER)?;
        writer.flush()?;
        tracing::info!(path = %self.path.display(), "created roster file");
        Ok(())
    }

    /// Whether a chat id already has a roster row
    pub fn is_registered(&self, user_id: i64) -> Result<bool, RosterError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)?;
        let needle = user_id.to_string();
        for record in reader.records() {
            let record = record?;
            if record.get(0) == Some(needle.as_str()) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Append one registration row
    pub fn append(&self, entry: &RosterEntry) -> Result<(), RosterError> {
        self.ensure_exists()?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record([
            entry.user_id.to_string().as_str(),
            entry.full_name.as_str(),
            entry.group.as_str(),
            entry.email.as_str(),
        ])?;
        writer.flush()?;
        Ok(())
    }

    /// Find a student whose name column contains `name`, case-insensitive.
    /// First matching row wins; rows with an unreadable id are skipped.
    pub fn find_by_name(&self, name: &str) -> Result<Option<i64>, RosterError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)?;
        let needle = name.to_lowercase();
        for record in reader.records() {
            let record = record?;
            let full_name = record.get(1).unwrap_or_default();
            if full_name.trim().to_lowercase().contains(&needle) {
                match record.get(0).unwrap_or_default().parse::<i64>() {
                    Ok(user_id) => return Ok(Some(user_id)),
                    Err(_) => {
                        tracing::warn!(row = ?record, "roster row with unreadable id");
                        continue;
                    }
                }
            }
        }
        Ok(None)
    }
}
