//! Audit log writer: append-only JSONL.
//!
//! One JSON object per line, flushed after every write. Defaults to
//! `~/.sudomode/logs/audit.jsonl`.

use crate::audit::types::LogEntry;
use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only audit logger that writes JSONL files.
pub struct AuditLogger {
    log_path: PathBuf,
    /// Kept open for the server's lifetime
    file: File,
    /// Entries written through this handle
    entry_count: usize,
}

impl AuditLogger {
    /// Open (or create) the log at `path`, creating parent directories.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let log_path = path.as_ref().to_path_buf();
        if let Some(parent) = log_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create log directory: {}", parent.display())
                })?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open log file: {}", log_path.display()))?;

        Ok(Self {
            log_path,
            file,
            entry_count: 0,
        })
    }

    /// Serialize and append one entry.
    pub fn log(&mut self, entry: &LogEntry) -> Result<()> {
        let json = serde_json::to_string(entry).context("Failed to serialize log entry")?;
        writeln!(self.file, "{}", json).context("Failed to write log entry")?;
        self.file.flush().context("Failed to flush log file")?;
        self.entry_count += 1;
        Ok(())
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// The default log directory (~/.sudomode/logs/).
    pub fn log_directory() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".sudomode").join("logs"))
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::log_directory()?.join("audit.jsonl"))
    }
}
