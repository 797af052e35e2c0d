//! Audit log reader: filter, summarize and display entries.
//!
//! Backs the `sudomode log` command.

use crate::audit::types::*;
use anyhow::{Context, Result};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

pub struct AuditReader {
    log_path: PathBuf,
}

impl AuditReader {
    pub fn new(log_path: impl AsRef<Path>) -> Self {
        Self {
            log_path: log_path.as_ref().to_path_buf(),
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Every entry in the log. A log that doesn't exist yet is empty.
    pub fn read_all(&self) -> Result<Vec<LogEntry>> {
        if !self.log_path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.log_path)
            .with_context(|| format!("Failed to read log file: {}", self.log_path.display()))?;

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("Failed to parse log entry at line {}", i + 1))
            })
            .collect()
    }

    /// Distinct session ids, in the order they first appear.
    pub fn sessions(entries: &[LogEntry]) -> Vec<String> {
        let mut sessions: Vec<String> = Vec::new();
        for entry in entries {
            if !sessions.contains(&entry.session_id) {
                sessions.push(entry.session_id.clone());
            }
        }
        sessions
    }

    /// Entries matching every set criterion. `limit` keeps the most recent.
    pub fn filter_entries(entries: &[LogEntry], filter: &LogFilter) -> Vec<LogEntry> {
        let matched: Vec<&LogEntry> = entries
            .iter()
            .filter(|e| {
                filter.session_id.as_ref().map_or(true, |s| e.session_id == *s)
                    && filter.event.map_or(true, |ev| e.event == ev)
                    && filter.outcome.map_or(true, |o| e.outcome == o)
                    && filter.resource.as_ref().map_or(true, |r| e.resource == *r)
            })
            .collect();

        let skip = filter
            .limit
            .map_or(0, |limit| matched.len().saturating_sub(limit));
        matched.into_iter().skip(skip).cloned().collect()
    }

    pub fn summarize(entries: &[LogEntry]) -> AuditSummary {
        let mut summary = AuditSummary {
            total_entries: entries.len(),
            start_time: entries.first().map(|e| e.timestamp),
            end_time: entries.last().map(|e| e.timestamp),
            ..Default::default()
        };

        for entry in entries {
            match entry.outcome {
                Outcome::Allow => summary.allowed += 1,
                Outcome::Deny => summary.denied += 1,
                Outcome::RequireApproval => summary.require_approval += 1,
                Outcome::Approved => summary.approved += 1,
                Outcome::Rejected => summary.rejected += 1,
            }
        }

        summary
    }

    /// Pretty-print a log entry for terminal display.
    pub fn format_entry(entry: &LogEntry) -> String {
        let timestamp = entry.timestamp.format("%H:%M:%S").to_string();
        let outcome = entry.outcome.to_string();
        let outcome = match entry.outcome {
            Outcome::Allow | Outcome::Approved => outcome.green(),
            Outcome::Deny | Outcome::Rejected => outcome.red(),
            Outcome::RequireApproval => outcome.yellow(),
        };

        let mut line = format!(
            "[{}] {} {} on {}",
            timestamp.dimmed(),
            outcome,
            entry.action.bold(),
            entry.resource
        );

        if let Some(ref id) = entry.request_id {
            line.push_str(&format!(" [{}]", id.cyan()));
        }
        if let Some(ref rule) = entry.matched_rule {
            line.push_str(&format!(" ({})", rule.dimmed()));
        }

        line
    }
}
