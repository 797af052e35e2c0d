//! `sudomode log`: browse the audit log.
//!
//! Shows every governed intent and every resolution, filtered and
//! summarized.

use crate::audit::{AuditEvent, AuditReader, LogFilter, Outcome};
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

#[derive(Debug, Default)]
pub struct LogOptions {
    pub session: Option<String>,
    pub event: Option<String>,
    pub outcome: Option<String>,
    pub resource: Option<String>,
    pub limit: Option<usize>,
    pub summary_only: bool,
}

impl LogOptions {
    fn filter(&self) -> Result<LogFilter> {
        let event = match self.event.as_deref() {
            Some(raw) => Some(
                AuditEvent::from_str_loose(raw)
                    .with_context(|| format!("Unknown event '{}' (governed, resolved)", raw))?,
            ),
            None => None,
        };
        let outcome = match self.outcome.as_deref() {
            Some(raw) => Some(Outcome::from_str_loose(raw).with_context(|| {
                format!(
                    "Unknown outcome '{}' (allow, deny, require_approval, approved, rejected)",
                    raw
                )
            })?),
            None => None,
        };
        Ok(LogFilter {
            session_id: self.session.clone(),
            event,
            outcome,
            resource: self.resource.clone(),
            limit: self.limit,
        })
    }
}

pub fn run_log(log_path: &Path, options: &LogOptions) -> Result<()> {
    let filter = options.filter()?;
    let reader = AuditReader::new(log_path);
    let entries = reader.read_all()?;

    if entries.is_empty() {
        println!();
        println!("  {} No audit entries in {}.", "ℹ".blue(), log_path.display());
        println!("  Start the server first:");
        println!("    {}", "sudomode serve".dimmed());
        println!();
        return Ok(());
    }

    let filtered = AuditReader::filter_entries(&entries, &filter);
    let summary = AuditReader::summarize(&filtered);

    println!();
    if !options.summary_only {
        for entry in &filtered {
            println!("  {}", AuditReader::format_entry(entry));
        }
        println!();
    }

    println!(
        "  {} total | {} allowed | {} denied | {} held | {} approved | {} rejected",
        summary.total_entries.to_string().bold(),
        summary.allowed.to_string().green().bold(),
        summary.denied.to_string().red().bold(),
        summary.require_approval.to_string().yellow().bold(),
        summary.approved.to_string().green(),
        summary.rejected.to_string().red(),
    );
    if let (Some(start), Some(end)) = (summary.start_time, summary.end_time) {
        println!("  Span: {}", format_duration((end - start).num_seconds()));
    }
    println!();

    Ok(())
}

/// List the server sessions recorded in the log.
pub fn run_log_sessions(log_path: &Path) -> Result<()> {
    let entries = AuditReader::new(log_path).read_all()?;
    let sessions = AuditReader::sessions(&entries);

    println!();
    if sessions.is_empty() {
        println!("  {} No sessions found.", "ℹ".blue());
        println!();
        return Ok(());
    }

    println!("  {} Recorded sessions:", "📋".to_string().bold());
    println!();
    for session in &sessions {
        let count = entries.iter().filter(|e| e.session_id == *session).count();
        println!("  • {} ({} entries)", session, count);
    }
    println!();
    println!("  View a session: {}", "sudomode log --session <id>".dimmed());
    println!();

    Ok(())
}

fn format_duration(seconds: i64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_parses_aliases() {
        let options = LogOptions {
            event: Some("resolve".into()),
            outcome: Some("rejected".into()),
            limit: Some(5),
            ..Default::default()
        };
        let filter = options.filter().unwrap();
        assert_eq!(filter.event, Some(AuditEvent::Resolved));
        assert_eq!(filter.outcome, Some(Outcome::Rejected));
        assert_eq!(filter.limit, Some(5));
    }

    #[test]
    fn test_unknown_outcome_is_an_error() {
        let options = LogOptions {
            outcome: Some("maybe".into()),
            ..Default::default()
        };
        assert!(options.filter().is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(7260), "2h 1m");
    }
}
