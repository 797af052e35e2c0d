//! Runtime settings shared by every subcommand.
//!
//! Each value can come from a flag or an environment variable; flags win.

use crate::audit::AuditLogger;
use crate::governance::{LogNotifier, Notifier, WebhookNotifier};
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Policy file (YAML)
    #[arg(long, global = true, env = "SUDOMODE_POLICIES_FILE", default_value = "policies.yaml")]
    pub policies: PathBuf,

    /// Gateway socket path
    #[arg(long, global = true, env = "SUDOMODE_SOCKET", default_value = "/tmp/sudomode.sock")]
    pub socket: PathBuf,

    /// Slack incoming-webhook URL for approval notifications
    #[arg(long, global = true, env = "SLACK_WEBHOOK_URL", hide_env_values = true)]
    pub slack_webhook_url: Option<String>,

    /// Base URL linked from approval notifications
    #[arg(
        long,
        global = true,
        env = "SUDOMODE_DASHBOARD_URL",
        default_value = "http://localhost:3000"
    )]
    pub dashboard_url: String,

    /// Audit log file [default: ~/.sudomode/logs/audit.jsonl]
    #[arg(long, global = true, env = "SUDOMODE_AUDIT_LOG")]
    pub audit_log: Option<PathBuf>,

    /// Seconds a single approval notification may take
    #[arg(long, global = true, env = "SUDOMODE_NOTIFY_TIMEOUT", default_value_t = 10)]
    pub notify_timeout: u64,
}

impl Settings {
    pub fn audit_log_path(&self) -> Result<PathBuf> {
        match self.audit_log {
            Some(ref path) => Ok(path.clone()),
            None => AuditLogger::default_path(),
        }
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout)
    }

    /// Webhook notifier when a URL is configured, otherwise log-only.
    pub fn notifier(&self) -> Result<Arc<dyn Notifier>> {
        match self.slack_webhook_url.as_deref().filter(|u| !u.trim().is_empty()) {
            Some(url) => Ok(Arc::new(WebhookNotifier::new(url, &self.dashboard_url)?)),
            None => {
                tracing::info!("SLACK_WEBHOOK_URL not set, approval notifications go to the log");
                Ok(Arc::new(LogNotifier))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        settings: Settings,
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = TestCli::parse_from([
            "sudomode",
            "--policies",
            "rules.yaml",
            "--socket",
            "/tmp/x.sock",
            "--audit-log",
            "/tmp/audit.jsonl",
            "--notify-timeout",
            "3",
        ]);
        assert_eq!(cli.settings.policies, PathBuf::from("rules.yaml"));
        assert_eq!(cli.settings.socket, PathBuf::from("/tmp/x.sock"));
        assert_eq!(
            cli.settings.audit_log_path().unwrap(),
            PathBuf::from("/tmp/audit.jsonl")
        );
        assert_eq!(cli.settings.notify_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_blank_webhook_falls_back_to_log() {
        let cli = TestCli::parse_from(["sudomode", "--slack-webhook-url", "  "]);
        assert!(cli.settings.notifier().is_ok());
    }
}
