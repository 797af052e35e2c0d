//! Outbound notifications for requests that need a human.

use crate::policy::types::Intent;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Everything a notifier is told about a new approval request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApprovalNotice {
    pub request_id: String,
    pub intent: Intent,
    /// The reason from the rule that required approval
    pub reason: String,
}

/// Trait for approval notifiers.
/// Implementations can be webhook-based, log-only, etc. Delivery is
/// best-effort: the governance service never waits on the result.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: &ApprovalNotice) -> Result<()>;
}

/// Writes the notice to the log. Used when no webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notice: &ApprovalNotice) -> Result<()> {
        tracing::info!(
            request_id = %notice.request_id,
            resource = %notice.intent.resource,
            action = %notice.intent.action,
            reason = %notice.reason,
            "Approval required"
        );
        Ok(())
    }
}
