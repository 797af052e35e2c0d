//! Governance service: ties the policy engine to the approval store.
//!
//! `govern` evaluates an intent. ALLOW and DENY come straight back.
//! REQUIRE_APPROVAL records a PENDING request, fires the notifier on a
//! separate task and returns the request id without waiting for delivery.
//! `resolve` settles a request and broadcasts a [`ResolutionEvent`] so that
//! waiters in the same process wake up immediately.

use crate::approval::{ApprovalRequest, ApprovalStatus, ApprovalStore, Resolution, StoreError};
use crate::governance::notifier::{ApprovalNotice, Notifier};
use crate::policy::{Decision, DecisionStatus, Intent, PolicyEngine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Upper bound on a single notifier call.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

const EVENT_CAPACITY: usize = 256;

/// Reason returned when a REQUIRE_APPROVAL decision could not be recorded.
pub const UNRECORDED_APPROVAL_REASON: &str =
    "Approval required but the request could not be recorded - default deny";

/// Published whenever an approval request reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionEvent {
    pub id: String,
    pub status: ApprovalStatus,
}

pub struct GovernanceService {
    engine: Arc<PolicyEngine>,
    store: Arc<dyn ApprovalStore>,
    notifier: Arc<dyn Notifier>,
    events: broadcast::Sender<ResolutionEvent>,
    notify_timeout: Duration,
}

impl GovernanceService {
    pub fn new(
        engine: Arc<PolicyEngine>,
        store: Arc<dyn ApprovalStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            engine,
            store,
            notifier,
            events,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }

    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    pub fn engine(&self) -> &Arc<PolicyEngine> {
        &self.engine
    }

    /// Decide on an intent.
    pub fn govern(&self, intent: &Intent) -> Decision {
        let decision = self.engine.evaluate(intent);
        if decision.status != DecisionStatus::RequireApproval {
            return decision;
        }

        let request_id = match self.store.create(intent.clone(), decision.reason.clone()) {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(error = %e, intent = %intent, "Failed to record approval request");
                let mut denied = Decision::new(DecisionStatus::Deny, UNRECORDED_APPROVAL_REASON);
                denied.matched_rule = decision.matched_rule;
                return denied;
            }
        };

        tracing::info!(
            request_id = %request_id,
            intent = %intent,
            reason = %decision.reason,
            "Intent suspended pending approval"
        );

        self.dispatch_notification(ApprovalNotice {
            request_id: request_id.clone(),
            intent: intent.clone(),
            reason: decision.reason.clone(),
        });

        decision.with_request_id(request_id)
    }

    pub fn get_approval(&self, id: &str) -> Result<ApprovalRequest, StoreError> {
        self.store.get(id)
    }

    pub fn list_approvals(&self) -> Vec<ApprovalRequest> {
        self.store.list()
    }

    /// Settle a pending request and tell any listeners.
    pub fn resolve(
        &self,
        id: &str,
        resolution: Resolution,
    ) -> Result<ApprovalRequest, StoreError> {
        let record = self.store.resolve(id, resolution)?;
        tracing::info!(request_id = %id, status = %record.status, "Approval request resolved");

        // No receivers is fine; the record is already visible to pollers.
        let _ = self.events.send(ResolutionEvent {
            id: record.id.clone(),
            status: record.status,
        });
        Ok(record)
    }

    pub fn approve(&self, id: &str) -> Result<ApprovalRequest, StoreError> {
        self.resolve(id, Resolution::Approve)
    }

    pub fn reject(&self, id: &str) -> Result<ApprovalRequest, StoreError> {
        self.resolve(id, Resolution::Reject)
    }

    /// Listen for resolutions. Subscribe before checking a request's status
    /// to avoid missing an event in between.
    pub fn subscribe(&self) -> broadcast::Receiver<ResolutionEvent> {
        self.events.subscribe()
    }

    /// Fire-and-forget: runs the notifier on its own task, bounded by a
    /// timeout. No retries.
    fn dispatch_notification(&self, notice: ApprovalNotice) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(
                    request_id = %notice.request_id,
                    "No async runtime available, approval notification skipped"
                );
                return;
            }
        };

        let notifier = self.notifier.clone();
        let timeout = self.notify_timeout;
        handle.spawn(async move {
            match tokio::time::timeout(timeout, notifier.notify(&notice)).await {
                Ok(Ok(())) => {
                    tracing::debug!(request_id = %notice.request_id, "Approval notification sent");
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        request_id = %notice.request_id,
                        error = %format!("{:#}", e),
                        "Failed to send approval notification"
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        request_id = %notice.request_id,
                        timeout_ms = timeout.as_millis() as u64,
                        "Approval notification timed out"
                    );
                }
            }
        });
    }
}
