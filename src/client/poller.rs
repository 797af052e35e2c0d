//! The caller-side half of the approval flow.
//!
//! `SudoClient::execute` submits an intent and turns the verdict into a
//! plain outcome: `Ok(true)` to go ahead, `PermissionDenied` to stop. When the
//! verdict is REQUIRE_APPROVAL it waits for a human, checking the request's
//! status every `interval` and waking early if the API pushes a resolution
//! event. Timing out or cancelling only abandons the wait; the request
//! itself stays PENDING and can still be resolved.

use crate::approval::{ApprovalRequest, ApprovalStatus};
use crate::governance::{GovernanceService, ResolutionEvent};
use crate::policy::{Decision, DecisionStatus, Intent};
use async_trait::async_trait;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Floor for the spacing between status checks.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The operations a waiting caller needs from the governance side.
#[async_trait]
pub trait GovernanceApi: Send + Sync {
    async fn submit(&self, intent: &Intent) -> anyhow::Result<Decision>;

    async fn approval(&self, id: &str) -> anyhow::Result<ApprovalRequest>;

    /// Resolution events, when the implementation can push them.
    fn resolutions(&self) -> Option<broadcast::Receiver<ResolutionEvent>> {
        None
    }
}

#[async_trait]
impl GovernanceApi for GovernanceService {
    async fn submit(&self, intent: &Intent) -> anyhow::Result<Decision> {
        Ok(self.govern(intent))
    }

    async fn approval(&self, id: &str) -> anyhow::Result<ApprovalRequest> {
        Ok(self.get_approval(id)?)
    }

    fn resolutions(&self) -> Option<broadcast::Receiver<ResolutionEvent>> {
        Some(self.subscribe())
    }
}

#[async_trait]
impl<T: GovernanceApi + ?Sized> GovernanceApi for Arc<T> {
    async fn submit(&self, intent: &Intent) -> anyhow::Result<Decision> {
        (**self).submit(intent).await
    }

    async fn approval(&self, id: &str) -> anyhow::Result<ApprovalRequest> {
        (**self).approval(id).await
    }

    fn resolutions(&self) -> Option<broadcast::Receiver<ResolutionEvent>> {
        (**self).resolutions()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Spacing between status checks.
    pub interval: Duration,
    /// Give up waiting after this long. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }
}

impl PollOptions {
    /// Intervals below [`MIN_POLL_INTERVAL`] are raised to it.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Error)]
pub enum PollError {
    /// DENY, or a human rejected the request.
    #[error("permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("approval request '{request_id}' still pending after {waited:?}")]
    Timeout { request_id: String, waited: Duration },

    #[error("stopped waiting on approval request '{request_id}'")]
    Cancelled { request_id: String },

    #[error("decision requires approval but carries no request id")]
    MissingRequestId,

    #[error("governance API call failed")]
    Api(#[source] anyhow::Error),
}

impl PollError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, PollError::PermissionDenied { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PollError::Timeout { .. })
    }
}

pub struct SudoClient<A> {
    api: A,
}

impl<A: GovernanceApi> SudoClient<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub async fn execute(&self, intent: &Intent, options: &PollOptions) -> Result<bool, PollError> {
        self.execute_with_cancel(intent, options, CancellationToken::new())
            .await
    }

    /// Like [`execute`](Self::execute), but the wait stops as soon as
    /// `cancel` fires.
    pub async fn execute_with_cancel(
        &self,
        intent: &Intent,
        options: &PollOptions,
        cancel: CancellationToken,
    ) -> Result<bool, PollError> {
        // Subscribed before govern so a fast resolver can't slip in between.
        let events = self.api.resolutions();
        let decision = self.api.submit(intent).await.map_err(PollError::Api)?;

        match decision.status {
            DecisionStatus::Allow => Ok(true),
            DecisionStatus::Deny => Err(PollError::PermissionDenied {
                reason: decision.reason,
            }),
            DecisionStatus::RequireApproval => {
                let request_id = decision.request_id.ok_or(PollError::MissingRequestId)?;
                tracing::info!(request_id = %request_id, intent = %intent, "Waiting for approval");
                self.wait(&request_id, options, events, cancel).await
            }
        }
    }

    /// Wait on an existing request until it leaves PENDING.
    pub async fn wait_for_approval(
        &self,
        request_id: &str,
        options: &PollOptions,
        cancel: CancellationToken,
    ) -> Result<bool, PollError> {
        let events = self.api.resolutions();
        self.wait(request_id, options, events, cancel).await
    }

    async fn wait(
        &self,
        request_id: &str,
        options: &PollOptions,
        mut events: Option<broadcast::Receiver<ResolutionEvent>>,
        cancel: CancellationToken,
    ) -> Result<bool, PollError> {
        let started = Instant::now();
        let deadline = options.timeout.map(|t| started + t);

        loop {
            let record = self.api.approval(request_id).await.map_err(PollError::Api)?;
            match record.status {
                ApprovalStatus::Approved => return Ok(true),
                ApprovalStatus::Rejected => {
                    return Err(PollError::PermissionDenied {
                        reason: record.reason,
                    })
                }
                ApprovalStatus::Pending => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(PollError::Cancelled { request_id: request_id.to_string() });
                }
                _ = until(deadline) => {
                    return Err(PollError::Timeout {
                        request_id: request_id.to_string(),
                        waited: started.elapsed(),
                    });
                }
                _ = resolution_of(&mut events, request_id) => {}
                _ = sleep(options.interval.max(MIN_POLL_INTERVAL)) => {}
            }
        }
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

/// Completes when an event for `request_id` arrives, or when events may
/// have been dropped. Never completes once the channel is gone.
async fn resolution_of(
    events: &mut Option<broadcast::Receiver<ResolutionEvent>>,
    request_id: &str,
) {
    let Some(rx) = events.as_mut() else {
        return pending().await;
    };
    loop {
        match rx.recv().await {
            Ok(event) if event.id == request_id => return,
            Ok(_) => continue,
            Err(RecvError::Lagged(_)) => return,
            Err(RecvError::Closed) => break,
        }
    }
    *events = None;
    pending().await
}
