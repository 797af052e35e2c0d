//! Types for the approval flow.

use crate::policy::types::Intent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of an approval request. PENDING moves to exactly one terminal
/// state and never moves again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalStatus::Pending => write!(f, "PENDING"),
            ApprovalStatus::Approved => write!(f, "APPROVED"),
            ApprovalStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// What a resolver decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Approve,
    Reject,
}

impl Resolution {
    /// The terminal status this resolution moves a request into.
    pub fn status(&self) -> ApprovalStatus {
        match self {
            Resolution::Approve => ApprovalStatus::Approved,
            Resolution::Reject => ApprovalStatus::Rejected,
        }
    }
}

/// An intent suspended for human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Opaque, never reused.
    pub id: String,
    /// The originating intent (serialized inline as resource/action/args)
    #[serde(flatten)]
    pub intent: Intent,
    pub status: ApprovalStatus,
    /// Copied from the rule that required approval
    pub reason: String,
    pub created_at: DateTime<Utc>,
    /// Set exactly once, on the transition out of PENDING
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ApprovalRequest {
    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }
}
