//! Types for the SudoMode audit log.
//!
//! Every governed intent and every human resolution gets one entry.

use crate::approval::{ApprovalRequest, ApprovalStatus};
use crate::policy::types::{Decision, DecisionStatus, Intent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// What kind of thing happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    /// An intent went through the policy engine
    Governed,
    /// A human approved or rejected a pending request
    Resolved,
}

impl AuditEvent {
    pub fn from_str_loose(s: &str) -> Option<AuditEvent> {
        match s.trim().to_lowercase().as_str() {
            "governed" | "govern" | "decision" => Some(AuditEvent::Governed),
            "resolved" | "resolve" | "resolution" => Some(AuditEvent::Resolved),
            _ => None,
        }
    }
}

/// The result recorded for an entry: a decision or a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Allow,
    Deny,
    RequireApproval,
    Approved,
    Rejected,
}

impl Outcome {
    pub fn from_str_loose(s: &str) -> Option<Outcome> {
        match s.trim().to_lowercase().as_str() {
            "allow" | "allowed" => Some(Outcome::Allow),
            "deny" | "denied" => Some(Outcome::Deny),
            "require_approval" | "approval" | "pending" => Some(Outcome::RequireApproval),
            "approved" | "approve" => Some(Outcome::Approved),
            "rejected" | "reject" => Some(Outcome::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Allow => "ALLOW",
            Outcome::Deny => "DENY",
            Outcome::RequireApproval => "REQUIRE_APPROVAL",
            Outcome::Approved => "APPROVED",
            Outcome::Rejected => "REJECTED",
        };
        f.write_str(s)
    }
}

impl From<DecisionStatus> for Outcome {
    fn from(status: DecisionStatus) -> Self {
        match status {
            DecisionStatus::Allow => Outcome::Allow,
            DecisionStatus::Deny => Outcome::Deny,
            DecisionStatus::RequireApproval => Outcome::RequireApproval,
        }
    }
}

impl From<ApprovalStatus> for Outcome {
    fn from(status: ApprovalStatus) -> Self {
        match status {
            ApprovalStatus::Pending => Outcome::RequireApproval,
            ApprovalStatus::Approved => Outcome::Approved,
            ApprovalStatus::Rejected => Outcome::Rejected,
        }
    }
}

/// A single entry in the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,

    /// Server session identifier (UUID, generated at `sudomode serve` start)
    pub session_id: String,

    pub event: AuditEvent,

    pub resource: String,

    pub action: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub args: Map<String, Value>,

    pub outcome: Outcome,

    pub reason: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Which policy rule matched (if any)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,

    /// How long the governance call took (microseconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_duration_us: Option<u64>,
}

impl LogEntry {
    pub fn governed(
        session_id: &str,
        intent: &Intent,
        decision: &Decision,
        eval_duration_us: u64,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            event: AuditEvent::Governed,
            resource: intent.resource.clone(),
            action: intent.action.clone(),
            args: intent.args.clone(),
            outcome: decision.status.into(),
            reason: decision.reason.clone(),
            request_id: decision.request_id.clone(),
            matched_rule: decision.matched_rule.clone(),
            eval_duration_us: Some(eval_duration_us),
        }
    }

    pub fn resolved(session_id: &str, record: &ApprovalRequest) -> Self {
        Self {
            timestamp: record.resolved_at.unwrap_or_else(Utc::now),
            session_id: session_id.to_string(),
            event: AuditEvent::Resolved,
            resource: record.intent.resource.clone(),
            action: record.intent.action.clone(),
            args: Map::new(),
            outcome: record.status.into(),
            reason: record.reason.clone(),
            request_id: Some(record.id.clone()),
            matched_rule: None,
            eval_duration_us: None,
        }
    }
}

/// Counts over a set of audit entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub total_entries: usize,
    pub allowed: usize,
    pub denied: usize,
    pub require_approval: usize,
    pub approved: usize,
    pub rejected: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl AuditSummary {
    pub fn one_line(&self) -> String {
        format!(
            "{} entries | {} allowed | {} denied | {} held | {} approved | {} rejected",
            self.total_entries,
            self.allowed,
            self.denied,
            self.require_approval,
            self.approved,
            self.rejected
        )
    }
}

/// Filter criteria for querying audit logs.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub session_id: Option<String>,
    pub event: Option<AuditEvent>,
    pub outcome: Option<Outcome>,
    pub resource: Option<String>,
    pub limit: Option<usize>,
}
