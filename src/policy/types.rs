//! Core types for the SudoMode policy engine.
//!
//! These types define the intents agents submit, the rules that govern them,
//! and the decisions the engine hands back.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Pattern value that matches any resource or action.
pub const WILDCARD: &str = "*";

/// Reason returned when no rule matches an intent.
pub const NO_MATCH_REASON: &str = "No matching policy found - default deny";

/// An action an agent proposes instead of executing it directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// The resource being acted on (e.g. "stripe.charge", "database")
    pub resource: String,
    /// The action on that resource (e.g. "charge", "delete")
    pub action: String,
    /// Free-form arguments; conditions reach into these as `args.<key>`.
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl Intent {
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
            args: Map::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn with_args(mut self, args: Map<String, Value>) -> Self {
        self.args = args;
        self
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.action, self.resource)
    }
}

/// The three verdicts a rule can hand down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionStatus {
    Allow,
    Deny,
    RequireApproval,
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionStatus::Allow => write!(f, "ALLOW"),
            DecisionStatus::Deny => write!(f, "DENY"),
            DecisionStatus::RequireApproval => write!(f, "REQUIRE_APPROVAL"),
        }
    }
}

impl DecisionStatus {
    /// Parse a decision from a policy file. Accepts a few aliases so policy
    /// files can use either the wire spelling or lowercase.
    pub fn from_str_loose(s: &str) -> Option<DecisionStatus> {
        match s.trim().to_lowercase().as_str() {
            "allow" | "allowed" | "permit" => Some(DecisionStatus::Allow),
            "deny" | "denied" | "block" => Some(DecisionStatus::Deny),
            "require_approval" | "requires_approval" | "approval" | "ask" => {
                Some(DecisionStatus::RequireApproval)
            }
            _ => None,
        }
    }
}

/// A single rule in a policy. Rules are evaluated in order, first match wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Rule identifier, used in logs and decisions.
    pub name: String,
    /// Literal resource name or `*`.
    pub resource: String,
    /// Literal action name or `*`.
    pub action: String,
    /// Optional guard expression. Absent means the rule always applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    pub decision: DecisionStatus,
    /// Explanation returned to the caller (and shown to approvers).
    pub reason: String,
}

impl Rule {
    pub fn matches_resource(&self, resource: &str) -> bool {
        pattern_matches(&self.resource, resource)
    }

    pub fn matches_action(&self, action: &str) -> bool {
        pattern_matches(&self.action, action)
    }

    /// Human-readable description of this rule (used in logs and `check`).
    pub fn describe(&self) -> String {
        let mut desc = format!(
            "{}: {} {}:{}",
            self.name, self.decision, self.resource, self.action
        );
        if let Some(ref condition) = self.condition {
            desc.push_str(&format!(" if {}", condition));
        }
        desc
    }
}

fn pattern_matches(pattern: &str, value: &str) -> bool {
    pattern == WILDCARD || pattern == value
}

/// A complete policy, an ordered rule list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ordered list of rules. First match wins.
    pub rules: Vec<Rule>,
}

/// The engine's verdict on an intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub status: DecisionStatus,
    pub reason: String,
    /// Present only for `REQUIRE_APPROVAL`, once the request is recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Which rule produced the decision (None = default deny).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,
}

impl Decision {
    pub fn new(status: DecisionStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            request_id: None,
            matched_rule: None,
        }
    }

    /// The fail-safe verdict used whenever nothing matched.
    pub fn default_deny() -> Self {
        Self::new(DecisionStatus::Deny, NO_MATCH_REASON)
    }

    pub fn with_matched_rule(mut self, rule: impl Into<String>) -> Self {
        self.matched_rule = Some(rule.into());
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn is_allowed(&self) -> bool {
        self.status == DecisionStatus::Allow
    }

    pub fn is_denied(&self) -> bool {
        self.status == DecisionStatus::Deny
    }

    pub fn is_requires_approval(&self) -> bool {
        self.status == DecisionStatus::RequireApproval
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            DecisionStatus::Allow => write!(f, "allowed: {}", self.reason),
            DecisionStatus::Deny => write!(f, "denied: {}", self.reason),
            DecisionStatus::RequireApproval => {
                write!(f, "requires approval: {}", self.reason)
            }
        }
    }
}
