//! Gateway IPC protocol types.
//!
//! JSON messages exchanged between agents (or resolvers) and the SudoMode
//! server over a Unix domain socket, one message per line. Requests are
//! tagged by `op`, responses by `kind`.

use crate::approval::ApprovalRequest;
use crate::policy::types::{Decision, Intent};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GatewayRequest {
    /// Submit an intent for a decision.
    Govern {
        #[serde(flatten)]
        intent: Intent,
    },
    ListApprovals,
    GetApproval { id: String },
    Approve { id: String },
    Reject { id: String },
    Health,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GatewayResponse {
    Decision {
        #[serde(flatten)]
        decision: Decision,
    },
    Approvals { approvals: Vec<ApprovalRequest> },
    Approval {
        #[serde(flatten)]
        approval: ApprovalRequest,
    },
    NotFound { id: String },
    AlreadyResolved { id: String, status: crate::approval::ApprovalStatus },
    Error { message: String },
    Healthy { rules: usize, pending: usize },
}

impl GatewayResponse {
    /// Create an "error" response for malformed requests and internal failures.
    pub fn error(message: impl Into<String>) -> Self {
        GatewayResponse::Error {
            message: message.into(),
        }
    }

    /// Short name of the response variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayResponse::Decision { .. } => "decision",
            GatewayResponse::Approvals { .. } => "approvals",
            GatewayResponse::Approval { .. } => "approval",
            GatewayResponse::NotFound { .. } => "not_found",
            GatewayResponse::AlreadyResolved { .. } => "already_resolved",
            GatewayResponse::Error { .. } => "error",
            GatewayResponse::Healthy { .. } => "healthy",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalStatus;
    use crate::policy::types::DecisionStatus;
    use serde_json::json;

    #[test]
    fn test_govern_request_is_flat() {
        let line = r#"{"op":"govern","resource":"stripe.charge","action":"charge","args":{"amount":30}}"#;
        let request: GatewayRequest = serde_json::from_str(line).unwrap();
        assert_eq!(
            request,
            GatewayRequest::Govern {
                intent: Intent::new("stripe.charge", "charge").with_arg("amount", 30)
            }
        );
    }

    #[test]
    fn test_govern_request_args_default_to_empty() {
        let request: GatewayRequest =
            serde_json::from_str(r#"{"op":"govern","resource":"database","action":"read"}"#)
                .unwrap();
        let GatewayRequest::Govern { intent } = request else {
            panic!("expected govern");
        };
        assert!(intent.args.is_empty());
    }

    #[test]
    fn test_unit_ops() {
        let request: GatewayRequest = serde_json::from_str(r#"{"op":"health"}"#).unwrap();
        assert_eq!(request, GatewayRequest::Health);
        let request: GatewayRequest = serde_json::from_str(r#"{"op":"list_approvals"}"#).unwrap();
        assert_eq!(request, GatewayRequest::ListApprovals);
    }

    #[test]
    fn test_unknown_op_rejected() {
        assert!(serde_json::from_str::<GatewayRequest>(r#"{"op":"sudo"}"#).is_err());
    }

    #[test]
    fn test_decision_response_shape() {
        let response = GatewayResponse::Decision {
            decision: Decision::new(DecisionStatus::RequireApproval, "big")
                .with_request_id("req-1"),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            json!({
                "kind": "decision",
                "status": "REQUIRE_APPROVAL",
                "reason": "big",
                "request_id": "req-1"
            })
        );
        let back: GatewayResponse = serde_json::from_value(value).unwrap();
        assert_eq!(back, response);
    }

    #[test]
    fn test_already_resolved_response_shape() {
        let response = GatewayResponse::AlreadyResolved {
            id: "req-1".into(),
            status: ApprovalStatus::Rejected,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["kind"], "already_resolved");
        assert_eq!(value["status"], "REJECTED");
        assert_eq!(response.kind(), "already_resolved");
    }
}
