//! Wire-level gateway tests: raw JSON lines against a live server socket.

use serde_json::{json, Value};
use std::sync::Arc;
use sudomode::approval::InMemoryApprovalStore;
use sudomode::gateway::GatewayServer;
use sudomode::governance::{GovernanceService, LogNotifier};
use sudomode::policy::{parser, PolicyEngine};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio_util::sync::CancellationToken;

struct Harness {
    _dir: TempDir,
    socket: std::path::PathBuf,
    shutdown: CancellationToken,
    task: tokio::task::JoinHandle<anyhow::Result<()>>,
}

async fn start() -> Harness {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("sudomode.sock");

    let yaml = include_str!("fixtures/test_policy.yaml");
    let service = GovernanceService::new(
        Arc::new(PolicyEngine::new(parser::parse_policy_str(yaml).unwrap())),
        Arc::new(InMemoryApprovalStore::new()),
        Arc::new(LogNotifier),
    );
    let server = GatewayServer::new(&socket, Arc::new(service), "wire-test");
    let listener = server.bind().unwrap();

    let shutdown = CancellationToken::new();
    let task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { server.serve(listener, shutdown).await })
    };

    Harness {
        _dir: dir,
        socket,
        shutdown,
        task,
    }
}

/// Send each line on one connection and collect one response per line.
async fn exchange(socket: &std::path::Path, lines: &[&str]) -> Vec<Value> {
    let stream = UnixStream::connect(socket).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut responses = Vec::new();

    for line in lines {
        writer.write_all(line.as_bytes()).await.unwrap();
        writer.write_all(b"\n").await.unwrap();
        let mut response = String::new();
        reader.read_line(&mut response).await.unwrap();
        responses.push(serde_json::from_str(response.trim()).unwrap());
    }
    responses
}

#[tokio::test]
async fn test_govern_over_the_wire() {
    let h = start().await;
    let responses = exchange(
        &h.socket,
        &[
            r#"{"op":"govern","resource":"stripe.charge","action":"charge","args":{"amount":30}}"#,
            r#"{"op":"govern","resource":"database","action":"delete"}"#,
        ],
    )
    .await;

    assert_eq!(responses[0]["kind"], "decision");
    assert_eq!(responses[0]["status"], "ALLOW");
    assert_eq!(responses[0]["matched_rule"], "small-charges");

    assert_eq!(responses[1]["status"], "DENY");
    assert_eq!(
        responses[1]["reason"],
        "No matching policy found - default deny"
    );

    h.shutdown.cancel();
    h.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_approval_lifecycle_over_the_wire() {
    let h = start().await;

    let held = exchange(
        &h.socket,
        &[r#"{"op":"govern","resource":"stripe.charge","action":"charge","args":{"amount":5000}}"#],
    )
    .await;
    assert_eq!(held[0]["status"], "REQUIRE_APPROVAL");
    let id = held[0]["request_id"].as_str().unwrap().to_string();

    let get = json!({"op": "get_approval", "id": id}).to_string();
    let approve = json!({"op": "approve", "id": id}).to_string();
    let reject = json!({"op": "reject", "id": id}).to_string();
    let responses = exchange(
        &h.socket,
        &[&get, &approve, &reject, r#"{"op":"list_approvals"}"#, r#"{"op":"health"}"#],
    )
    .await;

    assert_eq!(responses[0]["kind"], "approval");
    assert_eq!(responses[0]["status"], "PENDING");
    assert_eq!(responses[0]["resource"], "stripe.charge");
    assert_eq!(responses[0]["args"]["amount"], 5000);

    assert_eq!(responses[1]["kind"], "approval");
    assert_eq!(responses[1]["status"], "APPROVED");
    assert!(responses[1]["resolved_at"].is_string());

    assert_eq!(responses[2]["kind"], "already_resolved");
    assert_eq!(responses[2]["status"], "APPROVED");

    assert_eq!(responses[3]["kind"], "approvals");
    assert_eq!(responses[3]["approvals"].as_array().unwrap().len(), 1);

    assert_eq!(responses[4], json!({"kind": "healthy", "rules": 5, "pending": 0}));

    h.shutdown.cancel();
    h.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_bad_input_gets_error_and_connection_survives() {
    let h = start().await;
    let responses = exchange(
        &h.socket,
        &[
            "this is not json",
            r#"{"op":"format_disk"}"#,
            r#"{"op":"get_approval","id":"nope"}"#,
            r#"{"op":"health"}"#,
        ],
    )
    .await;

    assert_eq!(responses[0]["kind"], "error");
    assert!(responses[0]["message"]
        .as_str()
        .unwrap()
        .starts_with("Invalid request JSON"));
    assert_eq!(responses[1]["kind"], "error");
    assert_eq!(responses[2], json!({"kind": "not_found", "id": "nope"}));
    assert_eq!(responses[3]["kind"], "healthy");

    h.shutdown.cancel();
    h.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_removes_socket() {
    let h = start().await;
    assert!(h.socket.exists());
    h.shutdown.cancel();
    h.task.await.unwrap().unwrap();
    assert!(!h.socket.exists());
}
