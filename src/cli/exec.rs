//! `sudomode exec`: submit an intent to a running server and wait for the
//! verdict. Exits non-zero when the intent is denied, rejected, or the
//! wait times out.

use crate::client::{PollError, PollOptions, SudoClient};
use crate::gateway::GatewayClient;
use crate::policy::{DecisionStatus, Intent};
use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde_json::{Map, Value};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Parse `--arg key=value`. The value is read as JSON when it parses,
/// otherwise kept as a string: `amount=5000` is a number, `note=hi` a string.
pub fn parse_arg(raw: &str) -> Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("Expected key=value, got '{}'", raw);
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("Empty argument name in '{}'", raw);
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Build the intent's args from an optional JSON object plus `key=value` pairs.
/// Pairs override keys from the object.
pub fn build_args(json: Option<&str>, pairs: &[String]) -> Result<Map<String, Value>> {
    let mut args = match json {
        Some(raw) => match serde_json::from_str::<Value>(raw).context("--args is not valid JSON")? {
            Value::Object(map) => map,
            other => bail!("--args must be a JSON object, got {}", other),
        },
        None => Map::new(),
    };
    for pair in pairs {
        let (key, value) = parse_arg(pair)?;
        args.insert(key, value);
    }
    Ok(args)
}

pub async fn run_exec(socket: &Path, intent: Intent, options: PollOptions) -> Result<()> {
    let gateway = GatewayClient::new(socket);
    let decision = gateway.govern(&intent).await?;

    println!();
    match decision.status {
        DecisionStatus::Allow => {
            println!("  {} {} allowed: {}", "✓".green().bold(), intent.to_string().bold(), decision.reason);
            println!();
            return Ok(());
        }
        DecisionStatus::Deny => {
            bail!(PollError::PermissionDenied {
                reason: decision.reason
            });
        }
        DecisionStatus::RequireApproval => {}
    }

    let request_id = decision.request_id.ok_or(PollError::MissingRequestId)?;
    println!(
        "  {} {} needs approval: {}",
        "⏳".yellow(),
        intent.to_string().bold(),
        decision.reason
    );
    println!("  Request: {}", request_id.cyan());
    println!(
        "  {}",
        format!("Resolve with: sudomode approvals approve {}", request_id).dimmed()
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let client = SudoClient::new(gateway);
    client
        .wait_for_approval(&request_id, &options, cancel)
        .await?;

    println!("  {} Approved.", "✓".green().bold());
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_arg_reads_json_values() {
        assert_eq!(parse_arg("amount=5000").unwrap(), ("amount".into(), json!(5000)));
        assert_eq!(parse_arg("live=true").unwrap(), ("live".into(), json!(true)));
        assert_eq!(parse_arg("note=hello").unwrap(), ("note".into(), json!("hello")));
        assert_eq!(parse_arg("expr=a=b").unwrap(), ("expr".into(), json!("a=b")));
    }

    #[test]
    fn test_parse_arg_rejects_garbage() {
        assert!(parse_arg("amount").is_err());
        assert!(parse_arg("=5").is_err());
    }

    #[test]
    fn test_build_args_merges_pairs_over_json() {
        let args = build_args(
            Some(r#"{"amount": 10, "currency": "usd"}"#),
            &["amount=5000".to_string()],
        )
        .unwrap();
        assert_eq!(args["amount"], json!(5000));
        assert_eq!(args["currency"], json!("usd"));
    }

    #[test]
    fn test_build_args_requires_object() {
        assert!(build_args(Some("[1, 2]"), &[]).is_err());
        assert!(build_args(Some("{oops"), &[]).is_err());
    }
}
