//! `sudomode approvals`: list, inspect and resolve approval requests on a
//! running server.

use crate::approval::{ApprovalRequest, ApprovalStatus, Resolution, StoreError};
use crate::gateway::GatewayClient;
use anyhow::{bail, Result};
use colored::Colorize;
use std::path::Path;

pub async fn run_list(socket: &Path, pending_only: bool) -> Result<()> {
    let client = GatewayClient::new(socket);
    let approvals: Vec<ApprovalRequest> = client
        .list_approvals()
        .await?
        .into_iter()
        .filter(|r| !pending_only || r.is_pending())
        .collect();

    println!();
    if approvals.is_empty() {
        let what = if pending_only { "pending approval requests" } else { "approval requests" };
        println!("  {} No {}.", "ℹ".blue(), what);
        println!();
        return Ok(());
    }

    for request in &approvals {
        println!("  {}", format_request(request));
    }
    println!();
    Ok(())
}

pub async fn run_show(socket: &Path, id: &str) -> Result<()> {
    let client = GatewayClient::new(socket);
    let Some(request) = client.get_approval(id).await? else {
        bail!("Approval request '{}' not found", id);
    };

    println!();
    println!("  Request:  {}", request.id.cyan());
    println!("  Status:   {}", colored_status(request.status));
    println!("  Intent:   {}", request.intent.to_string().bold());
    if !request.intent.args.is_empty() {
        let args = serde_json::to_string_pretty(&request.intent.args)?;
        println!("  Args:");
        for line in args.lines() {
            println!("    {}", line);
        }
    }
    println!("  Reason:   {}", request.reason);
    println!("  Created:  {}", request.created_at.to_rfc3339());
    if let Some(resolved) = request.resolved_at {
        println!("  Resolved: {}", resolved.to_rfc3339());
    }
    println!();
    Ok(())
}

pub async fn run_resolve(socket: &Path, id: &str, resolution: Resolution) -> Result<()> {
    let client = GatewayClient::new(socket);
    match client.resolve(id, resolution).await? {
        Ok(request) => {
            println!();
            println!(
                "  {} {} is now {}",
                "✓".green().bold(),
                request.id.cyan(),
                colored_status(request.status)
            );
            println!();
            Ok(())
        }
        Err(StoreError::AlreadyResolved { id, status }) => {
            bail!("Approval request '{}' was already {}", id, status)
        }
        Err(e) => Err(e.into()),
    }
}

fn colored_status(status: ApprovalStatus) -> colored::ColoredString {
    let label = status.to_string();
    match status {
        ApprovalStatus::Pending => label.yellow(),
        ApprovalStatus::Approved => label.green(),
        ApprovalStatus::Rejected => label.red(),
    }
}

fn format_request(request: &ApprovalRequest) -> String {
    format!(
        "{} {} {} ({}) {}",
        request.created_at.format("%H:%M:%S").to_string().dimmed(),
        colored_status(request.status),
        request.id.cyan(),
        request.intent,
        request.reason.dimmed()
    )
}
