//! `sudomode serve`: run the decision authority.
//!
//! 1. Load the policy file (missing or broken means an empty, deny-all ruleset)
//! 2. Build the approval store, notifier and governance service
//! 3. Bind the gateway socket and answer requests until Ctrl-C
//! 4. SIGHUP re-reads the policy file and swaps the ruleset in atomically

use crate::approval::InMemoryApprovalStore;
use crate::audit::AuditLogger;
use crate::config::Settings;
use crate::gateway::GatewayServer;
use crate::governance::GovernanceService;
use crate::policy::PolicyEngine;
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

pub async fn run_serve(settings: &Settings) -> Result<()> {
    let session_id = uuid::Uuid::new_v4().to_string();

    let engine = Arc::new(PolicyEngine::from_file(&settings.policies));
    let service = Arc::new(
        GovernanceService::new(
            engine.clone(),
            Arc::new(InMemoryApprovalStore::new()),
            settings.notifier()?,
        )
        .with_notify_timeout(settings.notify_timeout()),
    );

    let audit_path = settings.audit_log_path()?;
    let logger = AuditLogger::new(&audit_path).context("Failed to initialize audit logger")?;

    let server = GatewayServer::new(&settings.socket, service, &session_id).with_audit_logger(logger);
    let listener = server.bind()?;

    print_banner(settings, &session_id, engine.rule_count(), &audit_path);

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl-C received, shutting down");
            }
            shutdown.cancel();
        });
    }
    spawn_reload_on_hangup(engine, settings.policies.clone(), shutdown.clone())?;

    server.serve(listener, shutdown).await
}

fn spawn_reload_on_hangup(
    engine: Arc<PolicyEngine>,
    policies: PathBuf,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                    let rules = engine.reload_from_file(&policies);
                    tracing::info!(rules, path = %policies.display(), "Reloaded policy on SIGHUP");
                }
            }
        }
    });
    Ok(())
}

fn print_banner(settings: &Settings, session_id: &str, rules: usize, audit_path: &std::path::Path) {
    println!();
    println!("  {} {}", "sudomode".bold(), "is governing".green());
    println!("  {}", "━".repeat(41).dimmed());
    println!(
        "  Policy:  {} ({} rules)",
        settings.policies.display().to_string().cyan(),
        rules
    );
    if rules == 0 {
        println!(
            "  {} No rules loaded: every intent will be denied.",
            "!".yellow().bold()
        );
    }
    println!("  Socket:  {}", settings.socket.display());
    println!("  Audit:   {}", audit_path.display().to_string().dimmed());
    println!("  Session: {}", session_id.dimmed());
    println!();
    println!(
        "  {}",
        "Ctrl-C to stop, SIGHUP to reload the policy.".dimmed()
    );
    println!();
}
