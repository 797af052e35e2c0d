//! Gateway server: the decision authority's front door.
//!
//! Listens on a Unix domain socket. Agents send intents, resolvers send
//! approve/reject, and every message gets exactly one response line.
//! Every governed intent and every successful resolution is written to the
//! audit log regardless of outcome.

use crate::approval::{Resolution, StoreError};
use crate::audit::{AuditLogger, LogEntry};
use crate::gateway::protocol::{GatewayRequest, GatewayResponse};
use crate::governance::GovernanceService;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// The gateway server that fronts a governance service.
pub struct GatewayServer {
    socket_path: PathBuf,
    ctx: ConnectionContext,
}

/// Everything a connection task needs; cheap to clone.
#[derive(Clone)]
struct ConnectionContext {
    service: Arc<GovernanceService>,
    /// Session ID for audit logging
    session_id: Arc<str>,
    logger: Option<Arc<Mutex<AuditLogger>>>,
}

impl GatewayServer {
    pub fn new(
        socket_path: impl AsRef<Path>,
        service: Arc<GovernanceService>,
        session_id: impl Into<String>,
    ) -> Self {
        let session_id: String = session_id.into();
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            ctx: ConnectionContext {
                service,
                session_id: session_id.into(),
                logger: None,
            },
        }
    }

    pub fn with_audit_logger(mut self, logger: AuditLogger) -> Self {
        self.ctx.logger = Some(Arc::new(Mutex::new(logger)));
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn service(&self) -> &Arc<GovernanceService> {
        &self.ctx.service
    }

    /// Bind the socket, replacing a stale one left by a previous run.
    pub fn bind(&self) -> Result<UnixListener> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).with_context(|| {
                format!("Failed to remove stale socket: {}", self.socket_path.display())
            })?;
        }

        let listener = UnixListener::bind(&self.socket_path)
            .with_context(|| format!("Failed to bind socket: {}", self.socket_path.display()))?;

        tracing::info!("Gateway listening on {}", self.socket_path.display());
        Ok(listener)
    }

    /// Bind and serve until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let listener = self.bind()?;
        self.serve(listener, shutdown).await
    }

    /// Accept connections on an already-bound listener until `shutdown`
    /// fires. The socket file is removed on the way out.
    pub async fn serve(&self, listener: UnixListener, shutdown: CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let ctx = self.ctx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, ctx).await {
                                tracing::error!("Connection handler error: {:#}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept connection: {}", e);
                    }
                },
            }
        }

        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            tracing::debug!("Socket cleanup skipped: {}", e);
        }
        tracing::info!("Gateway stopped");
        Ok(())
    }
}

/// Handle one connection: any number of request lines until EOF.
async fn handle_connection(stream: UnixStream, ctx: ConnectionContext) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // Connection closed
        }
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<GatewayRequest>(line.trim()) {
            Ok(request) => process_request(request, &ctx).await,
            Err(e) => GatewayResponse::error(format!("Invalid request JSON: {}", e)),
        };

        let json = serde_json::to_string(&response)?;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}

async fn process_request(request: GatewayRequest, ctx: &ConnectionContext) -> GatewayResponse {
    let service = &ctx.service;
    match request {
        GatewayRequest::Govern { intent } => {
            let start = Instant::now();
            let decision = service.govern(&intent);
            let eval_duration = start.elapsed().as_micros() as u64;

            tracing::debug!(intent = %intent, status = %decision.status, "Governed");
            audit(ctx, LogEntry::governed(&ctx.session_id, &intent, &decision, eval_duration)).await;

            GatewayResponse::Decision { decision }
        }
        GatewayRequest::ListApprovals => GatewayResponse::Approvals {
            approvals: service.list_approvals(),
        },
        GatewayRequest::GetApproval { id } => match service.get_approval(&id) {
            Ok(approval) => GatewayResponse::Approval { approval },
            Err(e) => store_error_response(e),
        },
        GatewayRequest::Approve { id } => resolve(ctx, &id, Resolution::Approve).await,
        GatewayRequest::Reject { id } => resolve(ctx, &id, Resolution::Reject).await,
        GatewayRequest::Health => GatewayResponse::Healthy {
            rules: service.engine().rule_count(),
            pending: service
                .list_approvals()
                .iter()
                .filter(|r| r.is_pending())
                .count(),
        },
    }
}

async fn resolve(ctx: &ConnectionContext, id: &str, resolution: Resolution) -> GatewayResponse {
    match ctx.service.resolve(id, resolution) {
        Ok(approval) => {
            audit(ctx, LogEntry::resolved(&ctx.session_id, &approval)).await;
            GatewayResponse::Approval { approval }
        }
        Err(e) => store_error_response(e),
    }
}

fn store_error_response(error: StoreError) -> GatewayResponse {
    match error {
        StoreError::NotFound(id) => GatewayResponse::NotFound { id },
        StoreError::AlreadyResolved { id, status } => {
            GatewayResponse::AlreadyResolved { id, status }
        }
        other => GatewayResponse::error(other.to_string()),
    }
}

async fn audit(ctx: &ConnectionContext, entry: LogEntry) {
    let Some(ref logger) = ctx.logger else {
        return;
    };
    if let Err(e) = logger.lock().await.log(&entry) {
        tracing::error!("Failed to write audit log: {:#}", e);
    }
}
