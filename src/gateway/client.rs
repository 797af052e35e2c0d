//! Gateway client: talks to a running `sudomode serve` over its socket.
//!
//! Used by the `exec` and `approvals` commands and by integration tests.
//! Implements [`GovernanceApi`], so a [`SudoClient`](crate::client::SudoClient)
//! can poll a remote server exactly as it polls an in-process service.

use crate::approval::{ApprovalRequest, Resolution, StoreError};
use crate::client::GovernanceApi;
use crate::gateway::protocol::{GatewayRequest, GatewayResponse};
use crate::policy::types::{Decision, Intent};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Environment variable naming the gateway socket.
pub const SOCKET_ENV: &str = "SUDOMODE_SOCKET";

pub struct GatewayClient {
    socket_path: PathBuf,
}

impl GatewayClient {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    /// Create a client using the SUDOMODE_SOCKET environment variable.
    pub fn from_env() -> Result<Self> {
        let socket_path = std::env::var(SOCKET_ENV).with_context(|| {
            format!("{} environment variable not set. Is sudomode serving?", SOCKET_ENV)
        })?;
        Ok(Self::new(socket_path))
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send a request and read its response.
    /// Each call opens a new connection.
    pub async fn send(&self, request: &GatewayRequest) -> Result<GatewayResponse> {
        let stream = UnixStream::connect(&self.socket_path).await.with_context(|| {
            format!(
                "Failed to connect to sudomode gateway at {}. Is `sudomode serve` running?",
                self.socket_path.display()
            )
        })?;
        let (reader, mut writer) = stream.into_split();

        let json = serde_json::to_string(request)?;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        let mut reader = BufReader::new(reader);
        let mut response_line = String::new();
        let read = reader.read_line(&mut response_line).await?;
        if read == 0 {
            bail!("Gateway closed the connection without responding");
        }

        serde_json::from_str(response_line.trim()).context("Failed to parse gateway response")
    }

    pub async fn govern(&self, intent: &Intent) -> Result<Decision> {
        let request = GatewayRequest::Govern {
            intent: intent.clone(),
        };
        match self.send(&request).await? {
            GatewayResponse::Decision { decision } => Ok(decision),
            other => Err(unexpected(other)),
        }
    }

    pub async fn list_approvals(&self) -> Result<Vec<ApprovalRequest>> {
        match self.send(&GatewayRequest::ListApprovals).await? {
            GatewayResponse::Approvals { approvals } => Ok(approvals),
            other => Err(unexpected(other)),
        }
    }

    /// `None` when the server has no such request.
    pub async fn get_approval(&self, id: &str) -> Result<Option<ApprovalRequest>> {
        let request = GatewayRequest::GetApproval { id: id.to_string() };
        match self.send(&request).await? {
            GatewayResponse::Approval { approval } => Ok(Some(approval)),
            GatewayResponse::NotFound { .. } => Ok(None),
            other => Err(unexpected(other)),
        }
    }

    /// Approve or reject. The outer error is transport trouble; the inner
    /// one is the server's NotFound/AlreadyResolved answer.
    pub async fn resolve(
        &self,
        id: &str,
        resolution: Resolution,
    ) -> Result<std::result::Result<ApprovalRequest, StoreError>> {
        let id = id.to_string();
        let request = match resolution {
            Resolution::Approve => GatewayRequest::Approve { id },
            Resolution::Reject => GatewayRequest::Reject { id },
        };
        match self.send(&request).await? {
            GatewayResponse::Approval { approval } => Ok(Ok(approval)),
            GatewayResponse::NotFound { id } => Ok(Err(StoreError::NotFound(id))),
            GatewayResponse::AlreadyResolved { id, status } => {
                Ok(Err(StoreError::AlreadyResolved { id, status }))
            }
            other => Err(unexpected(other)),
        }
    }

    /// Returns `(rules, pending)`.
    pub async fn health(&self) -> Result<(usize, usize)> {
        match self.send(&GatewayRequest::Health).await? {
            GatewayResponse::Healthy { rules, pending } => Ok((rules, pending)),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: GatewayResponse) -> anyhow::Error {
    match response {
        GatewayResponse::Error { message } => anyhow!("Gateway error: {}", message),
        other => anyhow!("Unexpected gateway response: {}", other.kind()),
    }
}

#[async_trait]
impl GovernanceApi for GatewayClient {
    async fn submit(&self, intent: &Intent) -> Result<Decision> {
        self.govern(intent).await
    }

    async fn approval(&self, id: &str) -> Result<ApprovalRequest> {
        self.get_approval(id)
            .await?
            .ok_or_else(|| anyhow!("approval request '{}' not found", id))
    }
}
