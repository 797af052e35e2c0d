//! Slack-compatible incoming-webhook notifier.
//!
//! Posts a block-formatted message with the resource, action, amount (when
//! the intent carries one), request id, reason and a dashboard link.
//! One attempt per notice; failures are reported to the caller, which logs
//! them and moves on.

use crate::governance::notifier::{ApprovalNotice, Notifier};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// Request timeout for the webhook POST.
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

pub struct WebhookNotifier {
    client: reqwest::Client,
    webhook_url: String,
    dashboard_url: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: impl Into<String>, dashboard_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .context("Failed to build webhook HTTP client")?;
        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
            dashboard_url: dashboard_url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notice: &ApprovalNotice) -> Result<()> {
        let payload = build_payload(notice, &self.dashboard_url);
        self.client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .context("Webhook request failed")?
            .error_for_status()
            .context("Webhook rejected the notification")?;
        tracing::debug!(request_id = %notice.request_id, "Webhook notification delivered");
        Ok(())
    }
}

/// Build the message body for a notice.
pub fn build_payload(notice: &ApprovalNotice, dashboard_url: &str) -> Value {
    let intent = &notice.intent;
    let amount = intent
        .args
        .get("amount")
        .map(format_amount)
        .unwrap_or_else(|| "N/A".to_string());
    let link = format!(
        "{}/requests/{}",
        dashboard_url.trim_end_matches('/'),
        notice.request_id
    );

    json!({
        "text": format!(
            "⚠️ SudoMode Approval Required: {} on {}",
            intent.action, intent.resource
        ),
        "blocks": [
            {
                "type": "header",
                "text": { "type": "plain_text", "text": "⚠️ SudoMode Approval Required" }
            },
            {
                "type": "section",
                "fields": [
                    { "type": "mrkdwn", "text": format!("*Resource:*\n`{}`", intent.resource) },
                    { "type": "mrkdwn", "text": format!("*Action:*\n`{}`", intent.action) },
                    { "type": "mrkdwn", "text": format!("*Amount:*\n{}", amount) },
                    { "type": "mrkdwn", "text": format!("*Request ID:*\n`{}`", notice.request_id) }
                ]
            },
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": format!("*Reason:*\n{}", notice.reason) }
            },
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": format!("*<{}|View in Dashboard>*", link) }
            },
            { "type": "divider" }
        ]
    })
}

/// `5000` → `$5,000.00`. Non-numeric amounts are shown as given.
fn format_amount(amount: &Value) -> String {
    let Some(value) = amount.as_f64() else {
        return match amount {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
    };

    let fixed = format!("{:.2}", value.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    format!("{}${}.{}", sign, grouped, cents)
}
