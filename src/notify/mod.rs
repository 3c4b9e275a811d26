//! Completion notification
//!
//! Renders a markdown report for a processed session and posts it, with a
//! short completion payload, to the originating channel's webhook.
//! Best-effort by contract: a failed notification is recorded on the
//! session and surfaced through the status query, never rolled back.

mod report;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::info;

use crate::config::NotifyConfig;
use crate::error::ServiceError;
use crate::store::SessionBundle;

pub use report::render_report;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver the completion notification for a processed session.
    async fn notify(&self, bundle: &SessionBundle, report: &str) -> Result<(), ServiceError>;
}

/// Posts completion payloads to a configured webhook. With no webhook
/// configured, notification is a no-op.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Option<String>,
}

impl WebhookNotifier {
    pub fn new(cfg: &NotifyConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: cfg.webhook_url.clone(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, bundle: &SessionBundle, report: &str) -> Result<(), ServiceError> {
        let Some(url) = &self.url else {
            info!(session_id = %bundle.session.id, "No webhook configured, skipping notification");
            return Ok(());
        };

        let summary = bundle
            .analysis
            .as_ref()
            .map(|a| a.summary.as_str())
            .unwrap_or_default();

        let payload = json!({
            "content": "Your session has been processed!",
            "session_id": bundle.session.id,
            "name": bundle.session.name,
            "status": bundle.session.status.as_str(),
            "duration_seconds": bundle.session.duration_seconds(),
            // Payload-friendly excerpt; the full report rides alongside
            "summary": summary.chars().take(2000).collect::<String>(),
            "report_markdown": report,
        });

        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(crate::services::classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(crate::services::classify_status(status, &body));
        }

        info!(session_id = %bundle.session.id, "Completion notification delivered");
        Ok(())
    }
}
