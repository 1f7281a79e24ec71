use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tracing::{info, instrument};

use super::{AlertEvent, Notifier, required_url};
use crate::error::Result;
use crate::models::{NotifierRef, SerialNumber};

pub const KIND: &str = "webhook";

/// Posts a JSON summary of the alert to a URL
pub struct WebhookNotifier {
    id: SerialNumber,
    url: String,
    client: Client,
}

pub fn create(notifier: &NotifierRef) -> Result<Arc<dyn Notifier>> {
    Ok(Arc::new(WebhookNotifier {
        id: notifier.id.clone(),
        url: required_url(notifier)?,
        client: Client::new(),
    }))
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn id(&self) -> &SerialNumber {
        &self.id
    }

    #[instrument(skip(self, event), fields(notifier = %self.id, target = %event.target))]
    async fn deliver(&self, event: &AlertEvent) -> anyhow::Result<()> {
        let payload = json!({
            "message": event.summary(),
            "target": event.target,
            "name": event.target_name,
            "status": event.status,
            "success": event.report.success,
            "failed": event.report.failed,
            "window_end": event.report.timestamp.to_rfc3339(),
            "timestamp": Utc::now().to_rfc3339()
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .context("failed to send webhook alert")?;

        if !response.status().is_success() {
            bail!("webhook alert failed with status: {}", response.status());
        }
        info!("successfully sent webhook alert");
        Ok(())
    }
}
