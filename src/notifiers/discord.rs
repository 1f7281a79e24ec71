use std::sync::Arc;

use anyhow::{Context, bail};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, instrument};

use super::{AlertEvent, Notifier, required_url};
use crate::error::Result;
use crate::models::{HealthyStatus, NotifierRef, SerialNumber};

pub const KIND: &str = "discord";

const RED: u32 = 15158332;
const ORANGE: u32 = 15105570;
const GREEN: u32 = 3066993;
const GREY: u32 = 9807270;

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

/// Posts an embed to a Discord channel webhook, optionally pinging a user
pub struct DiscordNotifier {
    id: SerialNumber,
    url: String,
    user_id: Option<String>,
    client: Client,
}

pub fn create(notifier: &NotifierRef) -> Result<Arc<dyn Notifier>> {
    Ok(Arc::new(DiscordNotifier {
        id: notifier.id.clone(),
        url: required_url(notifier)?,
        user_id: notifier.config_str("user_id").map(str::to_string),
        client: Client::new(),
    }))
}

impl DiscordNotifier {
    fn build_embed(&self, event: &AlertEvent) -> Embed {
        let (title, color) = match event.status {
            HealthyStatus::Red => ("🔴 Target Critical", RED),
            HealthyStatus::Yellow => ("🟠 Target Degraded", ORANGE),
            HealthyStatus::Green => ("✅ Target Healthy", GREEN),
            HealthyStatus::Unknown => ("❔ Target Unknown", GREY),
        };

        Embed {
            title: Some(title.to_string()),
            description: Some(format!(
                "Target **{}** is **{}**",
                event.target_name, event.status
            )),
            color: Some(color),
            fields: vec![
                EmbedField {
                    name: "❌ Failed".to_string(),
                    value: event.report.failed.to_string(),
                    inline: true,
                },
                EmbedField {
                    name: "✔️ Succeeded".to_string(),
                    value: event.report.success.to_string(),
                    inline: true,
                },
                EmbedField {
                    name: "🕒 Window End".to_string(),
                    value: event.report.timestamp.to_rfc3339(),
                    inline: false,
                },
            ],
            footer: Some(EmbedFooter {
                text: format!("Target: {}", event.target),
            }),
            timestamp: Some(Utc::now().to_rfc3339()),
        }
    }

    fn build_message(&self, event: &AlertEvent) -> Message {
        let mut builder = MessageBuilder::new().add_embed(self.build_embed(event));
        if let Some(user_id) = &self.user_id {
            builder = builder.content(format!("🔴 Target: `{}` <@{user_id}>", event.target_name));
        }
        builder.build()
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn id(&self) -> &SerialNumber {
        &self.id
    }

    #[instrument(skip(self, event), fields(notifier = %self.id, target = %event.target))]
    async fn deliver(&self, event: &AlertEvent) -> anyhow::Result<()> {
        let message = self.build_message(event);
        let response = self
            .client
            .post(&self.url)
            .json(&message)
            .send()
            .await
            .context("failed to send Discord message")?;

        let status = response.status();
        if !status.is_success() {
            if let Ok(error_text) = response.text().await {
                error!("Discord API error response: {}", error_text);
            }
            bail!("Discord message failed with status: {status}");
        }
        info!("successfully sent Discord message");
        Ok(())
    }
}
