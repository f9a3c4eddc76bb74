//! Discord webhook sink.
//!
//! Posts the alert text with the chart attached as `files[0]` in a single
//! multipart request. The webhook URL embeds its own token, so it is held
//! as a secret and never logged.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::AlertSink;
use crate::types::Alert;

pub struct DiscordWebhook {
    http: Client,
    url: SecretString,
}

impl DiscordWebhook {
    pub fn new(url: SecretString) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client for Discord")?;
        Ok(Self { http, url })
    }

    fn form(alert: &Alert) -> Result<Form> {
        let payload = json!({
            "content": alert.message,
            "allowed_mentions": { "parse": ["everyone", "roles", "users"] },
            "attachments": [{ "id": 0, "filename": alert.chart.file_name }],
        });
        let file = Part::bytes(alert.chart.bytes.clone())
            .file_name(alert.chart.file_name)
            .mime_str(alert.chart.mime_type)
            .context("Invalid chart mime type")?;
        Ok(Form::new()
            .text("payload_json", payload.to_string())
            .part("files[0]", file))
    }
}

#[async_trait]
impl AlertSink for DiscordWebhook {
    async fn send(&self, alert: &Alert) -> Result<()> {
        debug!(ticker = %alert.ticker, alert_id = %alert.id, "Posting Discord webhook");

        let resp = self
            .http
            .post(self.url.expose_secret())
            .multipart(Self::form(alert)?)
            .send()
            .await
            .context("Discord webhook request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Discord webhook error {status}: {body}");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "discord"
    }
}
