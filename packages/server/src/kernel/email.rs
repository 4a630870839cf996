// Outbound email through a JSON mail API (Resend-compatible payload)

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use super::{BaseEmailSender, OutboundEmail};

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

#[derive(Clone)]
pub struct HttpEmailSender {
    http_client: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpEmailSender {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key: api_key.into(),
            from: from.into(),
        }
    }
}

#[async_trait]
impl BaseEmailSender for HttpEmailSender {
    async fn send(&self, email: &OutboundEmail) -> Result<()> {
        if email.to.is_empty() {
            anyhow::bail!("email has no recipients");
        }

        let request = SendRequest {
            from: &self.from,
            to: &email.to,
            subject: &email.subject,
            html: &email.html_body,
            text: &email.text_body,
        };

        let response = self
            .http_client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to reach email API")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("email API error ({}): {}", status, error_text);
        }

        info!(recipients = email.to.len(), subject = %email.subject, "Email sent");
        Ok(())
    }
}
