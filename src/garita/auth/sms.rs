//! SMS delivery collaborators for one-time login codes.
//!
//! Delivery is best-effort: the challenge store keeps the issued code even
//! when the sender fails, and only logs the error.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

use crate::APP_USER_AGENT;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait SmsSender: Send + Sync {
    /// Deliver `code` to `mobile`, or return an error to have it logged.
    async fn send(&self, mobile: &str, code: &str, ttl: Duration) -> Result<()>;
}

/// Local dev sender that logs the code instead of sending a text message.
#[derive(Clone, Debug)]
pub struct LogSmsSender;

#[async_trait]
impl SmsSender for LogSmsSender {
    async fn send(&self, mobile: &str, code: &str, ttl: Duration) -> Result<()> {
        info!(
            mobile = %mobile,
            ttl_seconds = ttl.as_secs(),
            "sms send stub, login code {code}"
        );
        Ok(())
    }
}

/// Posts `{ mobile, code, ttl_seconds }` as JSON to an SMS gateway webhook.
#[derive(Clone, Debug)]
pub struct WebhookSmsSender {
    client: Client,
    url: Url,
}

impl WebhookSmsSender {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: Url) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(WEBHOOK_TIMEOUT)
            .build()?;
        Ok(Self { client, url })
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl SmsSender for WebhookSmsSender {
    #[instrument(skip_all)]
    async fn send(&self, mobile: &str, code: &str, ttl: Duration) -> Result<()> {
        let payload = json!({
            "mobile": mobile,
            "code": code,
            "ttl_seconds": ttl.as_secs(),
        });

        let response = self
            .client
            .post(self.url.as_str())
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("{} - {}", self.url, response.status()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_sender_always_succeeds() {
        let sender = LogSmsSender;
        let result = sender
            .send("+15550100", "123456", Duration::from_secs(60))
            .await;
        assert!(result.is_ok());
    }

    #[test]
    fn webhook_sender_keeps_its_url() -> Result<()> {
        let url = Url::parse("https://sms.example.com/send")?;
        let sender = WebhookSmsSender::new(url.clone())?;
        assert_eq!(sender.url(), &url);
        Ok(())
    }

    #[tokio::test]
    async fn webhook_sender_reports_unreachable_gateway() -> Result<()> {
        // Port 9 (discard) on localhost is closed on test hosts.
        let sender = WebhookSmsSender::new(Url::parse("http://127.0.0.1:9/send")?)?;
        let result = sender
            .send("+15550100", "123456", Duration::from_secs(60))
            .await;
        assert!(result.is_err());
        Ok(())
    }
}
