//! Operator alerting.
//!
//! [`WebhookAlertSender`] POSTs a JSON document to an HTTP endpoint that
//! forwards it to whatever paging system the operators use.
//! [`LogAlertSender`] is the fallback when no endpoint is configured.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};
use url::Url;

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("alert delivery failed with status {status}: {body}")]
    DeliveryFailed { status: u16, body: String },
}

#[async_trait]
pub trait AlertSender: Send + Sync {
    async fn send_alert(
        &self,
        subject: &str,
        body: &str,
        recipients: &[String],
    ) -> Result<(), AlertError>;
}

#[derive(Debug, Serialize)]
struct AlertPayload<'a> {
    subject: &'a str,
    body: &'a str,
    recipients: &'a [String],
}

pub struct WebhookAlertSender {
    http_client: reqwest::Client,
    url: Url,
}

impl WebhookAlertSender {
    pub fn new(url: Url) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            url,
        }
    }

    async fn post(&self, payload: &AlertPayload<'_>) -> Result<(), AlertError> {
        let response = self
            .http_client
            .post(self.url.clone())
            .json(payload)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(AlertError::DeliveryFailed {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl AlertSender for WebhookAlertSender {
    async fn send_alert(
        &self,
        subject: &str,
        body: &str,
        recipients: &[String],
    ) -> Result<(), AlertError> {
        let payload = AlertPayload {
            subject,
            body,
            recipients,
        };

        let mut attempt = 1;
        loop {
            match self.post(&payload).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < MAX_RETRIES => {
                    warn!(
                        attempt,
                        max_attempts = MAX_RETRIES,
                        error = %e,
                        "Alert delivery failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Writes alerts to the log at error level.
#[derive(Debug, Default)]
pub struct LogAlertSender;

#[async_trait]
impl AlertSender for LogAlertSender {
    async fn send_alert(
        &self,
        subject: &str,
        body: &str,
        recipients: &[String],
    ) -> Result<(), AlertError> {
        error!(subject, body, recipients = ?recipients, "ALERT");
        Ok(())
    }
}
