//! Outbound transactional email.
//!
//! The service never talks SMTP itself; [`HttpMailNotifier`] posts each
//! message to a mail provider's HTTP API. When no endpoint is configured,
//! [`LogNotifier`] records messages in the log instead.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::config::MailConfig;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("mail transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("mail provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("mail delivery failed: {0}")]
    Other(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError>;
}

#[derive(Serialize)]
struct ProviderPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

pub struct HttpMailNotifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailNotifier {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let endpoint = endpoint.into();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(NotifyError::Other(format!(
                "mail endpoint must be an http(s) URL, got '{endpoint}'"
            )));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            from: from.into(),
        })
    }
}

#[async_trait]
impl Notifier for HttpMailNotifier {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        let mut request = self.client.post(&self.endpoint).json(&ProviderPayload {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            text: &message.text,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        info!(to = %message.to, subject = %message.subject, "email (mail endpoint not configured)");
        Ok(())
    }
}

/// Picks the HTTP notifier when an endpoint is configured.
pub fn from_config(config: &MailConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    match config.endpoint.as_deref().filter(|e| !e.is_empty()) {
        Some(endpoint) => Ok(Arc::new(HttpMailNotifier::new(
            endpoint,
            config.api_key.clone(),
            config.from.clone(),
            Duration::from_secs(config.timeout_secs),
        )?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}
