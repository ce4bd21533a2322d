//! Outbound notification of processed transactions.
//!
//! Published after the ingest unit of work commits. Failures are reported to
//! the caller, which only logs them.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::FeedConfig;
use crate::domain::models::TxPayload;

/// Message published for each applied transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxNotification {
    /// Ready wallets touched by the transaction
    pub wallets: Vec<String>,
    pub tx: TxPayload,
}

#[derive(Debug)]
pub enum NotifyError {
    HttpError(reqwest::Error),
    Rejected(String),
    ChannelClosed,
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyError::HttpError(e) => write!(f, "HTTP error: {}", e),
            NotifyError::Rejected(msg) => write!(f, "Notification rejected: {}", msg),
            NotifyError::ChannelClosed => write!(f, "Notification channel closed"),
        }
    }
}

impl Error for NotifyError {}

impl From<reqwest::Error> for NotifyError {
    fn from(error: reqwest::Error) -> Self {
        NotifyError::HttpError(error)
    }
}

#[async_trait]
pub trait TxNotifier: Send + Sync {
    async fn notify(&self, notification: &TxNotification) -> Result<(), NotifyError>;
}

/// Used when no notification target is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl TxNotifier for NoopNotifier {
    async fn notify(&self, _notification: &TxNotification) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Posts notifications as JSON to a webhook
pub struct HttpNotifier {
    client: Client,
    url: String,
}

impl HttpNotifier {
    pub fn new(url: &str) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl TxNotifier for HttpNotifier {
    async fn notify(&self, notification: &TxNotification) -> Result<(), NotifyError> {
        let response = self.client.post(&self.url).json(notification).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::Rejected(format!(
                "{} returned {}",
                self.url,
                response.status()
            )));
        }
        Ok(())
    }
}

/// Forwards notifications to an in-process consumer
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<TxNotification>,
}

impl ChannelNotifier {
    pub fn new(sender: mpsc::UnboundedSender<TxNotification>) -> Self {
        Self { sender }
    }

    /// Notifier with its receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TxNotification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

#[async_trait]
impl TxNotifier for ChannelNotifier {
    async fn notify(&self, notification: &TxNotification) -> Result<(), NotifyError> {
        self.sender
            .send(notification.clone())
            .map_err(|_| NotifyError::ChannelClosed)
    }
}

/// Webhook notifier when a url is configured, otherwise a no-op
pub fn notifier_from_config(config: &FeedConfig) -> Result<Arc<dyn TxNotifier>, NotifyError> {
    match &config.notify_url {
        Some(url) => Ok(Arc::new(HttpNotifier::new(url)?)),
        None => Ok(Arc::new(NoopNotifier)),
    }
}
