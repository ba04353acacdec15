//! Job notifications
//!
//! After every job the worker hands the outcome and its log transcript to the
//! [`Notifier`], which fans it out to the configured channels. Deliveries run
//! on their own tasks: a slow or failing channel never blocks the worker or
//! the other channels, and nothing is retried.

mod email;
mod slack;

pub use email::EmailChannel;
pub use slack::SlackChannel;

use crate::config::NotifyConfig;
use crate::pipeline::{GenerationResult, JobStatus, Severity};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Timeout for a single channel delivery
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors a channel can report for one delivery
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{channel} returned HTTP {status}")]
    UnexpectedStatus { channel: String, status: u16 },
}

/// Everything a channel needs to describe one job outcome
#[derive(Debug, Clone)]
pub struct Notification {
    pub url: String,
    pub status: JobStatus,
    pub severity: Severity,

    /// Log transcript, followed by the error message when the job failed
    pub text: String,

    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(url: &str, result: &GenerationResult, transcript: &str) -> Self {
        let text = match &result.error_detail {
            Some(error) if transcript.is_empty() => error.clone(),
            Some(error) => format!("{}\n{}", transcript, error),
            None => transcript.to_string(),
        };

        Self {
            url: url.to_string(),
            status: result.status,
            severity: result.severity,
            text,
            timestamp: Utc::now(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == JobStatus::Error
    }
}

/// A destination for job notifications
#[async_trait]
pub trait NotifyChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Fans notifications out to every configured channel
#[derive(Clone, Default)]
pub struct Notifier {
    channels: Vec<Arc<dyn NotifyChannel>>,
}

impl Notifier {
    pub fn new(channels: Vec<Arc<dyn NotifyChannel>>) -> Self {
        Self { channels }
    }

    /// Builds the channels named in the configuration
    pub fn from_config(config: &NotifyConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()?;

        let mut channels: Vec<Arc<dyn NotifyChannel>> = Vec::new();
        if let Some(email) = &config.email {
            channels.push(Arc::new(EmailChannel::new(client.clone(), email.clone())));
        }
        if let Some(webhook) = &config.slack_webhook {
            channels.push(Arc::new(SlackChannel::new(client, webhook.clone())));
        }

        Ok(Self { channels })
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Dispatches the outcome of a job to every channel
    ///
    /// Returns immediately; the returned [`Dispatch`] may be awaited by
    /// short-lived processes that must not exit before delivery.
    pub fn notify(&self, url: &str, result: &GenerationResult, transcript: &str) -> Dispatch {
        let notification = Arc::new(Notification::new(url, result, transcript));

        let handles = self
            .channels
            .iter()
            .map(|channel| {
                let channel = channel.clone();
                let notification = notification.clone();
                tokio::spawn(async move {
                    match channel.deliver(&notification).await {
                        Ok(()) => tracing::debug!(
                            "Sent {} notification for {}",
                            channel.name(),
                            notification.url
                        ),
                        Err(e) => tracing::warn!(
                            "Failed to send {} notification for {}: {}",
                            channel.name(),
                            notification.url,
                            e
                        ),
                    }
                })
            })
            .collect();

        Dispatch { handles }
    }
}

/// In-progress deliveries of one notification
#[must_use = "deliveries continue in the background; call settled() to wait for them"]
pub struct Dispatch {
    handles: Vec<JoinHandle<()>>,
}

impl Dispatch {
    /// Waits until every channel has finished (successfully or not)
    pub async fn settled(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!("Notification task failed: {}", e);
            }
        }
    }

    /// Lets deliveries finish in the background
    pub fn detach(self) {}
}
