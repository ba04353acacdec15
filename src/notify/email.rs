//! Email channel backed by a transactional mail HTTP API
//!
//! Requests use the Postmark message format (`From`, `To`, `Subject`,
//! `TextBody`) with the server token in `X-Postmark-Server-Token`.

use crate::config::EmailConfig;
use crate::notify::{Notification, NotifyChannel, NotifyError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct EmailMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: String,
    text_body: &'a str,
}

pub struct EmailChannel {
    client: Client,
    config: EmailConfig,
}

impl EmailChannel {
    pub fn new(client: Client, config: EmailConfig) -> Self {
        Self { client, config }
    }
}

fn subject(notification: &Notification) -> String {
    let timestamp = notification.timestamp.format("%Y-%m-%d %H:%M:%S");
    if notification.is_error() {
        format!(
            "Error generating critical CSS for {} [{}]",
            notification.url, timestamp
        )
    } else {
        format!(
            "Successfully generated critical css for {} [{}]",
            notification.url, timestamp
        )
    }
}

#[async_trait]
impl NotifyChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        let message = EmailMessage {
            from: &self.config.from,
            to: &self.config.to,
            subject: subject(notification),
            text_body: &notification.text,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Accept", "application/json")
            .header("X-Postmark-Server-Token", &self.config.token)
            .json(&message)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::UnexpectedStatus {
                channel: "email".to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}
