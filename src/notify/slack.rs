//! Slack-compatible incoming webhook channel

use crate::notify::{Notification, NotifyChannel, NotifyError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct SlackPayload<'a> {
    attachments: Vec<SlackAttachment<'a>>,
}

#[derive(Debug, Serialize)]
struct SlackAttachment<'a> {
    fallback: String,
    color: &'a str,
    title: String,
    text: &'a str,
    footer: &'a str,
    ts: i64,
    mrkdwn_in: [&'a str; 1],
}

pub struct SlackChannel {
    client: Client,
    webhook_url: String,
}

impl SlackChannel {
    pub fn new(client: Client, webhook_url: String) -> Self {
        Self {
            client,
            webhook_url,
        }
    }
}

/// Title shown in chat, e.g. `Critical CSS Error: https://example.com/`
fn title(notification: &Notification) -> String {
    let status = if notification.is_error() {
        "Error"
    } else {
        "Success"
    };
    format!("Critical CSS {}: {}", status, notification.url)
}

fn payload(notification: &Notification) -> SlackPayload<'_> {
    let title = title(notification);
    SlackPayload {
        attachments: vec![SlackAttachment {
            fallback: title.clone(),
            color: notification.severity.as_color(),
            title,
            text: &notification.text,
            footer: "critpath",
            ts: notification.timestamp.timestamp(),
            mrkdwn_in: ["text"],
        }],
    }
}

#[async_trait]
impl NotifyChannel for SlackChannel {
    fn name(&self) -> &str {
        "slack"
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload(notification))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::UnexpectedStatus {
                channel: "slack".to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}
