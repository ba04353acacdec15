//! Page rendering
//!
//! The pipeline only needs the HTML a visitor would receive for a URL. The
//! [`Renderer`] trait is that seam; [`HttpRenderer`] fulfils it by fetching
//! the live page.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while rendering a page
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Rendering {url} timed out")]
    Timeout { url: String },

    #[error("Unexpected response rendering {url} (HTTP {status})")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("Failed to render {url}: {message}")]
    Transport { url: String, message: String },
}

/// Produces the fully rendered HTML of a page
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String, RenderError>;
}

/// Builds an HTTP client with a fixed user agent and timeout
///
/// # Example
///
/// ```no_run
/// use critpath::render::build_http_client;
/// use std::time::Duration;
///
/// let client = build_http_client("critpath/0.3", Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Renders pages by requesting them over HTTP
pub struct HttpRenderer {
    client: Client,
}

impl HttpRenderer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn render(&self, url: &str) -> Result<String, RenderError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| classify_error(url, e))
    }
}

fn classify_error(url: &str, error: reqwest::Error) -> RenderError {
    if error.is_timeout() {
        RenderError::Timeout {
            url: url.to_string(),
        }
    } else {
        RenderError::Transport {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}
