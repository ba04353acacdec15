use crate::extraction::{ExtractedCss, ExtractionError};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default timeout for one extraction request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Serialize)]
struct ExtractionRequest<'a> {
    html: &'a str,
    css: &'a str,
}

#[derive(Deserialize)]
struct ExtractionResponse {
    #[serde(default)]
    css: Option<String>,
}

/// Client for the critical CSS extraction service
pub struct ExtractionClient {
    client: Client,
    endpoint: String,
}

impl ExtractionClient {
    /// Creates a client posting to `endpoint` with the given request timeout
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends page HTML and its full stylesheet, returning the critical CSS
    ///
    /// # Errors
    ///
    /// | Condition | Error |
    /// |-----------|-------|
    /// | Request exceeds the timeout | `Timeout` |
    /// | Any status other than 200 | `UnexpectedStatus` |
    /// | 200 without a non-empty `css` string | `EmptyResult` |
    /// | Connection or protocol failure | `Transport` |
    ///
    /// The size budget is not checked here; see [`ExtractedCss::check_budget`].
    pub async fn extract(&self, html: &str, css: &str) -> Result<ExtractedCss, ExtractionError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ExtractionRequest { html, css })
            .send()
            .await
            .map_err(classify_error)?;

        let status = response.status();
        let body = response.text().await.map_err(classify_error)?;

        if status != StatusCode::OK {
            return Err(ExtractionError::UnexpectedStatus {
                code: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        let parsed: ExtractionResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!("Extraction response is not valid JSON: {}", e);
                return Err(ExtractionError::EmptyResult);
            }
        };

        match parsed.css {
            Some(css) if !css.is_empty() => Ok(ExtractedCss::new(css)),
            _ => Err(ExtractionError::EmptyResult),
        }
    }
}

fn classify_error(error: reqwest::Error) -> ExtractionError {
    if error.is_timeout() {
        ExtractionError::Timeout
    } else {
        ExtractionError::Transport(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer, timeout: Duration) -> ExtractionClient {
        ExtractionClient::new(format!("{}/extract", server.uri()), timeout).unwrap()
    }

    #[tokio::test]
    async fn test_extract_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/extract"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({"html": "<p>hi</p>", "css": "p{color:red}.x{}"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"css": "p{color:red}"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, DEFAULT_TIMEOUT).await;
        let result = client.extract("<p>hi</p>", "p{color:red}.x{}").await.unwrap();

        assert_eq!(result.css, "p{color:red}");
        assert_eq!(result.size_bytes, 12);
    }

    #[tokio::test]
    async fn test_unexpected_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("  bad gateway\n"))
            .mount(&server)
            .await;

        let client = client_for(&server, DEFAULT_TIMEOUT).await;
        let err = client.extract("<p></p>", "p{}").await.unwrap_err();

        match err {
            ExtractionError::UnexpectedStatus { code, body } => {
                assert_eq!(code, 502);
                assert_eq!(body, "bad gateway");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_other_success_codes_are_unexpected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"css": "p{}"})))
            .mount(&server)
            .await;

        let client = client_for(&server, DEFAULT_TIMEOUT).await;
        let err = client.extract("<p></p>", "p{}").await.unwrap_err();
        assert!(matches!(err, ExtractionError::UnexpectedStatus { code: 202, .. }));
    }

    #[tokio::test]
    async fn test_empty_results() {
        for body in [json!({"css": ""}), json!({"other": "x"}), json!({"css": null})] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(200).set_body_json(body))
                .mount(&server)
                .await;

            let client = client_for(&server, DEFAULT_TIMEOUT).await;
            let err = client.extract("<p></p>", "p{}").await.unwrap_err();
            assert!(matches!(err, ExtractionError::EmptyResult));
        }
    }

    #[tokio::test]
    async fn test_non_json_body_is_empty_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = client_for(&server, DEFAULT_TIMEOUT).await;
        let err = client.extract("<p></p>", "p{}").await.unwrap_err();
        assert!(matches!(err, ExtractionError::EmptyResult));
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"css": "p{}"}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_millis(100)).await;
        let err = client.extract("<p></p>", "p{}").await.unwrap_err();
        assert!(matches!(err, ExtractionError::Timeout));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client =
            ExtractionClient::new(format!("http://127.0.0.1:{}/", port), DEFAULT_TIMEOUT).unwrap();
        let err = client.extract("<p></p>", "p{}").await.unwrap_err();
        assert!(matches!(err, ExtractionError::Transport(_)));
    }
}
