//! REST access to execution state.

use async_trait::async_trait;
use pw_protocol::ExecutionSnapshot;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("invalid api base url {0}")]
    InvalidUrl(String),

    #[error("failed to build http client: {0}")]
    Build(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("server answered {status} for {url}")]
    Status { status: u16, url: String },

    #[error("could not decode response: {0}")]
    Decode(String),

    /// The fetcher has nothing to offer for this request.
    #[error("{0}")]
    Unavailable(String),
}

/// Source of full execution state, used when push frames may have been missed.
#[async_trait]
pub trait StateFetcher: Send + Sync {
    async fn fetch_state(&self, execution_id: &str) -> Result<ExecutionSnapshot, FetchError>;

    /// Complete log text of the execution.
    async fn fetch_full_logs(&self, execution_id: &str) -> Result<String, FetchError>;
}

#[derive(Deserialize)]
struct LogsBody {
    logs: String,
}

/// [`StateFetcher`] over HTTP:
/// - `GET {base}/executions/{id}`
/// - `GET {base}/executions/{id}/logs`
#[derive(Debug, Clone)]
pub struct HttpStateFetcher {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpStateFetcher {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, FetchError> {
        let base =
            Url::parse(base_url).map_err(|e| FetchError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(FetchError::InvalidUrl(base_url.to_string()));
        }
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| FetchError::Build(e.to_string()))?;

        Ok(Self {
            client,
            base,
            token,
        })
    }

    pub fn execution_url(&self, execution_id: &str, tail: Option<&str>) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("executions").push(execution_id);
            if let Some(tail) = tail {
                segments.push(tail);
            }
        }
        url
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response, FetchError> {
        let mut request = self.client.get(url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl StateFetcher for HttpStateFetcher {
    async fn fetch_state(&self, execution_id: &str) -> Result<ExecutionSnapshot, FetchError> {
        let response = self.get(self.execution_url(execution_id, None)).await?;
        response
            .json::<ExecutionSnapshot>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }

    async fn fetch_full_logs(&self, execution_id: &str) -> Result<String, FetchError> {
        let response = self.get(self.execution_url(execution_id, Some("logs"))).await?;
        let text = response
            .text()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        // The endpoint answers either `{"logs": "..."}` or the raw text.
        Ok(match serde_json::from_str::<LogsBody>(&text) {
            Ok(body) => body.logs,
            Err(_) => text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pw_protocol::ExecutionStatus;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(server: &MockServer, token: Option<&str>) -> HttpStateFetcher {
        HttpStateFetcher::new(
            &format!("{}/api/pipelines", server.uri()),
            token.map(str::to_string),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_state_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/pipelines/executions/exec-1"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "running",
                "total_steps": 4,
                "successful_steps": 1,
                "failed_steps": 0,
                "execution_time": 3.5,
                "steps": [
                    {"step_id": "build", "step_name": "Build", "status": "success"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let snapshot = fetcher(&server, Some("secret"))
            .fetch_state("exec-1")
            .await
            .unwrap();

        assert_eq!(snapshot.status, ExecutionStatus::Running);
        assert_eq!(snapshot.total_steps, 4);
        assert_eq!(snapshot.steps.len(), 1);
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/pipelines/executions/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = fetcher(&server, None)
            .fetch_state("missing")
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/pipelines/executions/exec-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = fetcher(&server, None).fetch_state("exec-1").await.unwrap_err();

        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[tokio::test]
    async fn test_full_logs_accepts_json_and_plain_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/pipelines/executions/json/logs"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"logs": "line 1\nline 2"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/pipelines/executions/plain/logs"))
            .respond_with(ResponseTemplate::new(200).set_body_string("raw line"))
            .mount(&server)
            .await;

        let fetcher = fetcher(&server, None);

        assert_eq!(fetcher.fetch_full_logs("json").await.unwrap(), "line 1\nline 2");
        assert_eq!(fetcher.fetch_full_logs("plain").await.unwrap(), "raw line");
    }

    #[test]
    fn test_execution_url_handles_trailing_slash() {
        let fetcher = HttpStateFetcher::new(
            "http://localhost:8000/api/pipelines/",
            None,
            Duration::from_secs(1),
        )
        .unwrap();

        assert_eq!(
            fetcher.execution_url("e1", Some("logs")).as_str(),
            "http://localhost:8000/api/pipelines/executions/e1/logs"
        );
    }
}
