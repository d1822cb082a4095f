use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use runbot_core::{
    config::{DEFAULT_MAX_RESPONSE_BYTES, ExecutorConfig},
    models::{ExecutionResult, NO_OUTPUT_PLACEHOLDER},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("execution service timed out")]
    Timeout,
    #[error("failed to reach execution service")]
    Transport(#[source] reqwest::Error),
    #[error("execution service returned {0}")]
    Status(StatusCode),
    #[error("malformed execution service response")]
    Malformed(#[source] serde_json::Error),
    #[error("execution service response exceeds {0} bytes")]
    TooLarge(usize),
}

impl From<reqwest::Error> for ExecutionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() { Self::Timeout } else { Self::Transport(e) }
    }
}

/// Runs extracted code somewhere outside this process.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, code: &str) -> ExecutionResult;
}

#[derive(Serialize)]
struct ExecuteRequest<'a> {
    code: &'a str,
}

#[derive(Deserialize)]
struct ExecuteResponse {
    #[serde(default)]
    output: Option<String>,
}

/// Fill in the placeholder when the service reports no output.
pub fn normalize_output(output: Option<String>) -> String {
    output.filter(|o| !o.is_empty()).unwrap_or_else(|| NO_OUTPUT_PLACEHOLDER.to_string())
}

/// Execution service reached over HTTP. One request per call, bounded by a
/// timeout and a response size cap, and never retried.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: Client,
    url: String,
    max_response_bytes: usize,
}

impl HttpExecutor {
    pub fn new(config: &ExecutorConfig) -> Result<Self> {
        Ok(Self::with_timeout(config.url.clone(), config.timeout())?
            .with_max_response_bytes(config.max_response_bytes))
    }

    pub fn with_timeout(url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("runbot/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to construct execution service client")?;
        Ok(Self { client, url, max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES })
    }

    pub fn with_max_response_bytes(mut self, max_response_bytes: usize) -> Self {
        self.max_response_bytes = max_response_bytes;
        self
    }

    pub fn url(&self) -> &str { &self.url }

    pub async fn submit(&self, code: &str) -> Result<String, ExecutionError> {
        let mut response =
            self.client.post(&self.url).json(&ExecuteRequest { code }).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExecutionError::Status(status));
        }
        let limit = self.max_response_bytes;
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(ExecutionError::TooLarge(limit));
        }
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > limit {
                return Err(ExecutionError::TooLarge(limit));
            }
            body.extend_from_slice(&chunk);
        }
        let parsed: ExecuteResponse =
            serde_json::from_slice(&body).map_err(ExecutionError::Malformed)?;
        Ok(normalize_output(parsed.output))
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(&self, code: &str) -> ExecutionResult {
        tracing::debug!("Submitting {} bytes of code to {}", code.len(), self.url);
        match self.submit(code).await {
            Ok(output) => ExecutionResult::Success(output),
            Err(e) => {
                let reason = format!("{:#}", anyhow::Error::new(e));
                tracing::warn!("Execution failed: {reason}");
                ExecutionResult::Failure(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn executor(server: &MockServer, timeout: Duration) -> HttpExecutor {
        HttpExecutor::with_timeout(server.url("/execute"), timeout).expect("executor")
    }

    #[test]
    fn test_normalize_output() {
        assert_eq!(normalize_output(Some("hi\n".into())), "hi\n");
        assert_eq!(normalize_output(Some(String::new())), NO_OUTPUT_PLACEHOLDER);
        assert_eq!(normalize_output(None), NO_OUTPUT_PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_execute_success() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST).path("/execute").json_body(json!({ "code": "print('hi')" }));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({ "output": "hi\n" }));
        });
        let result = executor(&server, Duration::from_secs(5)).execute("print('hi')").await;
        assert_eq!(result, ExecutionResult::Success("hi\n".into()));
        mock.assert();
    }

    #[tokio::test]
    async fn test_execute_missing_output() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/execute");
            then.status(200).json_body(json!({ "language": "python" }));
        });
        let result = executor(&server, Duration::from_secs(5)).execute("pass").await;
        assert_eq!(result, ExecutionResult::Success(NO_OUTPUT_PLACEHOLDER.into()));
    }

    #[tokio::test]
    async fn test_execute_error_status() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/execute");
            then.status(500).body("boom");
        });
        let executor = executor(&server, Duration::from_secs(5));
        assert!(matches!(
            executor.submit("x").await,
            Err(ExecutionError::Status(StatusCode::INTERNAL_SERVER_ERROR))
        ));
        let ExecutionResult::Failure(reason) = executor.execute("x").await else {
            panic!("expected failure");
        };
        assert!(reason.contains("500"));
    }

    #[tokio::test]
    async fn test_execute_malformed_body() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/execute");
            then.status(200).body("<html>not json</html>");
        });
        let executor = executor(&server, Duration::from_secs(5));
        assert!(matches!(executor.submit("x").await, Err(ExecutionError::Malformed(_))));
        assert!(matches!(executor.execute("x").await, ExecutionResult::Failure(_)));
    }

    #[tokio::test]
    async fn test_execute_oversized_body() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/execute");
            then.status(200).json_body(json!({ "output": "x".repeat(4096) }));
        });
        let executor = executor(&server, Duration::from_secs(5)).with_max_response_bytes(1024);
        assert!(matches!(executor.submit("x").await, Err(ExecutionError::TooLarge(1024))));
        assert!(matches!(executor.execute("x").await, ExecutionResult::Failure(_)));

        let executor = executor.with_max_response_bytes(64 * 1024);
        assert_eq!(executor.execute("x").await, ExecutionResult::Success("x".repeat(4096)));
    }

    #[tokio::test]
    async fn test_execute_timeout() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/execute");
            then.status(200).delay(Duration::from_secs(3)).json_body(json!({ "output": "late" }));
        });
        let executor = executor(&server, Duration::from_millis(200));
        assert!(matches!(executor.submit("x").await, Err(ExecutionError::Timeout)));
    }

    #[tokio::test]
    async fn test_execute_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let url = format!("http://127.0.0.1:{port}/execute");
        let executor = HttpExecutor::with_timeout(url, Duration::from_secs(5)).unwrap();
        assert!(matches!(executor.submit("x").await, Err(ExecutionError::Transport(_))));
    }
}
