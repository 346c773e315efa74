use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use serde::Serialize;

use crate::config::{build_runs_endpoint, FilterConfig};
use crate::error::{FilterError, Result};
use crate::middleware::LangSmithMiddleware;
use crate::run::{RunCreate, RunUpdate};

/// Where the filter sends its runs.
///
/// Implemented by [`LangSmithClient`]; tests and custom sinks can provide
/// their own.
#[async_trait]
pub trait RunTransport: Send + Sync {
    /// Reports the start of a run.
    async fn create_run(&self, run: &RunCreate) -> Result<()>;

    /// Reports the completion of the run identified by `run_id` (hex form).
    async fn update_run(&self, run_id: &str, update: &RunUpdate) -> Result<()>;
}

/// HTTP client for the LangSmith runs API
#[derive(Clone)]
pub struct LangSmithClient {
    client: ClientWithMiddleware,
    runs_url: String,
}

impl LangSmithClient {
    /// Builds a client with the configured timeout and the
    /// [`LangSmithMiddleware`] installed.
    pub fn new(config: &FilterConfig) -> Result<Self> {
        let reqwest_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FilterError::Config(format!("failed to build http client: {e}")))?;

        let client = ClientBuilder::new(reqwest_client)
            .with(LangSmithMiddleware::new(&config.api_key)?)
            .build();

        Ok(Self::with_client(client, &config.api_url))
    }

    /// Uses a caller-supplied middleware client.
    ///
    /// The client is used as is: it is up to the caller to add the API key
    /// header (e.g. with [`LangSmithMiddleware`]) and a timeout.
    pub fn with_client(client: ClientWithMiddleware, api_url: &str) -> Self {
        Self {
            client,
            runs_url: build_runs_endpoint(api_url),
        }
    }

    pub fn runs_url(&self) -> &str {
        &self.runs_url
    }

    fn run_url(&self, run_id: &str) -> String {
        format!("{}/{}", self.runs_url, run_id)
    }

    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
        body: &impl Serialize,
    ) -> Result<()> {
        let response = request
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(body)?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FilterError::Status { operation, status });
        }
        Ok(())
    }
}

#[async_trait]
impl RunTransport for LangSmithClient {
    async fn create_run(&self, run: &RunCreate) -> Result<()> {
        self.send("POST /runs", self.client.post(&self.runs_url), run)
            .await
    }

    async fn update_run(&self, run_id: &str, update: &RunUpdate) -> Result<()> {
        self.send(
            "PATCH /runs/{id}",
            self.client.patch(self.run_url(run_id)),
            update,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let config = FilterConfig::default()
            .with_api_url("https://api.smith.langchain.com/")
            .with_api_key("lsv2_pt_test");
        let client = LangSmithClient::new(&config).unwrap();

        assert_eq!(client.runs_url(), "https://api.smith.langchain.com/runs");
        assert_eq!(
            client.run_url("67e5504410b1426f9247bb680e5fe0c8"),
            "https://api.smith.langchain.com/runs/67e5504410b1426f9247bb680e5fe0c8"
        );
    }

    #[test]
    fn test_invalid_api_key_is_config_error() {
        let config = FilterConfig::default()
            .with_api_url("https://api.smith.langchain.com")
            .with_api_key("line\nbreak");
        assert!(matches!(
            LangSmithClient::new(&config),
            Err(FilterError::Config(_))
        ));
    }
}
