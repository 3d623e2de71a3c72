use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt as _;
use tracing::debug;

use crate::config::Config;
use crate::error::TransportError;
use crate::stream::ByteStream;
use crate::transport::{send_with_retry, RetryPolicy};
use crate::types::{GenerateBody, RequestOptions};

/// Generation service as seen by the companion
#[async_trait]
pub(crate) trait Backend: Send + Sync {
    /// Never fails: any error or timeout reads as "not available"
    async fn probe(&self) -> bool;

    /// Opens a streamed generation, retrying per the backend's policy
    async fn generate(&self, options: &RequestOptions) -> Result<ByteStream, TransportError>;
}

/// Ollama-style `/api/generate` endpoint over HTTP
#[derive(Debug, Clone)]
pub(crate) struct OllamaClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    probe_timeout: Duration,
    policy: RetryPolicy,
}

impl OllamaClient {
    pub fn new(endpoint: &str, model: &str, policy: RetryPolicy) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            probe_timeout: policy.timeout,
            policy,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.endpoint, &config.model, config.retry_policy())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Backend for OllamaClient {
    async fn probe(&self) -> bool {
        let body = GenerateBody {
            model: &self.model,
            prompt: "test",
            stream: true,
            options: None,
        };
        let request = self.http.post(&self.endpoint).json(&body).send();

        match tokio::time::timeout(self.probe_timeout, request).await {
            Ok(Ok(response)) => {
                debug!("probe answered with {}", response.status());
                response.status().is_success()
            }
            Ok(Err(err)) => {
                debug!("probe failed: {}", err);
                false
            }
            Err(_) => {
                debug!("probe timed out after {:?}", self.probe_timeout);
                false
            }
        }
    }

    async fn generate(&self, options: &RequestOptions) -> Result<ByteStream, TransportError> {
        let body = GenerateBody::from(options);

        let response = send_with_retry(&self.policy, |attempt| {
            debug!("generation attempt {} to {}", attempt, self.endpoint);
            let request = self.http.post(&self.endpoint).json(&body);
            async move { request.send().await.map_err(TransportError::from) }
        })
        .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::status(status.as_u16(), body));
        }

        Ok(Box::pin(response.bytes_stream().map_err(TransportError::from)))
    }
}
