use std::path::Path;
use std::time::Duration;

use reqwest::Client;

use super::Deliver;
use crate::config::CollectorConfig;
use super::error::DeliveryError;
use super::types::CollectorReply;

pub struct HttpCollector {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpCollector {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token,
        })
    }

    /// Builds a collector when a URL is configured.
    pub fn from_config(config: &CollectorConfig) -> Result<Option<Self>, DeliveryError> {
        match config.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Self::new(url, config.token.clone()).map(Some),
            _ => Ok(None),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Deliver for HttpCollector {
    async fn deliver(&self, path: &Path) -> Result<String, DeliveryError> {
        let body = tokio::fs::read(path)
            .await
            .map_err(|source| DeliveryError::MissingFile {
                path: path.to_path_buf(),
                source,
            })?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("result.json")
            .to_string();

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .header("x-result-filename", filename)
            .body(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs.saturating_mul(1000))
                .unwrap_or(1000);
            return Err(DeliveryError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());

        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                message: text,
            });
        }

        Ok(CollectorReply::confirmation(&text))
    }
}
