//! Upstream price sources.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde_json::Value;
use url::Url;

use super::error::FetchError;
use super::normalize::{normalize, RawQuote, SourceFormat};

/// A single upstream that can be asked for the current BTC/USD price.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Name used in logs and source status reports.
    fn name(&self) -> &str;

    /// Issue one request and normalize the answer.
    async fn fetch_raw(&self) -> Result<RawQuote, FetchError>;
}

/// HTTP GET source speaking one of the known provider formats.
pub struct HttpPriceSource {
    format: SourceFormat,
    url: Url,
    client: reqwest::Client,
}

impl HttpPriceSource {
    pub fn new(format: SourceFormat, url: Url) -> Self {
        Self::with_client(format, url, reqwest::Client::new())
    }

    /// Build a source around an existing client (shared connection pool, test setups).
    pub fn with_client(format: SourceFormat, url: Url, client: reqwest::Client) -> Self {
        Self {
            format,
            url,
            client,
        }
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl PriceSource for HttpPriceSource {
    fn name(&self) -> &str {
        self.format.name()
    }

    async fn fetch_raw(&self) -> Result<RawQuote, FetchError> {
        let response = self
            .client
            .get(self.url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UpstreamStatus(status.as_u16()));
        }

        let body: Value = response.json().await?;
        normalize(self.format, &body)
    }
}
