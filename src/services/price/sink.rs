//! Best-effort persistence of fetched quotes.

use async_trait::async_trait;
use url::Url;

use crate::models::Quote;

/// Destination for recorded quotes. Failures are logged by the caller and never retried.
#[async_trait]
pub trait PriceSink: Send + Sync {
    async fn record(&self, quote: &Quote) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// POSTs `{price, timestamp, change24h, volume24h}` as JSON to a recording endpoint.
pub struct HttpPriceSink {
    url: Url,
    client: reqwest::Client,
}

impl HttpPriceSink {
    pub fn new(url: Url) -> Self {
        Self::with_client(url, reqwest::Client::new())
    }

    pub fn with_client(url: Url, client: reqwest::Client) -> Self {
        Self { url, client }
    }
}

#[async_trait]
impl PriceSink for HttpPriceSink {
    async fn record(&self, quote: &Quote) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let response = self
            .client
            .post(self.url.clone())
            .json(quote)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(format!("price sink returned HTTP {}", response.status().as_u16()).into());
        }
        Ok(())
    }
}
