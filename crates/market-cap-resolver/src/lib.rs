//! Current market capitalization with a primary/secondary provider chain.
//!
//! The primary is a Yahoo-style quote endpoint; when it fails for any
//! reason the resolver falls back to the fundamentals provider's company
//! overview. Total failure is an ordinary `None`, since third-party rate
//! limits make "try later" a normal outcome here.

use async_trait::async_trait;
use fundamentals_client::FundamentalsClient;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use valuation_core::MarketCapSource;

const QUOTE_BASE_URL: &str = "https://query1.finance.yahoo.com";

// Quote endpoints reject clients without a browser-ish user agent.
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36";

#[derive(Error, Debug)]
enum QuoteError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("no market cap in quote response")]
    MissingField,
}

#[derive(Deserialize)]
struct QuoteEnvelope {
    #[serde(rename = "quoteResponse")]
    quote_response: QuoteBody,
}

#[derive(Deserialize)]
struct QuoteBody {
    #[serde(default)]
    result: Vec<QuoteEntry>,
}

#[derive(Deserialize)]
struct QuoteEntry {
    #[serde(rename = "marketCap")]
    market_cap: Option<f64>,
}

/// Thin client for the primary quote provider.
pub struct QuoteClient {
    client: reqwest::Client,
    base_url: String,
}

impl QuoteClient {
    pub fn new() -> Self {
        Self::with_base_url(QUOTE_BASE_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client, base_url }
    }

    async fn market_cap(&self, ticker: &str) -> Result<f64, QuoteError> {
        let url = format!("{}/v7/finance/quote", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("symbols", ticker)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(QuoteError::Status(response.status()));
        }

        let envelope: QuoteEnvelope = response.json().await?;
        envelope
            .quote_response
            .result
            .first()
            .and_then(|entry| entry.market_cap)
            .filter(|cap| *cap > 0.0)
            .ok_or(QuoteError::MissingField)
    }
}

impl Default for QuoteClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Primary quote provider with fundamentals-overview fallback.
pub struct MarketCapResolver {
    primary: QuoteClient,
    secondary: Option<Arc<FundamentalsClient>>,
}

impl MarketCapResolver {
    pub fn new(primary: QuoteClient, secondary: Option<Arc<FundamentalsClient>>) -> Self {
        Self { primary, secondary }
    }

    /// Resolve current market cap in USD, or `None` on total failure.
    pub async fn resolve(&self, ticker: &str) -> Option<f64> {
        let ticker = ticker.to_uppercase();

        match self.primary.market_cap(&ticker).await {
            Ok(cap) => return Some(cap),
            Err(e) => {
                tracing::debug!(%ticker, error = %e, "primary quote provider failed");
            }
        }

        let secondary = self.secondary.as_ref()?;
        let cap = secondary.company_market_cap(&ticker).await;
        if cap.is_none() {
            tracing::debug!(%ticker, "secondary market cap source failed too");
        }
        cap
    }
}

#[async_trait]
impl MarketCapSource for MarketCapResolver {
    async fn market_cap(&self, ticker: &str) -> Option<f64> {
        self.resolve(ticker).await
    }
}
