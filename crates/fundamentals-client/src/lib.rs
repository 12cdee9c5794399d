//! Client for an Alpha-Vantage-style fundamentals API.
//!
//! Exposes the annual income-statement and balance-sheet fetchers plus the
//! company-overview market-cap lookup. The provider signals errors inside a
//! 200 response body, so those are decoded into [`FetchOutcome`] variants
//! rather than surfaced as transport errors.

use async_trait::async_trait;
use exchange_rates::UsdConverter;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use valuation_core::{
    BalanceSheetRecord, BalanceSheetSource, FetchOutcome, IncomeRecord, IncomeSource,
    ProviderFailure,
};

mod limiter;
mod parse;

use limiter::RequestLimiter;

const BASE_URL: &str = "https://www.alphavantage.co";

/// Requests per minute unless `FUNDAMENTALS_RATE_LIMIT` overrides it.
/// Free-tier keys allow 5/min; premium plans go to 75+.
const DEFAULT_RATE_LIMIT: usize = 5;

enum QueryFailure {
    NotConfigured,
    UnknownTicker,
    RateLimited,
    Transport(String),
    Malformed(String),
}

impl QueryFailure {
    fn into_outcome<T>(self) -> FetchOutcome<T> {
        match self {
            QueryFailure::NotConfigured | QueryFailure::UnknownTicker => FetchOutcome::Miss,
            QueryFailure::RateLimited => FetchOutcome::Failed(ProviderFailure::RateLimited),
            QueryFailure::Transport(msg) => FetchOutcome::Failed(ProviderFailure::Transport(msg)),
            QueryFailure::Malformed(msg) => FetchOutcome::Failed(ProviderFailure::Malformed(msg)),
        }
    }
}

pub struct FundamentalsClient {
    api_key: Option<String>,
    client: reqwest::Client,
    fx: Arc<dyn UsdConverter>,
    limiter: RequestLimiter,
}

impl FundamentalsClient {
    pub fn new(api_key: Option<String>, fx: Arc<dyn UsdConverter>) -> Self {
        let rate_limit: usize = std::env::var("FUNDAMENTALS_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            api_key: api_key.filter(|k| !k.is_empty()),
            client,
            fx,
            limiter: RequestLimiter::new(rate_limit),
        }
    }

    /// Read the API key from `ALPHA_VANTAGE_API_KEY`. An unset key is not an
    /// error; every fetch just reports a miss without touching the network.
    pub fn from_env(fx: Arc<dyn UsdConverter>) -> Self {
        Self::new(std::env::var("ALPHA_VANTAGE_API_KEY").ok(), fx)
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Annual net income, USD, descending by fiscal year.
    pub async fn annual_income(&self, ticker: &str) -> FetchOutcome<Vec<IncomeRecord>> {
        let ticker = ticker.to_uppercase();
        let payload = match self.query("INCOME_STATEMENT", &ticker).await {
            Ok(payload) => payload,
            Err(failure) => return failure.into_outcome(),
        };
        parse::income_from_payload(&ticker, &payload, self.fx.as_ref()).await
    }

    /// Annual balance-sheet line items, USD, descending by fiscal year.
    pub async fn annual_balance_sheets(&self, ticker: &str) -> FetchOutcome<Vec<BalanceSheetRecord>> {
        let ticker = ticker.to_uppercase();
        let payload = match self.query("BALANCE_SHEET", &ticker).await {
            Ok(payload) => payload,
            Err(failure) => return failure.into_outcome(),
        };
        parse::balance_sheets_from_payload(&ticker, &payload, self.fx.as_ref()).await
    }

    /// Market capitalization from the company overview, used as the
    /// secondary market-cap source. Collapses every failure to `None`.
    pub async fn company_market_cap(&self, ticker: &str) -> Option<f64> {
        let ticker = ticker.to_uppercase();
        let payload = match self.query("OVERVIEW", &ticker).await {
            Ok(payload) => payload,
            Err(_) => {
                tracing::debug!(%ticker, "company overview unavailable");
                return None;
            }
        };
        payload
            .get("MarketCapitalization")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse::<f64>().ok())
            .filter(|cap| *cap > 0.0)
    }

    async fn query(&self, function: &str, ticker: &str) -> Result<Value, QueryFailure> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(QueryFailure::NotConfigured);
        };

        self.limiter.acquire().await;

        let url = format!("{}/query", BASE_URL);
        let response = self
            .client
            .get(&url)
            .query(&[("function", function), ("symbol", ticker), ("apikey", api_key)])
            .send()
            .await
            .map_err(|e| QueryFailure::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(QueryFailure::Transport(format!("HTTP {}", response.status())));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| QueryFailure::Malformed(e.to_string()))?;

        // The provider reports errors in the body with a 200 status.
        if payload.get("Error Message").is_some() {
            tracing::debug!(%ticker, function, "provider does not know this ticker");
            return Err(QueryFailure::UnknownTicker);
        }
        if payload.get("Note").is_some() || payload.get("Information").is_some() {
            tracing::warn!(%ticker, function, "provider rate limit reached");
            return Err(QueryFailure::RateLimited);
        }

        Ok(payload)
    }
}

#[async_trait]
impl IncomeSource for FundamentalsClient {
    async fn fetch_annual_income(&self, ticker: &str) -> FetchOutcome<Vec<IncomeRecord>> {
        self.annual_income(ticker).await
    }
}

#[async_trait]
impl BalanceSheetSource for FundamentalsClient {
    async fn fetch_balance_sheets(&self, ticker: &str) -> FetchOutcome<Vec<BalanceSheetRecord>> {
        self.annual_balance_sheets(ticker).await
    }
}
