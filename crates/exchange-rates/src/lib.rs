//! Daily-cached USD exchange rates and currency conversion.
//!
//! The rate service returns a full USD-base table (1 USD = `rate` units of
//! each currency). The snapshot is reused for up to 24 hours and replaced
//! wholesale on refresh; a redundant concurrent refetch just overwrites it
//! with an equally fresh table.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

const DEFAULT_ENDPOINT: &str = "https://open.er-api.com/v6/latest/USD";
const SNAPSHOT_MAX_AGE_HOURS: i64 = 24;

#[derive(Error, Debug)]
pub enum RateError {
    #[error("rate service error: {0}")]
    Service(String),

    #[error("no exchange rate for {0}")]
    UnknownCurrency(String),

    #[error("invalid rate {rate} for {currency}")]
    InvalidRate { currency: String, rate: f64 },
}

/// Converts monetary amounts in a reported currency to USD.
///
/// Fetchers take this as a capability so tests can substitute the
/// converter without a live rate service.
#[async_trait]
pub trait UsdConverter: Send + Sync {
    async fn to_usd(&self, amount: f64, from_currency: &str) -> Result<f64, RateError>;
}

#[derive(Debug, Clone)]
struct RateSnapshot {
    rates: HashMap<String, f64>,
    fetched_at: DateTime<Utc>,
}

impl RateSnapshot {
    fn is_fresh(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        now - self.fetched_at < max_age
    }
}

#[derive(Deserialize)]
struct RatesResponse {
    result: String,
    #[serde(default)]
    rates: HashMap<String, f64>,
}

/// Process-wide exchange-rate snapshot with a 24h lifetime.
pub struct RateCache {
    client: reqwest::Client,
    endpoint: String,
    max_age: Duration,
    snapshot: RwLock<Option<RateSnapshot>>,
}

impl RateCache {
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT.to_string())
    }

    pub fn with_endpoint(endpoint: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            endpoint,
            max_age: Duration::hours(SNAPSHOT_MAX_AGE_HOURS),
            snapshot: RwLock::new(None),
        }
    }

    /// Override the snapshot lifetime. Mainly for tests of the staleness rule.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Convert `amount` from `from_currency` to USD.
    ///
    /// USD amounts pass through without touching the network. Any other
    /// currency requires a fresh-enough snapshot containing the currency.
    pub async fn convert_to_usd(&self, amount: f64, from_currency: &str) -> Result<f64, RateError> {
        if from_currency == "USD" {
            return Ok(amount);
        }

        let rates = self.rates().await?;
        let rate = rates
            .get(from_currency)
            .copied()
            .ok_or_else(|| RateError::UnknownCurrency(from_currency.to_string()))?;

        if rate <= 0.0 {
            return Err(RateError::InvalidRate {
                currency: from_currency.to_string(),
                rate,
            });
        }

        // Table is USD-base (1 USD = rate units), so divide to get USD.
        Ok(amount / rate)
    }

    /// Drop the cached snapshot so the next conversion refetches.
    pub async fn clear(&self) {
        *self.snapshot.write().await = None;
    }

    /// Seed the snapshot directly, stamped as freshly fetched.
    pub async fn prime(&self, rates: HashMap<String, f64>) {
        *self.snapshot.write().await = Some(RateSnapshot {
            rates,
            fetched_at: Utc::now(),
        });
    }

    async fn rates(&self) -> Result<HashMap<String, f64>, RateError> {
        let now = Utc::now();

        {
            let guard = self.snapshot.read().await;
            if let Some(snapshot) = guard.as_ref() {
                if snapshot.is_fresh(self.max_age, now) {
                    return Ok(snapshot.rates.clone());
                }
                tracing::debug!(
                    age_secs = (now - snapshot.fetched_at).num_seconds(),
                    "exchange rate snapshot expired, refreshing"
                );
            }
        }

        let snapshot = self.fetch_snapshot().await?;
        let rates = snapshot.rates.clone();
        *self.snapshot.write().await = Some(snapshot);
        Ok(rates)
    }

    async fn fetch_snapshot(&self) -> Result<RateSnapshot, RateError> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| RateError::Service(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RateError::Service(format!("HTTP {}", response.status())));
        }

        let body: RatesResponse = response
            .json()
            .await
            .map_err(|e| RateError::Service(e.to_string()))?;

        if body.result != "success" {
            return Err(RateError::Service(format!(
                "rate service returned {:?}",
                body.result
            )));
        }
        if body.rates.is_empty() {
            return Err(RateError::Service("rate service returned no rates".to_string()));
        }

        tracing::debug!(currencies = body.rates.len(), "fetched exchange rate table");
        Ok(RateSnapshot {
            rates: body.rates,
            fetched_at: Utc::now(),
        })
    }
}

impl Default for RateCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UsdConverter for RateCache {
    async fn to_usd(&self, amount: f64, from_currency: &str) -> Result<f64, RateError> {
        self.convert_to_usd(amount, from_currency).await
    }
}
