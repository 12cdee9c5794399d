use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Annual net income for one fiscal year, in USD. May be negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeRecord {
    pub ticker: String,
    pub fiscal_year: i32,
    pub net_income: f64,
}

/// Annual balance-sheet line items for one fiscal year, in USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSheetRecord {
    pub ticker: String,
    pub fiscal_year: i32,
    pub total_assets: f64,
    pub total_liabilities: f64,
    pub total_current_assets: f64,
    pub goodwill: f64,
    pub intangible_assets: f64,
}

/// A per-ticker annual series as read back from the cache.
///
/// All records share `last_refreshed` because a refresh writes the whole
/// series in a single transaction. Records are ordered descending by
/// fiscal year.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedSeries<T> {
    pub ticker: String,
    pub last_refreshed: NaiveDate,
    pub records: Vec<T>,
}

/// Trailing seven-year average P/E.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeValuation {
    pub pe_ratio: f64,
    /// Arithmetic mean of the seven most recent annual net incomes, USD.
    pub average_income: f64,
}

/// NTA / NCAV multiples from the most recent fiscal year on record.
///
/// A `p_*` ratio is `None` when its denominator is not strictly positive:
/// the multiple is undefined for a non-positive asset base, which is a
/// defined outcome rather than an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetValuation {
    pub nta: f64,
    pub ncav: f64,
    pub p_nta: Option<f64>,
    pub p_ncav: Option<f64>,
}

/// Outcome of a single provider fetch attempt.
///
/// `Miss` means legitimately no data (API key not configured, ticker
/// unknown to the provider, or nothing survived filtering) and is
/// permanent until the provider learns about the ticker. `Failed` means
/// this attempt failed and cached data, if any, should be preferred.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    Data(T),
    Miss,
    Failed(ProviderFailure),
}

impl<T> FetchOutcome<T> {
    pub fn data(self) -> Option<T> {
        match self {
            FetchOutcome::Data(data) => Some(data),
            _ => None,
        }
    }
}

/// Why a fetch attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderFailure {
    /// The provider signalled a rate limit in its response body.
    RateLimited,
    Transport(String),
    Malformed(String),
    /// A numeric field could not be converted to USD.
    Conversion(String),
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderFailure::RateLimited => write!(f, "rate limited"),
            ProviderFailure::Transport(msg) => write!(f, "transport: {}", msg),
            ProviderFailure::Malformed(msg) => write!(f, "malformed response: {}", msg),
            ProviderFailure::Conversion(msg) => write!(f, "currency conversion: {}", msg),
        }
    }
}
