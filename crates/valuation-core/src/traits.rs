use crate::{BalanceSheetRecord, FetchOutcome, IncomeRecord};
use async_trait::async_trait;

/// Source of annual net-income series for a ticker.
#[async_trait]
pub trait IncomeSource: Send + Sync {
    async fn fetch_annual_income(&self, ticker: &str) -> FetchOutcome<Vec<IncomeRecord>>;
}

/// Source of annual balance-sheet series for a ticker.
#[async_trait]
pub trait BalanceSheetSource: Send + Sync {
    async fn fetch_balance_sheets(&self, ticker: &str) -> FetchOutcome<Vec<BalanceSheetRecord>>;
}

/// Resolves current market capitalization for a ticker.
///
/// Total failure is a normal "try later" outcome, so this never errors.
#[async_trait]
pub trait MarketCapSource: Send + Sync {
    async fn market_cap(&self, ticker: &str) -> Option<f64>;
}
