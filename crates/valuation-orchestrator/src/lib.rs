//! Refresh orchestration and the public valuation facade.
//!
//! The orchestrator owns the staleness decision: a cached series is
//! refetched only when there is no cache at all or when the caller reports
//! a regulatory filing newer than the cache stamp. A failed refresh falls
//! back to the prior cache (stale data beats no data), and every no-data
//! path surfaces as `Ok(None)`; only store failures are hard errors.

use chrono::{NaiveDate, Utc};
use exchange_rates::{RateCache, UsdConverter};
use fundamentals_client::FundamentalsClient;
use market_cap_resolver::{MarketCapResolver, QuoteClient};
use std::sync::Arc;
use valuation_core::{
    AssetValuation, BalanceSheetRecord, BalanceSheetSource, CachedSeries, FetchOutcome,
    IncomeRecord, IncomeSource, MarketCapSource, PeValuation, ValuationError,
};
use valuation_store::ValuationStore;

mod config;
pub use config::Config;


/// Decide whether a cached series can be trusted.
///
/// Only the absence of a cache or an externally observed filing strictly
/// newer than the refresh stamp forces a fetch. Elapsed time alone never
/// does, which bounds provider calls to one per new filing rather than one
/// per time interval.
pub fn needs_refresh(
    last_refreshed: Option<NaiveDate>,
    observed_filing: Option<NaiveDate>,
) -> bool {
    match (last_refreshed, observed_filing) {
        (None, _) => true,
        (Some(last), Some(observed)) => observed > last,
        (Some(_), None) => false,
    }
}

pub struct ValuationService {
    store: ValuationStore,
    income_source: Arc<dyn IncomeSource>,
    balance_source: Arc<dyn BalanceSheetSource>,
    market_caps: Arc<dyn MarketCapSource>,
}

impl ValuationService {
    pub fn new(
        store: ValuationStore,
        income_source: Arc<dyn IncomeSource>,
        balance_source: Arc<dyn BalanceSheetSource>,
        market_caps: Arc<dyn MarketCapSource>,
    ) -> Self {
        Self {
            store,
            income_source,
            balance_source,
            market_caps,
        }
    }

    /// Wire the live providers: fundamentals API for both series and the
    /// secondary market cap, quote provider as the primary market cap.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = ValuationStore::connect(&config.database_url).await?;
        store.init_tables().await?;

        let rates: Arc<dyn UsdConverter> = Arc::new(RateCache::new());
        let fundamentals = Arc::new(FundamentalsClient::new(
            config.fundamentals_api_key.clone(),
            rates,
        ));
        let resolver = MarketCapResolver::new(QuoteClient::new(), Some(fundamentals.clone()));

        Ok(Self::new(
            store,
            fundamentals.clone(),
            fundamentals,
            Arc::new(resolver),
        ))
    }

    pub fn store(&self) -> &ValuationStore {
        &self.store
    }

    /// Trailing seven-year average P/E for a ticker.
    ///
    /// `market_cap` can be supplied by the caller or left to the resolver.
    /// `latest_filing` is the externally observed newest filing date; a
    /// value newer than the cache stamp triggers a refresh.
    pub async fn average_pe(
        &self,
        ticker: &str,
        market_cap: Option<f64>,
        latest_filing: Option<NaiveDate>,
    ) -> Result<Option<PeValuation>, ValuationError> {
        let ticker = ticker.to_uppercase();

        let Some(series) = self.income_series(&ticker, latest_filing).await? else {
            return Ok(None);
        };

        let market_cap = match market_cap {
            Some(cap) => cap,
            None => match self.market_caps.market_cap(&ticker).await {
                Some(cap) => cap,
                None => {
                    tracing::debug!(%ticker, "no market cap available");
                    return Ok(None);
                }
            },
        };

        Ok(valuation_engine::average_pe(&series.records, market_cap))
    }

    /// NTA / NCAV valuation from the most recent cached balance sheet.
    pub async fn asset_valuation(
        &self,
        ticker: &str,
        market_cap: f64,
        latest_filing: Option<NaiveDate>,
    ) -> Result<Option<AssetValuation>, ValuationError> {
        let ticker = ticker.to_uppercase();

        let Some(series) = self.balance_sheet_series(&ticker, latest_filing).await? else {
            return Ok(None);
        };
        match series.records.first() {
            Some(latest) => Ok(Some(valuation_engine::asset_valuation(latest, market_cap))),
            None => Ok(None),
        }
    }

    async fn income_series(
        &self,
        ticker: &str,
        latest_filing: Option<NaiveDate>,
    ) -> Result<Option<CachedSeries<IncomeRecord>>, ValuationError> {
        let mut cached = self
            .store
            .cached_income(ticker)
            .await
            .map_err(store_err)?;

        if needs_refresh(cached.as_ref().map(|c| c.last_refreshed), latest_filing) {
            match self.income_source.fetch_annual_income(ticker).await {
                FetchOutcome::Data(records) => {
                    let today = Utc::now().date_naive();
                    self.store
                        .save_income(ticker, &records, today)
                        .await
                        .map_err(store_err)?;
                    cached = self.store.cached_income(ticker).await.map_err(store_err)?;
                }
                FetchOutcome::Miss => {
                    tracing::debug!(%ticker, "no income data at the provider");
                }
                FetchOutcome::Failed(failure) => {
                    tracing::warn!(%ticker, %failure, "income refresh failed, keeping cached series");
                }
            }
        }

        Ok(cached)
    }

    async fn balance_sheet_series(
        &self,
        ticker: &str,
        latest_filing: Option<NaiveDate>,
    ) -> Result<Option<CachedSeries<BalanceSheetRecord>>, ValuationError> {
        let mut cached = self
            .store
            .cached_balance_sheets(ticker)
            .await
            .map_err(store_err)?;

        if needs_refresh(cached.as_ref().map(|c| c.last_refreshed), latest_filing) {
            match self.balance_source.fetch_balance_sheets(ticker).await {
                FetchOutcome::Data(records) => {
                    let today = Utc::now().date_naive();
                    self.store
                        .save_balance_sheets(ticker, &records, today)
                        .await
                        .map_err(store_err)?;
                    cached = self
                        .store
                        .cached_balance_sheets(ticker)
                        .await
                        .map_err(store_err)?;
                }
                FetchOutcome::Miss => {
                    tracing::debug!(%ticker, "no balance sheet data at the provider");
                }
                FetchOutcome::Failed(failure) => {
                    tracing::warn!(%ticker, %failure, "balance sheet refresh failed, keeping cached series");
                }
            }
        }

        Ok(cached)
    }
}

fn store_err(e: anyhow::Error) -> ValuationError {
    ValuationError::Store(e.to_string())
}
