//! Persistent per-ticker, per-fiscal-year cache for fundamentals.
//!
//! A refresh replaces the entire per-ticker series inside one transaction
//! (delete-then-insert), so readers never observe a half-written series and
//! `last_updated` is an all-or-nothing marker. Reads come back descending
//! by fiscal year.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use valuation_core::{BalanceSheetRecord, CachedSeries, IncomeRecord};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS income_statements (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ticker TEXT NOT NULL,
        fiscal_year INTEGER NOT NULL,
        net_income REAL NOT NULL,
        last_updated TEXT NOT NULL,
        UNIQUE(ticker, fiscal_year)
    )",
    "CREATE INDEX IF NOT EXISTS idx_income_statements_ticker ON income_statements(ticker)",
    "CREATE TABLE IF NOT EXISTS balance_sheets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ticker TEXT NOT NULL,
        fiscal_year INTEGER NOT NULL,
        total_assets REAL NOT NULL,
        total_liabilities REAL NOT NULL,
        total_current_assets REAL NOT NULL,
        goodwill REAL NOT NULL,
        intangible_assets REAL NOT NULL,
        last_updated TEXT NOT NULL,
        UNIQUE(ticker, fiscal_year)
    )",
    "CREATE INDEX IF NOT EXISTS idx_balance_sheets_ticker ON balance_sheets(ticker)",
];

pub struct ValuationStore {
    pool: SqlitePool,
}

impl ValuationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .with_context(|| format!("connecting to {}", url))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn init_tables(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Replace the whole income series for a ticker, stamped `as_of`.
    pub async fn save_income(
        &self,
        ticker: &str,
        records: &[IncomeRecord],
        as_of: NaiveDate,
    ) -> Result<()> {
        let ticker = ticker.to_uppercase();
        let stamp = as_of.to_string();

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM income_statements WHERE ticker = ?")
            .bind(&ticker)
            .execute(&mut *tx)
            .await?;
        for record in records {
            sqlx::query(
                "INSERT INTO income_statements (ticker, fiscal_year, net_income, last_updated)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&ticker)
            .bind(record.fiscal_year)
            .bind(record.net_income)
            .bind(&stamp)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::debug!(%ticker, rows = records.len(), %stamp, "income cache refreshed");
        Ok(())
    }

    /// Cached income series, descending by fiscal year, or `None` if the
    /// ticker has never been fetched.
    pub async fn cached_income(&self, ticker: &str) -> Result<Option<CachedSeries<IncomeRecord>>> {
        let ticker = ticker.to_uppercase();

        let rows: Vec<(i64, f64, String)> = sqlx::query_as(
            "SELECT fiscal_year, net_income, last_updated
             FROM income_statements
             WHERE ticker = ?
             ORDER BY fiscal_year DESC",
        )
        .bind(&ticker)
        .fetch_all(&self.pool)
        .await?;

        let Some((_, _, stamp)) = rows.first() else {
            return Ok(None);
        };
        let last_refreshed: NaiveDate = stamp
            .parse()
            .with_context(|| format!("bad last_updated stamp {:?}", stamp))?;

        let records = rows
            .iter()
            .map(|(year, net_income, _)| IncomeRecord {
                ticker: ticker.clone(),
                fiscal_year: *year as i32,
                net_income: *net_income,
            })
            .collect();

        Ok(Some(CachedSeries {
            ticker,
            last_refreshed,
            records,
        }))
    }

    /// Replace the whole balance-sheet series for a ticker, stamped `as_of`.
    pub async fn save_balance_sheets(
        &self,
        ticker: &str,
        records: &[BalanceSheetRecord],
        as_of: NaiveDate,
    ) -> Result<()> {
        let ticker = ticker.to_uppercase();
        let stamp = as_of.to_string();

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM balance_sheets WHERE ticker = ?")
            .bind(&ticker)
            .execute(&mut *tx)
            .await?;
        for record in records {
            sqlx::query(
                "INSERT INTO balance_sheets (
                    ticker, fiscal_year, total_assets, total_liabilities,
                    total_current_assets, goodwill, intangible_assets, last_updated
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&ticker)
            .bind(record.fiscal_year)
            .bind(record.total_assets)
            .bind(record.total_liabilities)
            .bind(record.total_current_assets)
            .bind(record.goodwill)
            .bind(record.intangible_assets)
            .bind(&stamp)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::debug!(%ticker, rows = records.len(), %stamp, "balance sheet cache refreshed");
        Ok(())
    }

    /// Cached balance-sheet series, descending by fiscal year.
    pub async fn cached_balance_sheets(
        &self,
        ticker: &str,
    ) -> Result<Option<CachedSeries<BalanceSheetRecord>>> {
        let ticker = ticker.to_uppercase();

        let rows: Vec<(i64, f64, f64, f64, f64, f64, String)> = sqlx::query_as(
            "SELECT fiscal_year, total_assets, total_liabilities, total_current_assets,
                    goodwill, intangible_assets, last_updated
             FROM balance_sheets
             WHERE ticker = ?
             ORDER BY fiscal_year DESC",
        )
        .bind(&ticker)
        .fetch_all(&self.pool)
        .await?;

        let Some(first) = rows.first() else {
            return Ok(None);
        };
        let last_refreshed: NaiveDate = first
            .6
            .parse()
            .with_context(|| format!("bad last_updated stamp {:?}", first.6))?;

        let records = rows
            .iter()
            .map(
                |(year, assets, liabilities, current_assets, goodwill, intangibles, _)| {
                    BalanceSheetRecord {
                        ticker: ticker.clone(),
                        fiscal_year: *year as i32,
                        total_assets: *assets,
                        total_liabilities: *liabilities,
                        total_current_assets: *current_assets,
                        goodwill: *goodwill,
                        intangible_assets: *intangibles,
                    }
                },
            )
            .collect();

        Ok(Some(CachedSeries {
            ticker,
            last_refreshed,
            records,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_store() -> ValuationStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory SQLite");
        let store = ValuationStore::new(pool);
        store.init_tables().await.unwrap();
        store
    }

    fn income(year: i32, net_income: f64) -> IncomeRecord {
        IncomeRecord {
            ticker: "TEST".to_string(),
            fiscal_year: year,
            net_income,
        }
    }

    fn balance(year: i32) -> BalanceSheetRecord {
        BalanceSheetRecord {
            ticker: "TEST".to_string(),
            fiscal_year: year,
            total_assets: 1000.0,
            total_liabilities: 400.0,
            total_current_assets: 300.0,
            goodwill: 50.0,
            intangible_assets: 25.0,
        }
    }

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn round_trip_preserves_values_and_descending_order() {
        let store = setup_store().await;
        let records = vec![income(2022, 80e6), income(2024, 100e6), income(2023, -90e6)];

        store
            .save_income("test", &records, day("2025-01-15"))
            .await
            .unwrap();
        let cached = store.cached_income("TEST").await.unwrap().unwrap();

        assert_eq!(cached.ticker, "TEST");
        assert_eq!(cached.last_refreshed, day("2025-01-15"));
        let years: Vec<i32> = cached.records.iter().map(|r| r.fiscal_year).collect();
        assert_eq!(years, vec![2024, 2023, 2022]);
        assert_eq!(cached.records[1].net_income, -90e6);
    }

    #[tokio::test]
    async fn rewrite_replaces_the_whole_series() {
        let store = setup_store().await;
        let five: Vec<IncomeRecord> = (2020..2025).map(|y| income(y, 10.0)).collect();
        store.save_income("TEST", &five, day("2025-01-01")).await.unwrap();

        let one = vec![income(2024, 99.0)];
        store.save_income("TEST", &one, day("2025-06-01")).await.unwrap();

        let cached = store.cached_income("TEST").await.unwrap().unwrap();
        assert_eq!(cached.records.len(), 1);
        assert_eq!(cached.records[0].fiscal_year, 2024);
        assert_eq!(cached.records[0].net_income, 99.0);
        assert_eq!(cached.last_refreshed, day("2025-06-01"));
    }

    #[tokio::test]
    async fn unknown_ticker_reads_absent() {
        let store = setup_store().await;
        assert!(store.cached_income("NOPE").await.unwrap().is_none());
        assert!(store.cached_balance_sheets("NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn variants_are_independent_per_ticker() {
        let store = setup_store().await;
        store
            .save_income("TEST", &[income(2024, 1.0)], day("2025-01-01"))
            .await
            .unwrap();

        assert!(store.cached_income("TEST").await.unwrap().is_some());
        assert!(store.cached_balance_sheets("TEST").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn balance_sheet_round_trip() {
        let store = setup_store().await;
        let records = vec![balance(2023), balance(2024)];
        store
            .save_balance_sheets("TEST", &records, day("2025-02-01"))
            .await
            .unwrap();

        let cached = store.cached_balance_sheets("TEST").await.unwrap().unwrap();
        assert_eq!(cached.records.len(), 2);
        assert_eq!(cached.records[0].fiscal_year, 2024);
        assert_eq!(cached.records[1].fiscal_year, 2023);
        assert_eq!(cached.records[0].goodwill, 50.0);
        assert_eq!(cached.last_refreshed, day("2025-02-01"));
    }

    #[tokio::test]
    async fn writes_only_touch_their_own_ticker() {
        let store = setup_store().await;
        store
            .save_income("AAA", &[income(2024, 1.0)], day("2025-01-01"))
            .await
            .unwrap();
        store
            .save_income("BBB", &[income(2024, 2.0)], day("2025-01-02"))
            .await
            .unwrap();

        let aaa = store.cached_income("AAA").await.unwrap().unwrap();
        assert_eq!(aaa.records[0].net_income, 1.0);
        assert_eq!(aaa.last_refreshed, day("2025-01-01"));
    }
}
