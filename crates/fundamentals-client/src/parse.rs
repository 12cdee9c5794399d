//! Decoding of annual-report payloads into fundamental records.
//!
//! The provider renders every numeric field as a string and uses the
//! literal `"None"` for missing values. A record missing a required field
//! is dropped outright; goodwill and intangible assets default to zero.

use exchange_rates::UsdConverter;
use serde_json::Value;
use valuation_core::{BalanceSheetRecord, FetchOutcome, IncomeRecord, ProviderFailure};

fn text_field<'a>(entry: &'a Value, key: &str) -> Option<&'a str> {
    entry.get(key).and_then(Value::as_str)
}

/// Fiscal year from a `fiscalDateEnding` like "2024-09-30".
fn fiscal_year(entry: &Value) -> Option<i32> {
    text_field(entry, "fiscalDateEnding")?.get(..4)?.parse().ok()
}

/// A field the record is meaningless without: sentinel or unparseable
/// values disqualify the whole record.
fn required_field(entry: &Value, key: &str) -> Option<f64> {
    match text_field(entry, key) {
        None | Some("" | "None") => None,
        Some(raw) => raw.parse().ok(),
    }
}

/// Goodwill-style field: a missing or sentinel value counts as zero.
fn optional_field(entry: &Value, key: &str) -> f64 {
    match text_field(entry, key) {
        None | Some("" | "None") => 0.0,
        Some(raw) => raw.parse().unwrap_or(0.0),
    }
}

/// The provider reports one currency for the whole series; read it off the
/// first report.
fn reported_currency(reports: &[Value]) -> String {
    reports
        .first()
        .and_then(|entry| text_field(entry, "reportedCurrency"))
        .unwrap_or("USD")
        .to_string()
}

fn annual_reports(payload: &Value) -> Option<&Vec<Value>> {
    payload
        .get("annualReports")
        .and_then(Value::as_array)
        .filter(|reports| !reports.is_empty())
}

/// Convert every listed field of every record, or fail the whole batch.
/// A cached series must never mix currencies, so one bad field poisons all.
async fn convert_batch<T>(
    records: &mut [T],
    currency: &str,
    fx: &dyn UsdConverter,
    fields: &[fn(&mut T) -> &mut f64],
) -> Result<(), ProviderFailure> {
    for record in records.iter_mut() {
        for field in fields {
            let value = field(record);
            *value = fx
                .to_usd(*value, currency)
                .await
                .map_err(|e| ProviderFailure::Conversion(e.to_string()))?;
        }
    }
    Ok(())
}

pub(crate) async fn income_from_payload(
    ticker: &str,
    payload: &Value,
    fx: &dyn UsdConverter,
) -> FetchOutcome<Vec<IncomeRecord>> {
    let Some(reports) = annual_reports(payload) else {
        return FetchOutcome::Miss;
    };
    let currency = reported_currency(reports);

    let mut records: Vec<IncomeRecord> = reports
        .iter()
        .filter_map(|entry| {
            Some(IncomeRecord {
                ticker: ticker.to_string(),
                fiscal_year: fiscal_year(entry)?,
                net_income: required_field(entry, "netIncome")?,
            })
        })
        .collect();

    if currency != "USD" {
        tracing::info!(%ticker, %currency, "income reported in non-USD, converting");
        let fields: &[fn(&mut IncomeRecord) -> &mut f64] = &[|r| &mut r.net_income];
        if let Err(failure) = convert_batch(&mut records, &currency, fx, fields).await {
            tracing::warn!(%ticker, %currency, %failure, "income conversion failed, dropping batch");
            return FetchOutcome::Failed(failure);
        }
    }

    if records.is_empty() {
        return FetchOutcome::Miss;
    }
    records.sort_by(|a, b| b.fiscal_year.cmp(&a.fiscal_year));
    FetchOutcome::Data(records)
}

pub(crate) async fn balance_sheets_from_payload(
    ticker: &str,
    payload: &Value,
    fx: &dyn UsdConverter,
) -> FetchOutcome<Vec<BalanceSheetRecord>> {
    let Some(reports) = annual_reports(payload) else {
        return FetchOutcome::Miss;
    };
    let currency = reported_currency(reports);

    let mut records: Vec<BalanceSheetRecord> = reports
        .iter()
        .filter_map(|entry| {
            Some(BalanceSheetRecord {
                ticker: ticker.to_string(),
                fiscal_year: fiscal_year(entry)?,
                total_assets: required_field(entry, "totalAssets")?,
                total_liabilities: required_field(entry, "totalLiabilities")?,
                total_current_assets: required_field(entry, "totalCurrentAssets")?,
                goodwill: optional_field(entry, "goodwill"),
                intangible_assets: optional_field(entry, "intangibleAssets"),
            })
        })
        .collect();

    if currency != "USD" {
        tracing::info!(%ticker, %currency, "balance sheet reported in non-USD, converting");
        let fields: &[fn(&mut BalanceSheetRecord) -> &mut f64] = &[
            |r| &mut r.total_assets,
            |r| &mut r.total_liabilities,
            |r| &mut r.total_current_assets,
            |r| &mut r.goodwill,
            |r| &mut r.intangible_assets,
        ];
        if let Err(failure) = convert_batch(&mut records, &currency, fx, fields).await {
            tracing::warn!(%ticker, %currency, %failure, "balance sheet conversion failed, dropping batch");
            return FetchOutcome::Failed(failure);
        }
    }

    if records.is_empty() {
        return FetchOutcome::Miss;
    }
    records.sort_by(|a, b| b.fiscal_year.cmp(&a.fiscal_year));
    FetchOutcome::Data(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use exchange_rates::RateError;
    use serde_json::json;

    /// Divides by a fixed USD-base rate, like the live converter would.
    struct FixedRate(f64);

    #[async_trait]
    impl UsdConverter for FixedRate {
        async fn to_usd(&self, amount: f64, from_currency: &str) -> Result<f64, RateError> {
            if from_currency == "USD" {
                return Ok(amount);
            }
            Ok(amount / self.0)
        }
    }

    /// Fails conversion for one specific amount, succeeds for the rest.
    struct FailOn(f64);

    #[async_trait]
    impl UsdConverter for FailOn {
        async fn to_usd(&self, amount: f64, from_currency: &str) -> Result<f64, RateError> {
            if (amount - self.0).abs() < f64::EPSILON {
                return Err(RateError::UnknownCurrency(from_currency.to_string()));
            }
            Ok(amount)
        }
    }

    fn income_payload(entries: &[(&str, &str)]) -> Value {
        let reports: Vec<Value> = entries
            .iter()
            .map(|(date, income)| {
                json!({
                    "fiscalDateEnding": date,
                    "reportedCurrency": "USD",
                    "netIncome": income,
                })
            })
            .collect();
        json!({ "symbol": "TEST", "annualReports": reports })
    }

    #[tokio::test]
    async fn income_sorted_descending_by_year() {
        let payload = income_payload(&[
            ("2022-12-31", "80"),
            ("2024-12-31", "100"),
            ("2023-12-31", "90"),
        ]);
        let records = income_from_payload("TEST", &payload, &FixedRate(1.0))
            .await
            .data()
            .unwrap();
        let years: Vec<i32> = records.iter().map(|r| r.fiscal_year).collect();
        assert_eq!(years, vec![2024, 2023, 2022]);
    }

    #[tokio::test]
    async fn sentinel_net_income_drops_the_record() {
        let payload = income_payload(&[
            ("2024-12-31", "100"),
            ("2023-12-31", "None"),
            ("2022-12-31", ""),
            ("2021-12-31", "not-a-number"),
            ("2020-12-31", "-50"),
        ]);
        let records = income_from_payload("TEST", &payload, &FixedRate(1.0))
            .await
            .data()
            .unwrap();
        let years: Vec<i32> = records.iter().map(|r| r.fiscal_year).collect();
        assert_eq!(years, vec![2024, 2020]);
        assert_eq!(records[1].net_income, -50.0);
    }

    #[tokio::test]
    async fn missing_fiscal_date_drops_the_record() {
        let payload = json!({
            "annualReports": [
                { "reportedCurrency": "USD", "netIncome": "100" },
                { "fiscalDateEnding": "2024-12-31", "reportedCurrency": "USD", "netIncome": "100" },
            ]
        });
        let records = income_from_payload("TEST", &payload, &FixedRate(1.0))
            .await
            .data()
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fiscal_year, 2024);
    }

    #[tokio::test]
    async fn all_records_invalid_is_a_miss() {
        let payload = income_payload(&[("2024-12-31", "None")]);
        let outcome = income_from_payload("TEST", &payload, &FixedRate(1.0)).await;
        assert_eq!(outcome, FetchOutcome::Miss);
    }

    #[tokio::test]
    async fn no_reports_key_is_a_miss() {
        let payload = json!({ "symbol": "TEST" });
        let outcome = income_from_payload("TEST", &payload, &FixedRate(1.0)).await;
        assert_eq!(outcome, FetchOutcome::Miss);
    }

    #[tokio::test]
    async fn non_usd_income_is_converted() {
        let payload = json!({
            "annualReports": [
                { "fiscalDateEnding": "2024-12-31", "reportedCurrency": "DKK", "netIncome": "700" },
            ]
        });
        let records = income_from_payload("TEST", &payload, &FixedRate(7.0))
            .await
            .data()
            .unwrap();
        assert_eq!(records[0].net_income, 100.0);
    }

    #[tokio::test]
    async fn one_failed_conversion_poisons_the_whole_batch() {
        // Seven yearly records, one of which the converter rejects: the
        // outcome must be a failure, never a six-record partial series.
        let reports: Vec<Value> = (0..7)
            .map(|i| {
                json!({
                    "fiscalDateEnding": format!("{}-12-31", 2024 - i),
                    "reportedCurrency": "EUR",
                    "netIncome": format!("{}", 100 + i),
                })
            })
            .collect();
        let payload = json!({ "annualReports": reports });

        let outcome = income_from_payload("TEST", &payload, &FailOn(103.0)).await;
        assert!(matches!(
            outcome,
            FetchOutcome::Failed(ProviderFailure::Conversion(_))
        ));
    }

    #[tokio::test]
    async fn balance_sheet_defaults_goodwill_and_intangibles_to_zero() {
        let payload = json!({
            "annualReports": [{
                "fiscalDateEnding": "2024-12-31",
                "reportedCurrency": "USD",
                "totalAssets": "1000",
                "totalLiabilities": "400",
                "totalCurrentAssets": "300",
                "goodwill": "None",
            }]
        });
        let records = balance_sheets_from_payload("TEST", &payload, &FixedRate(1.0))
            .await
            .data()
            .unwrap();
        assert_eq!(records[0].goodwill, 0.0);
        assert_eq!(records[0].intangible_assets, 0.0);
        assert_eq!(records[0].total_assets, 1000.0);
    }

    #[tokio::test]
    async fn balance_sheet_missing_required_field_drops_the_record() {
        let payload = json!({
            "annualReports": [
                {
                    "fiscalDateEnding": "2024-12-31",
                    "totalAssets": "None",
                    "totalLiabilities": "400",
                    "totalCurrentAssets": "300",
                },
                {
                    "fiscalDateEnding": "2023-12-31",
                    "totalAssets": "900",
                    "totalLiabilities": "350",
                    "totalCurrentAssets": "250",
                },
            ]
        });
        let records = balance_sheets_from_payload("TEST", &payload, &FixedRate(1.0))
            .await
            .data()
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fiscal_year, 2023);
    }

    #[tokio::test]
    async fn balance_sheet_converts_every_field() {
        let payload = json!({
            "annualReports": [{
                "fiscalDateEnding": "2024-12-31",
                "reportedCurrency": "DKK",
                "totalAssets": "7000",
                "totalLiabilities": "1400",
                "totalCurrentAssets": "700",
                "goodwill": "70",
                "intangibleAssets": "7",
            }]
        });
        let records = balance_sheets_from_payload("TEST", &payload, &FixedRate(7.0))
            .await
            .data()
            .unwrap();
        let r = &records[0];
        assert_eq!(r.total_assets, 1000.0);
        assert_eq!(r.total_liabilities, 200.0);
        assert_eq!(r.total_current_assets, 100.0);
        assert_eq!(r.goodwill, 10.0);
        assert_eq!(r.intangible_assets, 1.0);
    }
}
