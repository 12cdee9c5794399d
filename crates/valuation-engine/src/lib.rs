//! Valuation ratios over cached fundamentals.
//!
//! A missing ratio is a defined outcome, not an error: short or gapped
//! income series, loss-making trailing averages, and non-positive asset
//! bases all come back as `None` rather than a sentinel number.

use valuation_core::{AssetValuation, BalanceSheetRecord, IncomeRecord, PeValuation};

/// Years of trailing income that go into the average P/E.
pub const PE_WINDOW_YEARS: usize = 7;

/// Trailing seven-year average P/E.
///
/// `records` must be ordered descending by fiscal year, as read from the
/// cache. The seven most recent years must be strictly consecutive: an
/// average over a gapped window would blend non-adjacent years into a
/// misleading number, so a gap yields no result at all.
pub fn average_pe(records: &[IncomeRecord], market_cap: f64) -> Option<PeValuation> {
    if records.len() < PE_WINDOW_YEARS {
        return None;
    }
    let window = &records[..PE_WINDOW_YEARS];

    for pair in window.windows(2) {
        if pair[0].fiscal_year - pair[1].fiscal_year != 1 {
            return None;
        }
    }

    let average_income =
        window.iter().map(|r| r.net_income).sum::<f64>() / PE_WINDOW_YEARS as f64;

    // P/E is meaningless against a loss-making trailing average.
    if average_income <= 0.0 {
        return None;
    }

    Some(PeValuation {
        pe_ratio: market_cap / average_income,
        average_income,
    })
}

/// NTA and NCAV multiples from a single balance sheet.
///
/// These are point-in-time balance metrics, so only the most recent fiscal
/// year is used, never an average. Each multiple is present only when its
/// denominator is strictly positive.
pub fn asset_valuation(record: &BalanceSheetRecord, market_cap: f64) -> AssetValuation {
    let nta =
        record.total_assets - record.total_liabilities - record.goodwill - record.intangible_assets;
    let ncav = record.total_current_assets - record.total_liabilities;

    AssetValuation {
        nta,
        ncav,
        p_nta: (nta > 0.0).then(|| market_cap / nta),
        p_ncav: (ncav > 0.0).then(|| market_cap / ncav),
    }
}
