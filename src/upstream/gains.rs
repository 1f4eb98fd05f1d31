//! Capital-gains computation over upstream stock transactions

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Minimum holding for a gain to count as long-term under the default rule
pub const LONG_TERM_HOLDING_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainClass {
    ShortTerm,
    LongTerm,
}

/// Decides whether a symbol's net gain is short- or long-term
pub trait HoldingPeriodPolicy: Send + Sync {
    fn classify(&self, first_buy: Option<NaiveDate>, last_sell: Option<NaiveDate>) -> GainClass;
}

/// Long-term when the earliest buy and latest sell are at least `min_days` apart.
/// Missing dates fall back to short-term.
#[derive(Debug, Clone)]
pub struct HoldingPeriodRule {
    pub min_days: i64,
}

impl Default for HoldingPeriodRule {
    fn default() -> Self {
        Self {
            min_days: LONG_TERM_HOLDING_DAYS,
        }
    }
}

impl HoldingPeriodPolicy for HoldingPeriodRule {
    fn classify(&self, first_buy: Option<NaiveDate>, last_sell: Option<NaiveDate>) -> GainClass {
        match (first_buy, last_sell) {
            (Some(buy), Some(sell)) if (sell - buy).num_days() >= self.min_days => {
                GainClass::LongTerm
            }
            _ => GainClass::ShortTerm,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AlwaysShortTerm;

impl HoldingPeriodPolicy for AlwaysShortTerm {
    fn classify(&self, _: Option<NaiveDate>, _: Option<NaiveDate>) -> GainClass {
        GainClass::ShortTerm
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TaxRates {
    pub short_term: f64,
    pub long_term: f64,
}

impl Default for TaxRates {
    fn default() -> Self {
        Self {
            short_term: 0.15,
            long_term: 0.10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolGains {
    pub short_term_gains: f64,
    pub long_term_gains: f64,
    pub total_gains: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxLiability {
    pub short_term_tax: f64,
    pub long_term_tax: f64,
    pub total_tax: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapitalGainsReport {
    pub short_term_gains: f64,
    pub long_term_gains: f64,
    pub total_gains: f64,
    pub stock_wise_gains: IndexMap<String, SymbolGains>,
    pub tax_liability: TaxLiability,
}

#[derive(Default)]
struct SymbolLedger {
    bought: f64,
    sold: f64,
    first_buy: Option<NaiveDate>,
    last_sell: Option<NaiveDate>,
}

/// Compute per-symbol and total gains from a `{ "transactions": [...] }` payload.
///
/// Each transaction carries `symbol`, `type` (`BUY`/`SELL`), `amount` and an
/// optional ISO `date`. Unknown types are ignored; a missing symbol is grouped
/// under `UNKNOWN`.
pub fn compute_capital_gains(
    stock_transactions: &Value,
    policy: &dyn HoldingPeriodPolicy,
    rates: TaxRates,
) -> CapitalGainsReport {
    let mut ledgers: IndexMap<String, SymbolLedger> = IndexMap::new();

    let transactions = stock_transactions
        .get("transactions")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for tx in transactions {
        let symbol = tx
            .get("symbol")
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN")
            .to_string();
        let amount = tx.get("amount").and_then(Value::as_f64).unwrap_or(0.0);
        let date = tx
            .get("date")
            .and_then(Value::as_str)
            .and_then(parse_date);

        let ledger = ledgers.entry(symbol).or_default();
        match tx.get("type").and_then(Value::as_str) {
            Some("BUY") => {
                ledger.bought += amount;
                ledger.first_buy = earliest(ledger.first_buy, date);
            }
            Some("SELL") => {
                ledger.sold += amount;
                ledger.last_sell = latest(ledger.last_sell, date);
            }
            _ => {}
        }
    }

    let mut report = CapitalGainsReport::default();
    for (symbol, ledger) in ledgers {
        let net = (ledger.sold - ledger.bought).max(0.0);
        let gains = match policy.classify(ledger.first_buy, ledger.last_sell) {
            GainClass::ShortTerm => SymbolGains {
                short_term_gains: net,
                long_term_gains: 0.0,
                total_gains: net,
            },
            GainClass::LongTerm => SymbolGains {
                short_term_gains: 0.0,
                long_term_gains: net,
                total_gains: net,
            },
        };
        report.short_term_gains += gains.short_term_gains;
        report.long_term_gains += gains.long_term_gains;
        report.stock_wise_gains.insert(symbol, gains);
    }

    report.total_gains = report.short_term_gains + report.long_term_gains;
    report.tax_liability.short_term_tax = report.short_term_gains * rates.short_term;
    report.tax_liability.long_term_tax = report.long_term_gains * rates.long_term;
    report.tax_liability.total_tax =
        report.tax_liability.short_term_tax + report.tax_liability.long_term_tax;

    report
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    // Accept plain dates and full timestamps
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn earliest(current: Option<NaiveDate>, candidate: Option<NaiveDate>) -> Option<NaiveDate> {
    match (current, candidate) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn latest(current: Option<NaiveDate>, candidate: Option<NaiveDate>) -> Option<NaiveDate> {
    match (current, candidate) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}
