//! Deterministic portfolio summary over the upstream net-worth payload

use super::Capability;
use crate::error::OrchestrationError;
use crate::models::RequestContext;
use crate::upstream::UpstreamClient;
use crate::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const TOP_PERFORMERS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Holding {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub total_value: f64,
    pub holdings_count: usize,
    pub asset_allocation: IndexMap<String, f64>,
    pub top_performers: Vec<Holding>,
    pub holdings: Vec<Holding>,
    pub data_sources: Vec<String>,
}

/// Money fields arrive as `{ "units": "123" }` or `{ "units": 123 }`
fn units(value: Option<&Value>) -> f64 {
    match value.and_then(|v| v.get("units")) {
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// "ASSET_TYPE_MUTUAL_FUND" → "Mutual Fund"
fn asset_label(raw: &str) -> String {
    raw.trim_start_matches("ASSET_TYPE_")
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Summarise a `fetch_portfolio` payload
pub fn summarize_portfolio(portfolio: &Value) -> Result<PortfolioSummary> {
    let net_worth = portfolio
        .get("fetch_net_worth")
        .filter(|v| v.as_object().is_some_and(|o| !o.is_empty()))
        .ok_or_else(|| {
            OrchestrationError::ExecutionError("Net worth data is missing or empty".to_string())
        })?;

    let mut data_sources: Vec<String> = portfolio
        .as_object()
        .map(|o| o.keys().cloned().collect())
        .unwrap_or_default();
    data_sources.sort();

    let mut summary = PortfolioSummary {
        data_sources,
        ..Default::default()
    };

    let response = net_worth.get("netWorthResponse");
    summary.total_value = units(response.and_then(|r| r.get("totalNetWorthValue")));

    let assets = response
        .and_then(|r| r.get("assetValues"))
        .and_then(Value::as_array);
    for asset in assets.into_iter().flatten() {
        let label = asset_label(
            asset
                .get("netWorthAttribute")
                .and_then(Value::as_str)
                .unwrap_or("UNKNOWN"),
        );
        let value = units(asset.get("value"));
        if value > 0.0 {
            *summary.asset_allocation.entry(label).or_insert(0.0) += value;
        }
    }

    let schemes = net_worth
        .pointer("/mfSchemeAnalytics/schemeAnalytics")
        .and_then(Value::as_array);
    for scheme in schemes.into_iter().flatten() {
        let name = scheme
            .pointer("/schemeDetail/nameData/longName")
            .and_then(Value::as_str)
            .unwrap_or("Unknown MF");
        let value = units(scheme.pointer("/enrichedAnalytics/analytics/schemeDetails/currentValue"));
        summary.holdings.push(Holding {
            name: name.to_string(),
            kind: "Mutual Fund".to_string(),
            value,
        });
    }

    let accounts = net_worth
        .pointer("/accountDetailsBulkResponse/accountDetailsMap")
        .and_then(Value::as_object);
    for account in accounts.into_iter().flat_map(|m| m.values()) {
        let instrument = account
            .pointer("/accountDetails/accInstrumentType")
            .and_then(Value::as_str);
        if instrument != Some("ACC_INSTRUMENT_TYPE_EQUITIES") {
            continue;
        }
        let stocks = account
            .pointer("/equitySummary/holdingsInfo")
            .and_then(Value::as_array);
        for stock in stocks.into_iter().flatten() {
            let quantity = stock.get("units").and_then(Value::as_f64).unwrap_or(0.0);
            let price = units(stock.get("lastTradedPrice"));
            summary.holdings.push(Holding {
                name: stock
                    .get("issuerName")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown Equity")
                    .to_string(),
                kind: "Equity".to_string(),
                value: quantity * price,
            });
        }
    }

    summary.holdings_count = summary.holdings.len();
    let mut ranked = summary.holdings.clone();
    ranked.sort_by(|a, b| b.value.total_cmp(&a.value));
    ranked.truncate(TOP_PERFORMERS);
    summary.top_performers = ranked;

    Ok(summary)
}

/// Fetches the user's portfolio and summarises it
pub struct PortfolioSummaryCapability {
    upstream: Arc<UpstreamClient>,
}

impl PortfolioSummaryCapability {
    pub fn new(upstream: Arc<UpstreamClient>) -> Self {
        Self { upstream }
    }
}

#[async_trait]
impl Capability for PortfolioSummaryCapability {
    async fn invoke(&self, ctx: &RequestContext) -> Result<Value> {
        let portfolio = self.upstream.fetch_portfolio(&ctx.user_id).await?;
        let summary = summarize_portfolio(&portfolio)?;
        debug!(
            round_id = %ctx.round_id,
            holdings = summary.holdings_count,
            "Portfolio summarised"
        );
        Ok(serde_json::to_value(summary)?)
    }
}
