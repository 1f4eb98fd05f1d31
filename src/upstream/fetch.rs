//! Cached fetch operations built on `call_tool`

use super::cache::{CacheKey, CacheLookup};
use super::gains::compute_capital_gains;
use super::UpstreamClient;
use crate::error::OrchestrationError;
use crate::Result;
use serde_json::{json, Map, Value};
use std::fmt;
use tracing::{debug, warn};

/// Primitive provider tools, one network call each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchOperation {
    NetWorth,
    BankTransactions,
    CreditReport,
    EpfDetails,
    MfTransactions,
    StockTransactions,
}

impl FetchOperation {
    pub fn tool_name(&self) -> &'static str {
        match self {
            FetchOperation::NetWorth => "fetch_net_worth",
            FetchOperation::BankTransactions => "fetch_bank_transactions",
            FetchOperation::CreditReport => "fetch_credit_report",
            FetchOperation::EpfDetails => "fetch_epf_details",
            FetchOperation::MfTransactions => "fetch_mf_transactions",
            FetchOperation::StockTransactions => "fetch_stock_transactions",
        }
    }
}

impl fmt::Display for FetchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tool_name())
    }
}

/// Merge constituent results, dropping failures; all failed → one error.
fn combine<'a>(
    label: &str,
    parts: impl IntoIterator<Item = (&'a str, Result<Value>)>,
) -> Result<Value> {
    let mut sections = Map::new();
    for (name, result) in parts {
        match result {
            Ok(payload) => {
                sections.insert(name.to_string(), payload);
            }
            Err(e) => debug!(section = name, error = %e, "Dropping failed section"),
        }
    }

    if sections.is_empty() {
        warn!(composite = label, "Every constituent fetch failed");
        return Err(OrchestrationError::CompositeUnavailable(label.to_string()));
    }

    Ok(Value::Object(sections))
}

impl UpstreamClient {
    async fn cached(&self, key: &CacheKey) -> Option<Value> {
        match self.cache().lookup(key).await {
            CacheLookup::Hit(payload) => {
                debug!(key = %key, "Serving payload from cache");
                Some(payload)
            }
            CacheLookup::Miss => None,
        }
    }

    /// Fetch one primitive payload for `user_id`, served from cache when fresh.
    pub async fn fetch(&self, operation: FetchOperation, user_id: &str) -> Result<Value> {
        let tool = operation.tool_name();
        let key = CacheKey::new(tool, user_id);
        if let Some(payload) = self.cached(&key).await {
            return Ok(payload);
        }

        // Composites overlap on constituents; whoever holds the gate fills for the rest.
        let _gate = self.cache().fill_gate(&key).await;
        if let Some(payload) = self.cached(&key).await {
            return Ok(payload);
        }

        let payload = self.call_tool(tool, json!({ "user_id": user_id })).await?;
        self.cache().store(key, payload.clone()).await;
        Ok(payload)
    }

    pub async fn fetch_net_worth(&self, user_id: &str) -> Result<Value> {
        self.fetch(FetchOperation::NetWorth, user_id).await
    }

    pub async fn fetch_bank_transactions(&self, user_id: &str) -> Result<Value> {
        self.fetch(FetchOperation::BankTransactions, user_id).await
    }

    pub async fn fetch_credit_report(&self, user_id: &str) -> Result<Value> {
        self.fetch(FetchOperation::CreditReport, user_id).await
    }

    pub async fn fetch_epf_details(&self, user_id: &str) -> Result<Value> {
        self.fetch(FetchOperation::EpfDetails, user_id).await
    }

    pub async fn fetch_mf_transactions(&self, user_id: &str) -> Result<Value> {
        self.fetch(FetchOperation::MfTransactions, user_id).await
    }

    pub async fn fetch_stock_transactions(&self, user_id: &str) -> Result<Value> {
        self.fetch(FetchOperation::StockTransactions, user_id).await
    }

    /// Net worth, stock and MF transactions plus EPF details
    pub async fn fetch_portfolio(&self, user_id: &str) -> Result<Value> {
        let key = CacheKey::new("portfolio", user_id);
        if let Some(payload) = self.cached(&key).await {
            return Ok(payload);
        }

        let (net_worth, stocks, funds, epf) = tokio::join!(
            self.fetch(FetchOperation::NetWorth, user_id),
            self.fetch(FetchOperation::StockTransactions, user_id),
            self.fetch(FetchOperation::MfTransactions, user_id),
            self.fetch(FetchOperation::EpfDetails, user_id),
        );

        let payload = combine(
            "portfolio",
            [
                (FetchOperation::NetWorth.tool_name(), net_worth),
                (FetchOperation::StockTransactions.tool_name(), stocks),
                (FetchOperation::MfTransactions.tool_name(), funds),
                (FetchOperation::EpfDetails.tool_name(), epf),
            ],
        )?;

        self.cache().store(key, payload.clone()).await;
        Ok(payload)
    }

    pub async fn fetch_capital_gains(&self, user_id: &str) -> Result<Value> {
        let key = CacheKey::new("capital_gains", user_id);
        if let Some(payload) = self.cached(&key).await {
            return Ok(payload);
        }

        let transactions = self
            .fetch(FetchOperation::StockTransactions, user_id)
            .await
            .map_err(|e| {
                warn!(error = %e, "Stock transactions unavailable for capital gains");
                OrchestrationError::CompositeUnavailable("capital gains".to_string())
            })?;

        let report =
            compute_capital_gains(&transactions, self.gain_policy.as_ref(), self.tax_rates);
        let payload = serde_json::to_value(report)?;

        self.cache().store(key, payload.clone()).await;
        Ok(payload)
    }

    /// Bank transactions, EPF details and credit report
    pub async fn fetch_income_tax(&self, user_id: &str) -> Result<Value> {
        let key = CacheKey::new("income_tax", user_id);
        if let Some(payload) = self.cached(&key).await {
            return Ok(payload);
        }

        let (bank, epf, credit) = tokio::join!(
            self.fetch(FetchOperation::BankTransactions, user_id),
            self.fetch(FetchOperation::EpfDetails, user_id),
            self.fetch(FetchOperation::CreditReport, user_id),
        );

        let payload = combine(
            "income tax",
            [
                (FetchOperation::BankTransactions.tool_name(), bank),
                (FetchOperation::EpfDetails.tool_name(), epf),
                (FetchOperation::CreditReport.tool_name(), credit),
            ],
        )?;

        self.cache().store(key, payload.clone()).await;
        Ok(payload)
    }

    pub async fn fetch_tax_planning(&self, user_id: &str) -> Result<Value> {
        self.fetch_tax_bundle("tax_planning", "tax planning", user_id)
            .await
    }

    pub async fn fetch_tax_info(&self, user_id: &str) -> Result<Value> {
        self.fetch_tax_bundle("tax_info", "tax info", user_id).await
    }

    /// Portfolio, income tax and capital gains under one cache entry
    async fn fetch_tax_bundle(&self, operation: &str, label: &str, user_id: &str) -> Result<Value> {
        let key = CacheKey::new(operation, user_id);
        if let Some(payload) = self.cached(&key).await {
            return Ok(payload);
        }

        let (portfolio, income_tax, capital_gains) = tokio::join!(
            self.fetch_portfolio(user_id),
            self.fetch_income_tax(user_id),
            self.fetch_capital_gains(user_id),
        );

        let payload = combine(
            label,
            [
                ("portfolio", portfolio),
                ("income_tax", income_tax),
                ("capital_gains", capital_gains),
            ],
        )?;

        self.cache().store(key, payload.clone()).await;
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;
    use crate::testing::{ScriptedReply, ScriptedTransport};
    use crate::upstream::AlwaysShortTerm;
    use std::sync::Arc;
    use std::time::Duration;

    fn client(transport: Arc<ScriptedTransport>) -> UpstreamClient {
        UpstreamClient::new(transport, &UpstreamConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_serves_repeat_fetch_until_ttl() {
        let transport = Arc::new(ScriptedTransport::new().on_tool(
            "fetch_net_worth",
            vec![ScriptedReply::Payload(json!({"netWorth": 100}))],
        ));
        let client = client(transport.clone());

        client.fetch_net_worth("u1").await.unwrap();
        client.fetch_net_worth("u1").await.unwrap();
        assert_eq!(transport.call_count("fetch_net_worth"), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        client.fetch_net_worth("u1").await.unwrap();
        assert_eq!(transport.call_count("fetch_net_worth"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_portfolio_is_byte_identical() {
        let transport = Arc::new(ScriptedTransport::new().with_default_payload(json!({"ok": true})));
        let client = client(transport.clone());

        let first = client.fetch_portfolio("u1").await.unwrap();
        let second = client.fetch_portfolio("u1").await.unwrap();

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(transport.call_count("fetch_net_worth"), 1);
        assert_eq!(transport.total_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_composite_drops_failed_sections() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .with_default_payload(json!({"ok": true}))
                .on_tool("fetch_epf_details", vec![ScriptedReply::Status(503)]),
        );
        let client = client(transport);

        let payload = client.fetch_income_tax("u1").await.unwrap();
        let sections = payload.as_object().unwrap();
        assert!(sections.contains_key("fetch_bank_transactions"));
        assert!(sections.contains_key("fetch_credit_report"));
        assert!(!sections.contains_key("fetch_epf_details"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_composite_with_every_section_failing_is_one_error() {
        let transport = Arc::new(ScriptedTransport::new().with_default_reply(ScriptedReply::Status(500)));
        let client = client(transport);

        let err = client.fetch_portfolio("u1").await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to fetch portfolio data");
        assert_eq!(
            client.cache().lookup(&CacheKey::new("portfolio", "u1")).await,
            CacheLookup::Miss
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_capital_gains_uses_configured_policy() {
        let transport = Arc::new(ScriptedTransport::new().on_tool(
            "fetch_stock_transactions",
            vec![ScriptedReply::Payload(json!({
                "transactions": [
                    {"symbol": "INFY", "type": "BUY", "amount": 100.0, "date": "2020-01-01"},
                    {"symbol": "INFY", "type": "SELL", "amount": 300.0, "date": "2022-01-01"}
                ]
            }))],
        ));
        let client = client(transport).with_gain_policy(Arc::new(AlwaysShortTerm));

        let payload = client.fetch_capital_gains("u1").await.unwrap();
        assert_eq!(payload["short_term_gains"], json!(200.0));
        assert_eq!(payload["long_term_gains"], json!(0.0));
        assert_eq!(payload["tax_liability"]["short_term_tax"], json!(30.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_constituents_are_fetched_once() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .with_latency(Duration::from_millis(50))
                .with_default_payload(json!({"transactions": []})),
        );
        let client = client(transport.clone());

        client.fetch_tax_planning("u1").await.unwrap();

        // portfolio, income tax and capital gains share EPF and stock transactions
        assert_eq!(transport.call_count("fetch_epf_details"), 1);
        assert_eq!(transport.call_count("fetch_stock_transactions"), 1);
        assert_eq!(transport.total_calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_share_one_call() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .with_latency(Duration::from_millis(50))
                .with_default_payload(json!({"netWorth": 7})),
        );
        let client = client(transport.clone());

        let (a, b) = tokio::join!(client.fetch_net_worth("u1"), client.fetch_net_worth("u1"));

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(transport.call_count("fetch_net_worth"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tax_info_bundles_sections() {
        let transport = Arc::new(ScriptedTransport::new().with_default_payload(json!({"transactions": []})));
        let client = client(transport);

        let payload = client.fetch_tax_info("u1").await.unwrap();
        for section in ["portfolio", "income_tax", "capital_gains"] {
            assert!(payload.get(section).is_some(), "missing {}", section);
        }
    }
}
