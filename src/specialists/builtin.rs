//! Built-in specialists
//!
//! Data-backed specialists read through the shared `UpstreamClient`; research
//! specialists ask the text generator for a brief; the rest return fixed
//! reference content.

use super::portfolio::PortfolioSummaryCapability;
use super::{Capability, CapabilitySlot, Specialist, SpecialistRegistry};
use crate::generation::TextGenerator;
use crate::models::RequestContext;
use crate::upstream::UpstreamClient;
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// Composite upstream reads a specialist can be wired to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamQuery {
    Portfolio,
    CapitalGains,
    IncomeTax,
    TaxPlanning,
    TaxInfo,
}

pub struct UpstreamCapability {
    upstream: Arc<UpstreamClient>,
    query: UpstreamQuery,
}

impl UpstreamCapability {
    pub fn new(upstream: Arc<UpstreamClient>, query: UpstreamQuery) -> Self {
        Self { upstream, query }
    }
}

#[async_trait]
impl Capability for UpstreamCapability {
    async fn invoke(&self, ctx: &RequestContext) -> Result<Value> {
        let user_id = ctx.user_id.as_str();
        debug!(round_id = %ctx.round_id, query = ?self.query, "Reading upstream data");
        match self.query {
            UpstreamQuery::Portfolio => self.upstream.fetch_portfolio(user_id).await,
            UpstreamQuery::CapitalGains => self.upstream.fetch_capital_gains(user_id).await,
            UpstreamQuery::IncomeTax => self.upstream.fetch_income_tax(user_id).await,
            UpstreamQuery::TaxPlanning => self.upstream.fetch_tax_planning(user_id).await,
            UpstreamQuery::TaxInfo => self.upstream.fetch_tax_info(user_id).await,
        }
    }
}

/// Generated research brief for the request's query
pub struct GeneratedBrief {
    generator: Arc<dyn TextGenerator>,
    instruction: &'static str,
}

impl GeneratedBrief {
    pub fn new(generator: Arc<dyn TextGenerator>, instruction: &'static str) -> Self {
        Self {
            generator,
            instruction,
        }
    }
}

#[async_trait]
impl Capability for GeneratedBrief {
    async fn invoke(&self, ctx: &RequestContext) -> Result<Value> {
        let prompt = format!("{}\n\nUser Query: \"{}\"", self.instruction, ctx.query);
        let brief = self.generator.generate(&prompt).await?;
        Ok(Value::String(brief))
    }
}

const NEWS_INSTRUCTION: &str =
    "You are a financial news analyst. Summarize major market news and sentiment relevant to the query.";
const SEARCH_INSTRUCTION: &str =
    "You are a financial research assistant. Provide concise, current market data, regulatory updates and macro context relevant to the query.";

fn tax_updates(_: &RequestContext) -> Result<Value> {
    Ok(json!({
        "latest_updates": [
            {
                "title": "Revised income tax slabs under the new regime",
                "summary": "Slabs for FY 2024-25 lower the burden for middle-income earners",
                "source": "Ministry of Finance",
                "impact": "Reduced tax burden for middle-income earners"
            },
            {
                "title": "GST simplification for small businesses",
                "summary": "Simplified structure for businesses with turnover under 2 crores",
                "source": "CBIC",
                "impact": "Easier compliance for small businesses"
            }
        ],
        "policy_changes": [
            "Enhanced digital filing requirements",
            "New tax incentives for startups",
            "Simplified GST return filing process"
        ],
        "deadlines": [
            "Income tax filing: July 31",
            "GST return filing: monthly by the 20th",
            "TDS payment: monthly by the 7th"
        ]
    }))
}

fn tax_trends(_: &RequestContext) -> Result<Value> {
    Ok(json!({
        "trends": [
            "Increasing focus on digital compliance",
            "Simplification of tax procedures",
            "Enhanced support for small businesses"
        ],
        "predictions": [
            "Further digitalization of tax processes",
            "More tax incentives for specific sectors"
        ],
        "recommendations": [
            "Stay updated with digital filing requirements",
            "Consider tax-saving investments early in the year"
        ]
    }))
}

fn financial_alerts(_: &RequestContext) -> Result<Value> {
    Ok(json!({
        "alerts": [
            {
                "type": "tax_deadline",
                "priority": "high",
                "message": "Income tax filing deadline approaching",
                "action_required": true
            },
            {
                "type": "market_alert",
                "priority": "medium",
                "message": "Significant market movement detected",
                "action_required": false
            }
        ]
    }))
}

fn compliance_status(_: &RequestContext) -> Result<Value> {
    Ok(json!({
        "compliance_status": "compliant",
        "requirements": [
            "Income tax filing required by July 31st",
            "GST returns due monthly",
            "TDS compliance verified"
        ],
        "risks": [
            "Late filing penalties if deadlines are missed",
            "Documentation requirements for large transactions"
        ]
    }))
}

fn gst_liability(_: &RequestContext) -> Result<Value> {
    Ok(json!({
        "gst_liability": 50000,
        "input_tax_credit": 30000,
        "net_gst_payable": 20000,
        "filing_requirements": [
            "GSTR-1 due by the 11th of next month",
            "GSTR-3B due by the 20th of next month",
            "Annual return GSTR-9 due by December 31st"
        ],
        "compliance_status": "compliant"
    }))
}

fn tax_reforms(_: &RequestContext) -> Result<Value> {
    Ok(json!({
        "recent_reforms": [
            {
                "title": "New tax slab changes",
                "impact": "Reduced tax burden for middle-income earners",
                "implementation_date": "2024-04-01"
            },
            {
                "title": "GST rate adjustments",
                "impact": "Simplified tax structure for small businesses",
                "implementation_date": "2024-03-01"
            }
        ],
        "upcoming_changes": [
            {
                "title": "Digital tax compliance",
                "description": "Enhanced digital filing requirements",
                "effective_date": "2024-06-01"
            }
        ]
    }))
}

fn investment_principles(_: &RequestContext) -> Result<Value> {
    Ok(json!({
        "principles": [
            "Match asset allocation to goals, horizon and risk tolerance",
            "Keep an emergency fund before adding market exposure",
            "Prefer diversified, low-cost funds for core holdings",
            "Rebalance periodically instead of timing the market"
        ],
        "tax_aware_options": [
            "ELSS funds qualify for Section 80C deductions with a 3-year lock-in",
            "Holding equity beyond one year moves gains to the long-term rate"
        ]
    }))
}

/// Registry with every built-in specialist, in planning-prompt order
pub fn create_default_registry(
    upstream: Arc<UpstreamClient>,
    generator: Arc<dyn TextGenerator>,
) -> Result<SpecialistRegistry> {
    let fetch = |query: UpstreamQuery| -> Arc<dyn Capability> {
        Arc::new(UpstreamCapability::new(upstream.clone(), query))
    };

    let mut registry = SpecialistRegistry::new();

    registry.register(
        Specialist::builder(
            "capital_gains",
            "Answers questions about capital gains from the user's stock transactions.",
        )
        .capability(CapabilitySlot::Fetch, fetch(UpstreamQuery::CapitalGains))
        .dispatch(CapabilitySlot::Fetch)
        .build()?,
    )?;

    registry.register(
        Specialist::builder(
            "investment_strategy",
            "Answers questions about investment strategy and asset allocation.",
        )
        .sync_capability(CapabilitySlot::Summary, investment_principles)
        .dispatch(CapabilitySlot::Summary)
        .build()?,
    )?;

    registry.register(
        Specialist::builder("news", "Answers questions about stock and market news.")
            .capability(
                CapabilitySlot::Fetch,
                Arc::new(GeneratedBrief::new(generator.clone(), NEWS_INSTRUCTION)),
            )
            .dispatch(CapabilitySlot::Fetch)
            .build()?,
    )?;

    registry.register(
        Specialist::builder(
            "portfolio",
            "Answers questions about the user's portfolio, holdings and net worth.",
        )
        .capability(CapabilitySlot::Fetch, fetch(UpstreamQuery::Portfolio))
        .capability(
            CapabilitySlot::Summary,
            Arc::new(PortfolioSummaryCapability::new(upstream.clone())),
        )
        .dispatch(CapabilitySlot::Summary)
        .build()?,
    )?;

    registry.register(
        Specialist::builder(
            "tax_knowledge",
            "Explains tax rules, recent tax updates and policy trends.",
        )
        .capability(CapabilitySlot::Fetch, fetch(UpstreamQuery::TaxInfo))
        .sync_capability(CapabilitySlot::Updates, tax_updates)
        .sync_capability(CapabilitySlot::Trends, tax_trends)
        .dispatch(CapabilitySlot::Updates)
        .build()?,
    )?;

    registry.register(
        Specialist::builder("tax_reform", "Analyzes tax reforms and policy changes.")
            .sync_capability(CapabilitySlot::Fetch, tax_reforms)
            .dispatch(CapabilitySlot::Fetch)
            .build()?,
    )?;

    registry.register(
        Specialist::builder(
            "google_search",
            "Finds current market data, prices and regulatory news.",
        )
        .result_key("google_search_results")
        .capability(
            CapabilitySlot::Fetch,
            Arc::new(GeneratedBrief::new(generator, SEARCH_INSTRUCTION)),
        )
        .dispatch(CapabilitySlot::Fetch)
        .build()?,
    )?;

    registry.register(
        Specialist::builder("alert", "Generates financial alerts and notifications.")
            .sync_capability(CapabilitySlot::Alerts, financial_alerts)
            .dispatch(CapabilitySlot::Alerts)
            .build()?,
    )?;

    registry.register(
        Specialist::builder(
            "tax_planning",
            "Answers questions about tax planning using the user's portfolio, income and gains.",
        )
        .capability(CapabilitySlot::Fetch, fetch(UpstreamQuery::TaxPlanning))
        .dispatch(CapabilitySlot::Fetch)
        .build()?,
    )?;

    registry.register(
        Specialist::builder(
            "legal_compliance",
            "Assesses legal compliance and regulatory requirements.",
        )
        .sync_capability(CapabilitySlot::Fetch, compliance_status)
        .dispatch(CapabilitySlot::Fetch)
        .build()?,
    )?;

    registry.register(
        Specialist::builder("gst", "Handles GST calculations and compliance.")
            .sync_capability(CapabilitySlot::Fetch, gst_liability)
            .dispatch(CapabilitySlot::Fetch)
            .build()?,
    )?;

    registry.register(
        Specialist::builder(
            "income_tax",
            "Answers questions about income tax using bank, EPF and credit data.",
        )
        .capability(CapabilitySlot::Fetch, fetch(UpstreamQuery::IncomeTax))
        .dispatch(CapabilitySlot::Fetch)
        .build()?,
    )?;

    Ok(registry)
}
