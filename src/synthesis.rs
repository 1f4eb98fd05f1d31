//! Synthesizer: turns a round's results into one answer

use crate::generation::{TextGenerator, FALLBACK_RESPONSE};
use crate::models::{ResultMap, TaskOutcome};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Synthesizer {
    generator: Arc<dyn TextGenerator>,
}

impl Synthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Never fails; a generation error yields the fixed fallback text.
    pub async fn synthesize(&self, query: &str, reports: &ResultMap) -> String {
        let prompt = build_prompt(query, &render_reports(reports));
        self.answer(&prompt).await
    }

    /// Same contract for a round that could not run at all
    pub async fn synthesize_failure(&self, query: &str, error: &str) -> String {
        let reports = format!("--- Report from error ---\n{}", error);
        self.answer(&build_prompt(query, &reports)).await
    }

    async fn answer(&self, prompt: &str) -> String {
        match self.generator.generate(prompt).await {
            Ok(answer) => {
                info!(answer_len = answer.len(), "Synthesized final answer");
                answer
            }
            Err(e) => {
                warn!(error = %e, "Synthesis failed, using fallback");
                FALLBACK_RESPONSE.to_string()
            }
        }
    }
}

/// `--- Report from <key> ---` blocks in map order
pub fn render_reports(reports: &ResultMap) -> String {
    reports
        .iter()
        .map(|(key, outcome)| format!("--- Report from {} ---\n{}", key, render_outcome(key, outcome)))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_outcome(key: &str, outcome: &TaskOutcome) -> String {
    match outcome {
        TaskOutcome::Success(Value::String(text)) => text.clone(),
        TaskOutcome::Success(value) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        TaskOutcome::Failure { error } => format!("Error in {}: {}", key, error),
    }
}

fn build_prompt(query: &str, reports: &str) -> String {
    format!(
        r#"You are a lead financial advisor. You have received the following reports from your team of expert agents in response to a user's query.
Your task is to synthesize all this information, identify the key insights, and formulate a single, comprehensive, and conclusive answer.
Do not just list the data; explain what it means for the user in a clear, conversational way.

Original User Query: "{query}"

--- Expert Reports ---
{reports}
---

Synthesized Conclusion:"#
    )
}
