//! Generator-backed planner
//!
//! Lists every registered specialist with its description and asks the model
//! for a comma-separated selection.

use super::{parse_plan, Planner};
use crate::generation::TextGenerator;
use crate::models::{ChatRequest, ExecutionPlan};
use crate::specialists::SpecialistRegistry;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

pub struct LlmPlanner {
    generator: Arc<dyn TextGenerator>,
}

impl LlmPlanner {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    fn build_prompt(query: &str, registry: &SpecialistRegistry) -> String {
        format!(
            r#"You are a planning module. Your job is to analyze a user's query and identify which expert agents are needed to provide a complete answer.

Here are the available experts and their descriptions:
{experts}

User Query: "{query}"

Based on the query and the expert descriptions, list the experts needed, separated by commas. If the query is a simple greeting or doesn't require any specific data, respond with "None".
Example response: portfolio, news, google_search"#,
            experts = registry.describe(),
            query = query,
        )
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn create_plan(
        &self,
        request: &ChatRequest,
        registry: &SpecialistRegistry,
    ) -> Result<ExecutionPlan> {
        let prompt = Self::build_prompt(&request.query, registry);
        let reply = self.generator.generate(&prompt).await?;
        debug!(reply = %reply, "Planner reply");

        let plan = parse_plan(&reply);
        info!(plan = %plan, "Execution plan created");
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrchestrationError;
    use crate::specialists::{CapabilitySlot, Specialist};
    use crate::testing::{FailingGenerator, ScriptedGenerator};
    use serde_json::json;

    fn registry() -> SpecialistRegistry {
        let mut registry = SpecialistRegistry::new();
        for (name, description) in [
            ("portfolio", "Reads the user's holdings."),
            ("news", "Summarises market news."),
        ] {
            registry
                .register(
                    Specialist::builder(name, description)
                        .sync_capability(CapabilitySlot::Fetch, |_| Ok(json!({})))
                        .dispatch(CapabilitySlot::Fetch)
                        .build()
                        .unwrap(),
                )
                .unwrap();
        }
        registry
    }

    fn request(query: &str) -> ChatRequest {
        ChatRequest {
            user_id: "u1".to_string(),
            query: query.to_string(),
        }
    }

    #[tokio::test]
    async fn test_prompt_lists_every_specialist() {
        let generator = Arc::new(ScriptedGenerator::new("portfolio, news"));
        let planner = LlmPlanner::new(generator.clone());

        let plan = planner
            .create_plan(&request("How are my stocks?"), &registry())
            .await
            .unwrap();

        assert_eq!(plan.distinct_names(), vec!["portfolio", "news"]);
        let prompt = &generator.prompts()[0];
        assert!(prompt.contains("- portfolio: Reads the user's holdings."));
        assert!(prompt.contains("- news: Summarises market news."));
        assert!(prompt.contains("User Query: \"How are my stocks?\""));
    }

    #[tokio::test]
    async fn test_none_reply_yields_none_needed() {
        let planner = LlmPlanner::new(Arc::new(ScriptedGenerator::new("None.")));
        let plan = planner.create_plan(&request("Hi there"), &registry()).await.unwrap();
        assert_eq!(plan, ExecutionPlan::NoneNeeded);
    }

    #[tokio::test]
    async fn test_generation_failure_is_returned() {
        let planner = LlmPlanner::new(Arc::new(FailingGenerator));
        let result = planner.create_plan(&request("Hi"), &registry()).await;
        assert!(matches!(result, Err(OrchestrationError::LlmError(_))));
    }
}
