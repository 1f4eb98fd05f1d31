//! Planner trait and implementations
//!
//! The planner decides which specialists a request needs. It never executes
//! anything; an empty or "none" plan sends the request down the direct-answer path.

use crate::models::{ChatRequest, ExecutionPlan};
use crate::specialists::SpecialistRegistry;
use crate::Result;
use async_trait::async_trait;

pub mod llm;
pub use llm::LlmPlanner;

/// Trait for plan generation
#[async_trait]
pub trait Planner: Send + Sync {
    async fn create_plan(
        &self,
        request: &ChatRequest,
        registry: &SpecialistRegistry,
    ) -> Result<ExecutionPlan>;
}

/// Parse a comma-separated planner reply into a plan
pub fn parse_plan(reply: &str) -> ExecutionPlan {
    ExecutionPlan::from_names(reply.split(','))
}

/// Returns the same plan for every request
pub struct StaticPlanner {
    plan: ExecutionPlan,
}

impl StaticPlanner {
    pub fn new(plan: ExecutionPlan) -> Self {
        Self { plan }
    }

    pub fn specialists<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(ExecutionPlan::from_names(names))
    }
}

#[async_trait]
impl Planner for StaticPlanner {
    async fn create_plan(
        &self,
        _request: &ChatRequest,
        _registry: &SpecialistRegistry,
    ) -> Result<ExecutionPlan> {
        Ok(self.plan.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plan() {
        assert_eq!(
            parse_plan("portfolio, news ,google_search"),
            ExecutionPlan::Specialists(vec![
                "portfolio".to_string(),
                "news".to_string(),
                "google_search".to_string()
            ])
        );
        assert_eq!(parse_plan("None"), ExecutionPlan::NoneNeeded);
        assert_eq!(parse_plan("portfolio, none"), ExecutionPlan::NoneNeeded);
        assert_eq!(parse_plan(" , "), ExecutionPlan::NoneNeeded);
    }

    #[tokio::test]
    async fn test_static_planner() {
        let planner = StaticPlanner::specialists(["news"]);
        let request = ChatRequest {
            user_id: "u1".to_string(),
            query: "anything".to_string(),
        };
        let plan = planner
            .create_plan(&request, &SpecialistRegistry::new())
            .await
            .unwrap();
        assert_eq!(plan.distinct_names(), vec!["news"]);
    }
}
