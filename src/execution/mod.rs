//! Parallel execution engine
//!
//! One round = one fan-out of independent tasks and one fan-in into a
//! `ResultMap`. Every task is spawned before any is awaited; a failing,
//! panicking or overdue task only ever affects its own entry.

use crate::error::OrchestrationError;
use crate::models::{ExecutionPlan, RequestContext, ResultMap, TaskDescriptor, TaskOutcome};
use crate::specialists::SpecialistRegistry;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub struct ExecutionEngine {
    registry: Arc<SpecialistRegistry>,
    round_budget: Option<Duration>,
}

impl ExecutionEngine {
    pub fn new(registry: Arc<SpecialistRegistry>) -> Self {
        Self {
            registry,
            round_budget: None,
        }
    }

    /// Tasks still running this long after the round starts are recorded as failures
    pub fn with_round_budget(mut self, budget: Option<Duration>) -> Self {
        self.round_budget = budget;
        self
    }

    pub fn registry(&self) -> &SpecialistRegistry {
        &self.registry
    }

    /// Dispatch every distinct specialist in `plan` and collect their results.
    pub async fn execute_plan(
        &self,
        plan: &ExecutionPlan,
        ctx: &RequestContext,
    ) -> Result<ResultMap> {
        let names = plan.distinct_names();
        let mut tasks = Vec::with_capacity(names.len());
        let mut resolvable = 0;

        for name in &names {
            match self.registry.dispatch_task(name, ctx) {
                Some(task) => {
                    resolvable += 1;
                    tasks.push(task);
                }
                None => {
                    warn!(round_id = %ctx.round_id, specialist = %name, "Unknown specialist in plan");
                    tasks.push(TaskDescriptor::failed(
                        format!("{}_report", name),
                        OrchestrationError::SpecialistNotFound(name.clone()),
                    ));
                }
            }
        }

        if resolvable == 0 {
            warn!(round_id = %ctx.round_id, plan = %plan, "No executable tasks for plan");
            return Err(OrchestrationError::NoExecutableTasks);
        }

        info!(round_id = %ctx.round_id, tasks = tasks.len(), "Executing plan");
        Ok(self.execute_tasks(tasks).await)
    }

    /// Run arbitrary tasks as one round with the same isolation guarantees.
    pub async fn execute_tasks(&self, tasks: Vec<TaskDescriptor>) -> ResultMap {
        let started = Instant::now();
        let deadline = self.round_budget.map(|budget| started + budget);

        let handles: Vec<_> = tasks
            .into_iter()
            .map(|task| (task.key, tokio::spawn(task.work)))
            .collect();

        let mut results = ResultMap::with_capacity(handles.len());

        for (key, mut handle) in handles {
            let joined = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, &mut handle).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        handle.abort();
                        warn!(key = %key, "Task exceeded round budget");
                        results.insert(
                            key.clone(),
                            TaskOutcome::failure(
                                OrchestrationError::TaskTimeout(key).to_string(),
                            ),
                        );
                        continue;
                    }
                },
                None => handle.await,
            };

            let outcome = match joined {
                Ok(result) => {
                    if let Err(e) = &result {
                        warn!(key = %key, error = %e, "Task failed");
                    }
                    TaskOutcome::from(result)
                }
                Err(join_error) => TaskOutcome::failure(describe_join_error(&key, join_error)),
            };

            debug!(key = %key, success = outcome.is_success(), "Task finished");
            results.insert(key, outcome);
        }

        info!(
            tasks = results.len(),
            failures = results.failure_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Round completed"
        );

        results
    }
}

fn describe_join_error(key: &str, error: JoinError) -> String {
    if error.is_panic() {
        warn!(key = %key, "Task panicked");
        format!("Task {} panicked", key)
    } else {
        format!("Task {} was cancelled", key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specialists::{CapabilitySlot, Specialist};
    use serde_json::{json, Value};

    fn registry() -> Arc<SpecialistRegistry> {
        let mut registry = SpecialistRegistry::new();
        registry
            .register(
                Specialist::builder("news", "Market news")
                    .sync_capability(CapabilitySlot::Fetch, |ctx| {
                        Ok(json!(format!("news for {}", ctx.query)))
                    })
                    .dispatch(CapabilitySlot::Fetch)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
            .register(
                Specialist::builder("portfolio", "Holdings")
                    .sync_capability(CapabilitySlot::Summary, |_| {
                        Err(OrchestrationError::ToolCallFailed {
                            tool: "fetch_net_worth".to_string(),
                        })
                    })
                    .dispatch(CapabilitySlot::Summary)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        Arc::new(registry)
    }

    fn ctx() -> RequestContext {
        RequestContext::new("u1", "markets")
    }

    fn explode() -> Result<Value> {
        panic!("specialist bug")
    }

    #[tokio::test]
    async fn test_one_entry_per_distinct_specialist() {
        let engine = ExecutionEngine::new(registry());
        let plan = ExecutionPlan::from_names(["news", "portfolio", "News"]);

        let results = engine.execute_plan(&plan, &ctx()).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results.keys().collect::<Vec<_>>(), vec!["news_report", "portfolio_report"]);
    }

    #[tokio::test]
    async fn test_failure_is_isolated_from_sibling() {
        let engine = ExecutionEngine::new(registry());
        let plan = ExecutionPlan::from_names(["portfolio", "news"]);

        let results = engine.execute_plan(&plan, &ctx()).await.unwrap();

        assert_eq!(
            results.get("portfolio_report").unwrap().error(),
            Some("Failed to call tool fetch_net_worth")
        );
        assert_eq!(
            results.get("news_report").unwrap().payload(),
            Some(&json!("news for markets"))
        );
    }

    #[tokio::test]
    async fn test_unknown_names_occupy_a_slot() {
        let engine = ExecutionEngine::new(registry());
        let plan = ExecutionPlan::from_names(["news", "weather"]);

        let results = engine.execute_plan(&plan, &ctx()).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(
            results.get("weather_report").unwrap().error(),
            Some("Specialist not found: weather")
        );
    }

    #[tokio::test]
    async fn test_no_resolvable_names_fails_the_round() {
        let engine = ExecutionEngine::new(registry());
        let plan = ExecutionPlan::from_names(["weather", "horoscope"]);

        let result = engine.execute_plan(&plan, &ctx()).await;
        assert!(matches!(result, Err(OrchestrationError::NoExecutableTasks)));
    }

    #[tokio::test]
    async fn test_long_plan_still_runs_known_specialists() {
        let engine = ExecutionEngine::new(registry());
        let mut reply = String::from("news, and I think, given the query");
        for i in 0..40 {
            reply.push_str(&format!(", filler_{}", i));
        }

        let results = engine
            .execute_plan(&crate::planner::parse_plan(&reply), &ctx())
            .await
            .unwrap();

        assert_eq!(results.len(), 43);
        assert_eq!(
            results.get("news_report").unwrap().payload(),
            Some(&json!("news for markets"))
        );
        assert_eq!(results.failure_count(), 42);
    }

    #[tokio::test]
    async fn test_panicking_task_becomes_failure() {
        let engine = ExecutionEngine::new(registry());
        let tasks = vec![
            TaskDescriptor::new("boom", async { explode() }),
            TaskDescriptor::new("fine", async { Ok(json!(1)) }),
        ];

        let results = engine.execute_tasks(tasks).await;
        assert_eq!(results.get("boom").unwrap().error(), Some("Task boom panicked"));
        assert!(results.get("fine").unwrap().is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_budget_fails_only_overdue_tasks() {
        let engine =
            ExecutionEngine::new(registry()).with_round_budget(Some(Duration::from_secs(30)));
        let tasks = vec![
            TaskDescriptor::new("slow", async {
                tokio::time::sleep(Duration::from_secs(120)).await;
                Ok(Value::Null)
            }),
            TaskDescriptor::new("quick", async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(json!("done"))
            }),
        ];

        let started = Instant::now();
        let results = engine.execute_tasks(tasks).await;

        assert_eq!(started.elapsed(), Duration::from_secs(30));
        assert_eq!(results.get("slow").unwrap().error(), Some("Task timed out: slow"));
        assert_eq!(results.get("quick").unwrap().payload(), Some(&json!("done")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tasks_run_concurrently() {
        let engine = ExecutionEngine::new(registry());
        let tasks = (0..4)
            .map(|i| {
                TaskDescriptor::new(format!("task_{}", i), async move {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(json!(i))
                })
            })
            .collect();

        let started = Instant::now();
        let results = engine.execute_tasks(tasks).await;

        assert_eq!(results.len(), 4);
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }
}
