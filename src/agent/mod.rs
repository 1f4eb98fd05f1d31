//! Main orchestrator - plan, execute, synthesize
//!
//! REQUEST → PLAN → (none? → DIRECT ANSWER) → EXECUTE → SYNTHESIZE → RESPONSE

use crate::config::AppConfig;
use crate::execution::ExecutionEngine;
use crate::gemini::GeminiClient;
use crate::generation::{GenerationPool, TextGenerator, FALLBACK_RESPONSE};
use crate::models::{
    ChatContext, ChatRequest, ChatResponse, ExecutionPlan, ProgressEvent, RequestContext,
    ResultMap, TaskDescriptor,
};
use crate::planner::{LlmPlanner, Planner};
use crate::specialists::{create_default_registry, CapabilitySlot};
use crate::synthesis::Synthesizer;
use crate::upstream::UpstreamClient;
use crate::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Tasks of the pre-defined comprehensive analysis: (result key, specialist, slot)
const COMPREHENSIVE_TASKS: [(&str, &str, CapabilitySlot); 5] = [
    ("portfolio_summary", "portfolio", CapabilitySlot::Summary),
    ("tax_updates", "tax_knowledge", CapabilitySlot::Updates),
    ("tax_trends", "tax_knowledge", CapabilitySlot::Trends),
    ("capital_gains", "capital_gains", CapabilitySlot::Fetch),
    ("alerts", "alert", CapabilitySlot::Alerts),
];

/// Coordinates the planner, the execution engine and the synthesizer
pub struct Orchestrator {
    planner: Box<dyn Planner>,
    engine: ExecutionEngine,
    synthesizer: Synthesizer,
    generator: Arc<dyn TextGenerator>,
}

impl Orchestrator {
    pub fn new(
        planner: Box<dyn Planner>,
        engine: ExecutionEngine,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            planner,
            engine,
            synthesizer: Synthesizer::new(generator.clone()),
            generator,
        }
    }

    /// Wire the production stack: Gemini behind a bounded pool, the HTTP
    /// upstream client and the built-in specialists.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let gemini: Arc<dyn TextGenerator> = Arc::new(GeminiClient::new(&config.generation)?);
        let generator: Arc<dyn TextGenerator> = Arc::new(GenerationPool::new(
            gemini,
            config.generation.workers,
            config.generation.timeout,
        ));

        let upstream = Arc::new(UpstreamClient::from_config(&config.upstream)?);
        let registry = Arc::new(create_default_registry(upstream, generator.clone())?);
        let engine = ExecutionEngine::new(registry).with_round_budget(config.round_budget);
        let planner = Box::new(LlmPlanner::new(generator.clone()));

        info!(
            specialists = engine.registry().len(),
            workers = config.generation.workers,
            "Orchestrator initialized"
        );

        Ok(Self::new(planner, engine, generator))
    }

    /// Answer one chat request. Never fails; every error ends up in the
    /// answer or the context.
    pub async fn handle_query(&self, request: ChatRequest) -> ChatResponse {
        self.respond(request, None).await
    }

    /// Same flow as `handle_query`, reporting progress on `events`.
    ///
    /// The final event is always `response`. A closed receiver does not stop the round.
    pub async fn handle_query_stream(
        &self,
        request: ChatRequest,
        events: mpsc::Sender<ProgressEvent>,
    ) {
        let response = self.respond(request, Some(&events)).await;
        emit(Some(&events), ProgressEvent::response(response)).await;
    }

    async fn respond(
        &self,
        request: ChatRequest,
        events: Option<&mpsc::Sender<ProgressEvent>>,
    ) -> ChatResponse {
        let ctx = RequestContext::new(request.user_id.as_str(), request.query.as_str());
        info!(round_id = %ctx.round_id, user_id = %ctx.user_id, "Handling chat request");

        emit(events, ProgressEvent::thinking("Analyzing your request...")).await;

        // === PLAN ===
        let plan = match self.planner.create_plan(&request, self.engine.registry()).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!(round_id = %ctx.round_id, error = %e, "Planning failed, answering directly");
                ExecutionPlan::NoneNeeded
            }
        };

        if plan.is_empty() {
            info!(round_id = %ctx.round_id, "No specialists needed, handling as a general query");
            return ChatResponse {
                answer: self.direct_answer(&request.query).await,
                context: ChatContext::general(),
            };
        }

        // === EXECUTE ===
        let names = plan.distinct_names();
        emit(events, ProgressEvent::delegating(names.clone())).await;
        emit(
            events,
            ProgressEvent::processing(format!("Consulting {} specialist(s)...", names.len())),
        )
        .await;

        let (answer, context) = match self.engine.execute_plan(&plan, &ctx).await {
            Ok(reports) => {
                debug!(round_id = %ctx.round_id, entries = reports.len(), "Synthesizing reports");
                emit(events, ProgressEvent::processing("Compiling results...")).await;
                let answer = self.synthesizer.synthesize(&request.query, &reports).await;
                (answer, ChatContext::Reports(reports))
            }
            Err(e) => {
                let error = e.to_string();
                warn!(round_id = %ctx.round_id, error = %error, "Round failed");
                emit(
                    events,
                    ProgressEvent::error(
                        "None of the requested specialists could run.",
                        error.clone(),
                    ),
                )
                .await;
                let answer = self.synthesizer.synthesize_failure(&request.query, &error).await;
                (answer, ChatContext::RoundFailed { error })
            }
        };

        ChatResponse { answer, context }
    }

    async fn direct_answer(&self, query: &str) -> String {
        match self.generator.generate(&format!("User Query: {}", query)).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "Direct answer failed, using fallback");
                FALLBACK_RESPONSE.to_string()
            }
        }
    }

    /// Run the fixed set of analysis tasks as one round.
    ///
    /// With a query, a `real_time_data` entry from the search specialist is added.
    pub async fn run_comprehensive_analysis(
        &self,
        user_id: &str,
        query: Option<&str>,
    ) -> ResultMap {
        let ctx = RequestContext::new(user_id, query.unwrap_or_default());
        let registry = self.engine.registry();

        let mut tasks: Vec<TaskDescriptor> = COMPREHENSIVE_TASKS
            .iter()
            .map(|(key, specialist, slot)| registry.task_for(specialist, *slot, *key, &ctx))
            .collect();

        if query.is_some() {
            tasks.push(registry.task_for(
                "google_search",
                CapabilitySlot::Fetch,
                "real_time_data",
                &ctx,
            ));
        }

        info!(
            round_id = %ctx.round_id,
            user_id = %user_id,
            tasks = tasks.len(),
            "Running comprehensive analysis"
        );
        self.engine.execute_tasks(tasks).await
    }
}

async fn emit(events: Option<&mpsc::Sender<ProgressEvent>>, event: ProgressEvent) {
    if let Some(tx) = events {
        let kind = event.kind();
        if tx.send(event).await.is_err() {
            debug!(event = kind, "Progress receiver dropped");
        }
    }
}
