//! Core data models for the orchestrator

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use uuid::Uuid;

//
// ================= Plan =================
//

/// Which specialists a request needs, as decided by the planner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPlan {
    NoneNeeded,
    Specialists(Vec<String>),
}

impl ExecutionPlan {
    /// Build a plan from raw names; a "none" anywhere collapses the whole plan.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(|name| name.as_ref().trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();

        if names.is_empty() || names.iter().any(|n| n.to_lowercase().contains("none")) {
            ExecutionPlan::NoneNeeded
        } else {
            ExecutionPlan::Specialists(names)
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ExecutionPlan::NoneNeeded => true,
            ExecutionPlan::Specialists(names) => names.is_empty(),
        }
    }

    /// Lowercased names in first-seen order, duplicates removed
    pub fn distinct_names(&self) -> Vec<String> {
        let ExecutionPlan::Specialists(names) = self else {
            return Vec::new();
        };

        let mut seen = Vec::with_capacity(names.len());
        for name in names {
            let normalized = name.trim().to_lowercase();
            if !normalized.is_empty() && !seen.contains(&normalized) {
                seen.push(normalized);
            }
        }
        seen
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionPlan::NoneNeeded => write!(f, "none"),
            ExecutionPlan::Specialists(names) => write!(f, "{}", names.join(", ")),
        }
    }
}

//
// ================= Request Context =================
//

/// Arguments every specialist capability receives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    pub round_id: Uuid,
    pub user_id: String,
    pub query: String,
}

impl RequestContext {
    pub fn new(user_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            round_id: Uuid::new_v4(),
            user_id: user_id.into(),
            query: query.into(),
        }
    }
}

//
// ================= Tasks =================
//

/// A result key paired with a unit of work that needs no further arguments
pub struct TaskDescriptor {
    pub key: String,
    pub work: BoxFuture<'static, crate::Result<Value>>,
}

impl TaskDescriptor {
    pub fn new<F>(key: impl Into<String>, work: F) -> Self
    where
        F: Future<Output = crate::Result<Value>> + Send + 'static,
    {
        Self {
            key: key.into(),
            work: Box::pin(work),
        }
    }

    /// A task that resolves immediately to the given error
    pub fn failed(key: impl Into<String>, error: crate::error::OrchestrationError) -> Self {
        Self::new(key, async move { Err(error) })
    }
}

impl fmt::Debug for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Terminal state of one task in a round
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TaskOutcome {
    Success(Value),
    Failure { error: String },
}

impl TaskOutcome {
    pub fn failure(error: impl Into<String>) -> Self {
        TaskOutcome::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success(_))
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            TaskOutcome::Success(value) => Some(value),
            TaskOutcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            TaskOutcome::Success(_) => None,
            TaskOutcome::Failure { error } => Some(error),
        }
    }
}

impl From<crate::Result<Value>> for TaskOutcome {
    fn from(result: crate::Result<Value>) -> Self {
        match result {
            Ok(value) => TaskOutcome::Success(value),
            Err(e) => TaskOutcome::failure(e.to_string()),
        }
    }
}

/// Per-round results keyed by task key, in task creation order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResultMap {
    entries: IndexMap<String, TaskOutcome>,
}

impl ResultMap {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(capacity),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, outcome: TaskOutcome) {
        self.entries.insert(key.into(), outcome);
    }

    pub fn get(&self, key: &str) -> Option<&TaskOutcome> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TaskOutcome)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn failure_count(&self) -> usize {
        self.entries.values().filter(|o| !o.is_success()).count()
    }
}

//
// ================= Chat Surface =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub query: String,
}

/// What accompanies the final answer
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ChatContext {
    /// Direct answer, no specialists were consulted
    Category { intent: String },
    /// One entry per specialist task
    Reports(ResultMap),
    /// The round as a whole could not run
    RoundFailed { error: String },
}

impl ChatContext {
    pub fn general() -> Self {
        ChatContext::Category {
            intent: "GENERAL".to_string(),
        }
    }

    pub fn reports(&self) -> Option<&ResultMap> {
        match self {
            ChatContext::Reports(map) => Some(map),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub context: ChatContext,
}

/// Progress updates emitted by the streaming chat flow
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressEvent {
    Thinking {
        content: String,
        timestamp: DateTime<Utc>,
    },
    Delegating {
        content: String,
        specialists: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    Processing {
        content: String,
        timestamp: DateTime<Utc>,
    },
    Response {
        content: String,
        context: ChatContext,
        timestamp: DateTime<Utc>,
    },
    Error {
        content: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl ProgressEvent {
    pub fn thinking(content: impl Into<String>) -> Self {
        ProgressEvent::Thinking {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn delegating(specialists: Vec<String>) -> Self {
        ProgressEvent::Delegating {
            content: format!("Delegating to {}...", specialists.join(", ")),
            specialists,
            timestamp: Utc::now(),
        }
    }

    pub fn processing(content: impl Into<String>) -> Self {
        ProgressEvent::Processing {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn response(response: ChatResponse) -> Self {
        ProgressEvent::Response {
            content: response.answer,
            context: response.context,
            timestamp: Utc::now(),
        }
    }

    pub fn error(content: impl Into<String>, error: impl Into<String>) -> Self {
        ProgressEvent::Error {
            content: content.into(),
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::Thinking { .. } => "thinking",
            ProgressEvent::Delegating { .. } => "delegating",
            ProgressEvent::Processing { .. } => "processing",
            ProgressEvent::Response { .. } => "response",
            ProgressEvent::Error { .. } => "error",
        }
    }
}
