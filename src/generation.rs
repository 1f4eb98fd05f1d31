//! Text-generation capability
//!
//! Every prompt the orchestrator sends (planning, specialist briefs, synthesis,
//! direct answers) goes through `TextGenerator`. `GenerationPool` bounds how many
//! calls run at once and how long any one of them may take.

use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Returned whenever an answer cannot be generated
pub const FALLBACK_RESPONSE: &str = "Unable to generate a response at this time.";

/// Stateless, single-turn text generation
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Concurrency-bounded, time-bounded wrapper around another generator
pub struct GenerationPool {
    inner: Arc<dyn TextGenerator>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl GenerationPool {
    pub fn new(inner: Arc<dyn TextGenerator>, workers: usize, timeout: Duration) -> Self {
        Self {
            inner,
            permits: Arc::new(Semaphore::new(workers.max(1))),
            timeout,
        }
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

#[async_trait]
impl TextGenerator for GenerationPool {
    async fn generate(&self, prompt: &str) -> Result<String> {
        // The ceiling covers queueing for a permit as well as the call itself.
        let call = async {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|e| OrchestrationError::LlmError(format!("Generation pool closed: {}", e)))?;

            debug!(prompt_len = prompt.len(), "Generation permit acquired");
            self.inner.generate(prompt).await
        };

        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Generation call timed out");
                Err(OrchestrationError::GenerationTimeout(self.timeout.as_secs()))
            }
        }
    }
}
