//! Error types for the financial advice orchestrator

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("No executable tasks found for the plan")]
    NoExecutableTasks,

    #[error("Specialist not found: {0}")]
    SpecialistNotFound(String),

    #[error("Capability {slot} not registered for specialist {specialist}")]
    CapabilityMissing { specialist: String, slot: String },

    #[error("Invalid specialist registry: {0}")]
    InvalidRegistry(String),

    #[error("Task timed out: {0}")]
    TaskTimeout(String),

    // =============================
    // Generation Errors
    // =============================

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Generation timed out after {0}s")]
    GenerationTimeout(u64),

    // =============================
    // Upstream Errors
    // =============================

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Failed to call tool {tool}")]
    ToolCallFailed { tool: String },

    #[error("Malformed upstream envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Failed to fetch {0} data")]
    CompositeUnavailable(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    // =============================
    // Configuration
    // =============================

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}
