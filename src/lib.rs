//! FinSight Orchestrator
//!
//! A financial-advice chat backend that:
//! - Plans which specialists a question needs
//! - Runs every selected specialist concurrently, isolating failures per task
//! - Synthesizes the specialist reports into one answer
//! - Reads user data from an authenticated, flaky upstream provider through a
//!   session-aware client with response caching and bounded retries
//!
//! FLOW:
//! REQUEST → PLAN → (none? → DIRECT ANSWER) → EXECUTE → SYNTHESIZE → RESPONSE

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod gemini;
pub mod generation;
pub mod models;
pub mod planner;
pub mod specialists;
pub mod synthesis;
pub mod upstream;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{OrchestrationError, Result};

// Re-export common types
pub use models::*;
