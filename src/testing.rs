//! Scripted doubles for the generator and the upstream transport

use crate::error::OrchestrationError;
use crate::generation::TextGenerator;
use crate::upstream::envelope::wrap_payload;
use crate::upstream::{ToolCallEnvelope, TransportResponse, UpstreamTransport};
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Answers with the reply of the first rule whose needle occurs in the prompt
pub struct ScriptedGenerator {
    rules: Vec<(String, String)>,
    default_reply: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(default_reply: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            default_reply: default_reply.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn when(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push((needle.into(), reply.into()));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn prompts_containing(&self, needle: &str) -> usize {
        self.prompts().iter().filter(|p| p.contains(needle)).count()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let reply = self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.default_reply.clone());
        Ok(reply)
    }
}

/// Always fails, like an unreachable model endpoint
pub struct FailingGenerator;

#[async_trait]
impl TextGenerator for FailingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(OrchestrationError::LlmError("model unavailable".to_string()))
    }
}

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// 200 with the payload wrapped in a provider envelope
    Payload(Value),
    /// 200 with this exact body
    Raw(Value),
    Status(u16),
    /// Never answers within any sane attempt timeout
    Timeout,
    Fault,
}

/// Upstream transport replaying per-tool scripts.
///
/// Each tool pops its replies in order; the last one repeats forever.
pub struct ScriptedTransport {
    login_statuses: Mutex<VecDeque<u16>>,
    scripts: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
    default_reply: ScriptedReply,
    latency: Duration,
    logins: AtomicUsize,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            login_statuses: Mutex::new(VecDeque::new()),
            scripts: Mutex::new(HashMap::new()),
            default_reply: ScriptedReply::Status(404),
            latency: Duration::ZERO,
            logins: AtomicUsize::new(0),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Statuses returned by successive logins; 200 once exhausted
    pub fn with_login_statuses(self, statuses: Vec<u16>) -> Self {
        *self.login_statuses.lock().unwrap() = statuses.into();
        self
    }

    pub fn on_tool(self, tool: &str, replies: Vec<ScriptedReply>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(tool.to_string(), replies.into());
        self
    }

    /// Reply for tools without a script
    pub fn with_default_reply(mut self, reply: ScriptedReply) -> Self {
        self.default_reply = reply;
        self
    }

    pub fn with_default_payload(self, payload: Value) -> Self {
        self.with_default_reply(ScriptedReply::Payload(payload))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn call_count(&self, tool: &str) -> usize {
        self.calls.lock().unwrap().get(tool).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    fn next_reply(&self, tool: &str) -> ScriptedReply {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(tool) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or(ScriptedReply::Status(404)),
            None => self.default_reply.clone(),
        }
    }
}

#[async_trait]
impl UpstreamTransport for ScriptedTransport {
    async fn login(&self) -> Result<u16> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        Ok(self.login_statuses.lock().unwrap().pop_front().unwrap_or(200))
    }

    async fn call(&self, envelope: &ToolCallEnvelope) -> Result<TransportResponse> {
        let tool = envelope.tool_name().to_string();
        *self.calls.lock().unwrap().entry(tool.clone()).or_insert(0) += 1;
        let reply = self.next_reply(&tool);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match reply {
            ScriptedReply::Payload(payload) => Ok(TransportResponse {
                status: 200,
                body: wrap_payload(&payload),
            }),
            ScriptedReply::Raw(body) => Ok(TransportResponse { status: 200, body }),
            ScriptedReply::Status(status) => Ok(TransportResponse {
                status,
                body: Value::Null,
            }),
            ScriptedReply::Timeout => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(OrchestrationError::TransportError("unreachable".to_string()))
            }
            ScriptedReply::Fault => Err(OrchestrationError::TransportError(
                "connection reset".to_string(),
            )),
        }
    }
}
