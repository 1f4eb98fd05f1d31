//! RPC envelope for the upstream tool endpoint
//!
//! Responses wrap the real payload as a JSON string at `result.content[0].text`,
//! so a successful response is decoded twice.

use crate::error::OrchestrationError;
use crate::Result;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct ToolCallEnvelope {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: ToolCallParams,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolCallParams {
    pub name: String,
    pub arguments: Value,
}

impl ToolCallEnvelope {
    pub fn new(id: u64, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: "tools/call",
            params: ToolCallParams {
                name: name.into(),
                arguments,
            },
        }
    }

    pub fn tool_name(&self) -> &str {
        &self.params.name
    }
}

/// What a 200 response actually carried
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPayload {
    Data(Value),
    /// The provider answered 200 but the session is not authenticated
    LoginRequired,
}

pub fn decode_response(body: &Value) -> Result<DecodedPayload> {
    let text = body
        .pointer("/result/content/0/text")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            OrchestrationError::MalformedEnvelope(
                "missing result.content[0].text".to_string(),
            )
        })?;

    let payload: Value = serde_json::from_str(text).map_err(|e| {
        OrchestrationError::MalformedEnvelope(format!("embedded payload is not JSON: {}", e))
    })?;

    if payload.get("status").and_then(Value::as_str) == Some("login_required") {
        return Ok(DecodedPayload::LoginRequired);
    }

    Ok(DecodedPayload::Data(payload))
}

/// Wrap a payload the way the provider does; used by test transports.
#[cfg(test)]
pub fn wrap_payload(payload: &Value) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": {
            "content": [{ "type": "text", "text": payload.to_string() }]
        }
    })
}
