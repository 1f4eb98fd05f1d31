//! Upstream Session Client
//!
//! Talks to the personal-finance data provider: logs in with phone/OTP
//! credentials, keeps the session fresh, issues RPC tool calls with bounded
//! retries and caches every payload for a short TTL.
//!
//! ```text
//! call_tool
//!   ├─ ensure_authenticated ── login (gated, re-checked)
//!   ├─ attempt 1 ── 200 → decode → payload
//!   │     ├─ 401 / login_required → re-login once, resend
//!   │     └─ other / timeout / fault → sleep, attempt 2
//!   └─ attempt 2 ── failure → ToolCallFailed
//! ```

pub mod cache;
pub mod envelope;
pub mod fetch;
pub mod gains;
pub mod session;

pub use cache::{CacheKey, CacheLookup, ResponseCache};
pub use envelope::{decode_response, DecodedPayload, ToolCallEnvelope};
pub use fetch::FetchOperation;
pub use gains::{
    AlwaysShortTerm, CapitalGainsReport, HoldingPeriodPolicy, HoldingPeriodRule, TaxRates,
};
pub use session::{SessionStamp, SessionState};

use crate::config::UpstreamConfig;
use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Data-fetch attempts per logical tool call
pub const MAX_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Value,
}

/// Wire-level access to the provider; the client owns all policy.
#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    /// Perform the credential exchange and return the HTTP status
    async fn login(&self) -> Result<u16>;

    async fn call(&self, envelope: &ToolCallEnvelope) -> Result<TransportResponse>;
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: Client,
    login_url: String,
    tool_url: String,
    session_id: String,
    phone_number: String,
    otp: String,
}

impl HttpTransport {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self {
            client,
            login_url: config.login_url(),
            tool_url: config.tool_url(),
            session_id: config.session_id.clone(),
            phone_number: config.phone_number.clone(),
            otp: config.otp.clone(),
        })
    }
}

#[async_trait]
impl UpstreamTransport for HttpTransport {
    async fn login(&self) -> Result<u16> {
        let response = self
            .client
            .post(&self.login_url)
            .form(&[
                ("phoneNumber", self.phone_number.as_str()),
                ("otp", self.otp.as_str()),
            ])
            .send()
            .await
            .map_err(|e| OrchestrationError::TransportError(format!("login request failed: {}", e)))?;

        Ok(response.status().as_u16())
    }

    async fn call(&self, envelope: &ToolCallEnvelope) -> Result<TransportResponse> {
        let response = self
            .client
            .post(&self.tool_url)
            .header("Content-Type", "application/json")
            .header("Mcp-Session-Id", &self.session_id)
            .json(envelope)
            .send()
            .await
            .map_err(|e| {
                OrchestrationError::TransportError(format!(
                    "tool request {} failed: {}",
                    envelope.tool_name(),
                    e
                ))
            })?;

        let status = response.status().as_u16();
        let body = if status == 200 {
            let text = response.text().await.map_err(|e| {
                OrchestrationError::TransportError(format!(
                    "reading {} response failed: {}",
                    envelope.tool_name(),
                    e
                ))
            })?;
            parse_body(text)
        } else {
            Value::Null
        };

        Ok(TransportResponse { status, body })
    }
}

/// A body that is not JSON is kept as a string; decoding rejects it like any other bad envelope.
fn parse_body(text: String) -> Value {
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

enum AttemptFailure {
    Unauthorized,
    Other(String),
}

pub struct UpstreamClient {
    transport: Arc<dyn UpstreamTransport>,
    session: SessionState,
    cache: ResponseCache,
    /// Serialises login exchanges so concurrent callers share one login
    login_gate: Mutex<()>,
    attempt_timeout: Duration,
    retry_delay: Duration,
    next_id: AtomicU64,
    gain_policy: Arc<dyn HoldingPeriodPolicy>,
    tax_rates: TaxRates,
}

impl UpstreamClient {
    pub fn new(transport: Arc<dyn UpstreamTransport>, config: &UpstreamConfig) -> Self {
        Self {
            transport,
            session: SessionState::new(config.session_ttl),
            cache: ResponseCache::new(config.cache_ttl),
            login_gate: Mutex::new(()),
            attempt_timeout: config.attempt_timeout,
            retry_delay: config.retry_delay,
            next_id: AtomicU64::new(1),
            gain_policy: Arc::new(HoldingPeriodRule::default()),
            tax_rates: TaxRates::default(),
        }
    }

    pub fn from_config(config: &UpstreamConfig) -> Result<Self> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    pub fn with_gain_policy(mut self, policy: Arc<dyn HoldingPeriodPolicy>) -> Self {
        self.gain_policy = policy;
        self
    }

    pub fn with_tax_rates(mut self, rates: TaxRates) -> Self {
        self.tax_rates = rates;
        self
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub(crate) fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// No-op while the session is fresh; otherwise performs one login exchange.
    pub async fn ensure_authenticated(&self) -> Result<()> {
        if self.session.is_fresh().await {
            return Ok(());
        }

        let _gate = self.login_gate.lock().await;
        // Someone else may have logged in while we waited
        if self.session.is_fresh().await {
            return Ok(());
        }

        self.login().await
    }

    /// Re-login after the session observed by a request was rejected.
    async fn relogin(&self, observed: Option<SessionStamp>) -> Result<()> {
        self.session.invalidate_if(observed).await;

        let _gate = self.login_gate.lock().await;
        let current = self.session.stamp().await;
        if current.is_some() && current != observed && self.session.is_fresh().await {
            debug!("Session already refreshed by a concurrent caller");
            return Ok(());
        }

        self.login().await
    }

    async fn login(&self) -> Result<()> {
        let outcome = tokio::time::timeout(self.attempt_timeout, self.transport.login()).await;

        let reason = match outcome {
            Ok(Ok(status)) if (200..300).contains(&status) => {
                let stamp = self.session.mark_authenticated().await;
                info!(epoch = stamp.epoch, "Upstream login successful");
                return Ok(());
            }
            Ok(Ok(status)) => format!("provider returned status {}", status),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", self.attempt_timeout),
        };

        self.session.invalidate().await;
        warn!(reason = %reason, "Upstream login failed");
        Err(OrchestrationError::LoginFailed(reason))
    }

    /// Invoke one provider tool and return its decoded payload.
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value> {
        self.ensure_authenticated().await?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = ToolCallEnvelope::new(id, tool, arguments);

        let mut attempt = 1;
        let mut relogin_used = false;

        loop {
            let observed = self.session.stamp().await;
            let outcome =
                tokio::time::timeout(self.attempt_timeout, self.transport.call(&envelope)).await;

            let failure = match outcome {
                Ok(Ok(response)) if response.status == 200 => {
                    match decode_response(&response.body)? {
                        DecodedPayload::Data(payload) => {
                            debug!(tool = %tool, attempt, "Tool call succeeded");
                            return Ok(payload);
                        }
                        DecodedPayload::LoginRequired => AttemptFailure::Unauthorized,
                    }
                }
                Ok(Ok(response)) if response.status == 401 => AttemptFailure::Unauthorized,
                Ok(Ok(response)) => {
                    AttemptFailure::Other(format!("status {}", response.status))
                }
                Ok(Err(e)) => AttemptFailure::Other(e.to_string()),
                Err(_) => AttemptFailure::Other("timed out".to_string()),
            };

            match failure {
                AttemptFailure::Unauthorized if attempt == 1 && !relogin_used => {
                    warn!(tool = %tool, attempt, "Session rejected, re-authenticating");
                    relogin_used = true;
                    self.relogin(observed).await?;
                    // the resend does not consume an attempt
                    continue;
                }
                AttemptFailure::Unauthorized => {
                    self.session.invalidate_if(observed).await;
                    warn!(tool = %tool, attempt, "Session rejected");
                }
                AttemptFailure::Other(reason) => {
                    warn!(tool = %tool, attempt, reason = %reason, "Tool call attempt failed");
                }
            }

            if attempt >= MAX_ATTEMPTS {
                return Err(OrchestrationError::ToolCallFailed {
                    tool: tool.to_string(),
                });
            }

            attempt += 1;
            tokio::time::sleep(self.retry_delay).await;
        }
    }
}
