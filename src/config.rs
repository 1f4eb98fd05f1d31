//! Runtime configuration loaded from the environment
//!
//! Binaries call `dotenv::dotenv()` first, so a local `.env` file is honoured.

use crate::error::OrchestrationError;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MCP_BASE_URL: &str = "http://127.0.0.1:8090";
const DEFAULT_GEMINI_MODEL_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

/// Settings for the upstream data provider
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub session_id: String,
    pub phone_number: String,
    pub otp: String,
    /// Hard ceiling for a single request attempt (login or tool call)
    pub attempt_timeout: Duration,
    /// Pause between the first and second tool-call attempt
    pub retry_delay: Duration,
    /// How long a successful login is trusted
    pub session_ttl: Duration,
    pub cache_ttl: Duration,
}

impl UpstreamConfig {
    pub fn login_url(&self) -> String {
        format!("{}/login?sessionId={}", self.base_url, self.session_id)
    }

    pub fn tool_url(&self) -> String {
        format!("{}/mcp/stream", self.base_url)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_MCP_BASE_URL.to_string(),
            session_id: String::new(),
            phone_number: String::new(),
            otp: String::new(),
            attempt_timeout: Duration::from_secs(3),
            retry_delay: Duration::from_millis(500),
            session_ttl: Duration::from_secs(300),
            cache_ttl: Duration::from_secs(60),
        }
    }
}

/// Settings for the text-generation backend
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub api_key: String,
    pub model_url: String,
    /// Maximum number of generation calls in flight across the process
    pub workers: usize,
    pub timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model_url: DEFAULT_GEMINI_MODEL_URL.to_string(),
            workers: 8,
            timeout: Duration::from_secs(45),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub upstream: UpstreamConfig,
    pub generation: GenerationConfig,
    /// Wall-clock budget for one execution round; `None` waits for every task
    pub round_budget: Option<Duration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            upstream: UpstreamConfig::default(),
            generation: GenerationConfig::default(),
            round_budget: Some(Duration::from_secs(30)),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup; missing keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = lookup("PORT").or_else(|| lookup("API_PORT")) {
            config.port = parse_value("PORT", &port)?;
        }

        if let Some(base_url) = lookup("MCP_BASE_URL") {
            config.upstream.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(session_id) = lookup("MCP_SESSION_ID") {
            config.upstream.session_id = session_id;
        }
        if let Some(phone_number) = lookup("MCP_PHONE_NUMBER") {
            config.upstream.phone_number = phone_number;
        }
        if let Some(otp) = lookup("MCP_OTP") {
            config.upstream.otp = otp;
        }

        if let Some(api_key) = lookup("GEMINI_API_KEY") {
            config.generation.api_key = api_key;
        }
        if let Some(model_url) = lookup("GEMINI_MODEL_URL") {
            config.generation.model_url = model_url;
        }
        if let Some(workers) = lookup("GENERATION_WORKERS") {
            let workers: usize = parse_value("GENERATION_WORKERS", &workers)?;
            if workers == 0 {
                return Err(OrchestrationError::ConfigError(
                    "GENERATION_WORKERS must be at least 1".to_string(),
                ));
            }
            config.generation.workers = workers;
        }
        if let Some(timeout) = lookup("GENERATION_TIMEOUT_SECS") {
            config.generation.timeout =
                Duration::from_secs(parse_value("GENERATION_TIMEOUT_SECS", &timeout)?);
        }

        if let Some(budget) = lookup("ROUND_BUDGET_SECS") {
            let secs: u64 = parse_value("ROUND_BUDGET_SECS", &budget)?;
            // 0 disables the budget
            config.round_budget = (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(config)
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| {
        OrchestrationError::ConfigError(format!("{} has an invalid value: {:?}", key, raw))
    })
}
