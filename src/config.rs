//! Configuration types.
//!
//! Two layers live here:
//! - [`ServiceConfig`]: process settings read once from the environment.
//! - [`AgentConfigRecord`] / [`EffectiveConfig`]: per-platform agent
//!   behaviour stored in the database and merged with the `global` row on
//!   every request.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::pipeline::rate_limit::{RateLimitFailureMode, RateLimitPolicy, RateLimitScope};
use crate::pipeline::types::{ConversationKind, Platform};

// ── Service configuration ───────────────────────────────────────────

/// Process-level settings.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub db_path: String,
    pub port: u16,
    pub llm_api_key: secrecy::SecretString,
    pub llm_base_url: String,
    /// Fallback model when neither config row names one.
    pub default_model: String,
    /// Bound on the reply completion call.
    pub request_timeout: Duration,
    /// Bound on the confidence self-assessment call.
    pub confidence_timeout: Duration,
    pub rate_limit: RateLimitPolicy,
}

impl ServiceConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let llm_api_key = get("SOCIAL_AGENT_LLM_API_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("SOCIAL_AGENT_LLM_API_KEY".into()))?;

        let on_error = match get("SOCIAL_AGENT_RATE_LIMIT_ON_ERROR").as_deref() {
            None | Some("open") => RateLimitFailureMode::FailOpen,
            Some("closed") => RateLimitFailureMode::FailClosed,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "SOCIAL_AGENT_RATE_LIMIT_ON_ERROR".into(),
                    message: format!("expected 'open' or 'closed', got '{other}'"),
                });
            }
        };

        let scope = match get("SOCIAL_AGENT_RATE_LIMIT_SCOPE").as_deref() {
            None | Some("global") => RateLimitScope::Global,
            Some("platform") => RateLimitScope::PerPlatform,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "SOCIAL_AGENT_RATE_LIMIT_SCOPE".into(),
                    message: format!("expected 'global' or 'platform', got '{other}'"),
                });
            }
        };

        Ok(Self {
            db_path: get("SOCIAL_AGENT_DB_PATH")
                .unwrap_or_else(|| "./data/social-agent.db".to_string()),
            port: parse_or(&get, "SOCIAL_AGENT_PORT", 8080)?,
            llm_api_key: secrecy::SecretString::from(llm_api_key),
            llm_base_url: get("SOCIAL_AGENT_LLM_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            default_model: get("SOCIAL_AGENT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            request_timeout: Duration::from_secs(parse_or(
                &get,
                "SOCIAL_AGENT_LLM_TIMEOUT_SECS",
                30,
            )?),
            confidence_timeout: Duration::from_secs(parse_or(
                &get,
                "SOCIAL_AGENT_CONFIDENCE_TIMEOUT_SECS",
                10,
            )?),
            rate_limit: RateLimitPolicy { on_error, scope },
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

// ── Agent configuration ─────────────────────────────────────────────

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 500;
pub const DEFAULT_MAX_MESSAGES_PER_HOUR: u32 = 30;

/// Key of a configuration row: the literal `global` or a platform name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigScope {
    Global,
    Platform(Platform),
}

impl ConfigScope {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Platform(p) => p.as_str(),
        }
    }
}

/// A stored configuration row. `None` means "inherit".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfigRecord {
    pub system_prompt: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub auto_respond_dm: Option<bool>,
    pub auto_respond_comments: Option<bool>,
    pub max_messages_per_hour: Option<u32>,
    pub escalation_keywords: Option<Vec<String>>,
    pub blocked_users: Option<Vec<String>>,
}

/// Both rows relevant to one platform, as loaded in a single query.
#[derive(Debug, Clone, Default)]
pub struct ConfigRows {
    pub global: Option<AgentConfigRecord>,
    pub platform: Option<AgentConfigRecord>,
}

/// Per-request configuration after merging the platform row over `global`.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    pub platform: Platform,
    pub global_prompt: Option<String>,
    pub platform_prompt: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub auto_respond_dm: bool,
    pub auto_respond_comments: bool,
    pub max_messages_per_hour: u32,
    /// `None` means the built-in keyword list applies.
    pub escalation_keywords: Option<Vec<String>>,
    pub blocked_users: Vec<String>,
}

impl EffectiveConfig {
    /// Merge a platform row over the global row, falling back to built-in
    /// defaults for fields neither row sets.
    pub fn resolve(
        platform: Platform,
        platform_row: Option<&AgentConfigRecord>,
        global_row: Option<&AgentConfigRecord>,
        default_model: &str,
    ) -> Self {
        fn pick<T: Clone>(
            platform_row: Option<&AgentConfigRecord>,
            global_row: Option<&AgentConfigRecord>,
            field: impl Fn(&AgentConfigRecord) -> &Option<T>,
        ) -> Option<T> {
            platform_row
                .and_then(|r| field(r).clone())
                .or_else(|| global_row.and_then(|r| field(r).clone()))
        }

        Self {
            platform,
            global_prompt: global_row.and_then(|r| r.system_prompt.clone()),
            platform_prompt: platform_row.and_then(|r| r.system_prompt.clone()),
            model: pick(platform_row, global_row, |r| &r.model)
                .unwrap_or_else(|| default_model.to_string()),
            temperature: pick(platform_row, global_row, |r| &r.temperature)
                .unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: pick(platform_row, global_row, |r| &r.max_tokens)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            auto_respond_dm: pick(platform_row, global_row, |r| &r.auto_respond_dm)
                .unwrap_or(true),
            auto_respond_comments: pick(platform_row, global_row, |r| &r.auto_respond_comments)
                .unwrap_or(true),
            max_messages_per_hour: pick(platform_row, global_row, |r| &r.max_messages_per_hour)
                .unwrap_or(DEFAULT_MAX_MESSAGES_PER_HOUR),
            escalation_keywords: pick(platform_row, global_row, |r| &r.escalation_keywords),
            blocked_users: pick(platform_row, global_row, |r| &r.blocked_users)
                .unwrap_or_default(),
        }
    }

    pub fn is_blocked(&self, platform_user_id: &str) -> bool {
        self.blocked_users.iter().any(|u| u == platform_user_id)
    }

    /// Auto-respond toggle for the given conversation kind.
    pub fn auto_respond_for(&self, kind: ConversationKind) -> bool {
        match kind {
            ConversationKind::Direct => self.auto_respond_dm,
            ConversationKind::Comment => self.auto_respond_comments,
        }
    }
}
