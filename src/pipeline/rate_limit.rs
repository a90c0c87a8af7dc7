//! Outbound rate limiting over a trailing one-hour window.
//!
//! The window is re-derived from persisted messages on every check instead of
//! kept in memory, so horizontally scaled instances agree without shared
//! state.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;
use tracing::{debug, warn};

use crate::pipeline::types::Platform;
use crate::store::SendCounter;

/// Length of the rate-limit window.
pub const WINDOW_MINUTES: i64 = 60;

/// Upper bound of the random delay added by [`calculate_delay`].
pub const MAX_JITTER_MS: u64 = 30_000;

/// What to do when the window count cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitFailureMode {
    /// Allow the send. A counting outage must not silence every customer.
    #[default]
    FailOpen,
    /// Deny the send.
    FailClosed,
}

/// Which sends count towards the hourly cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitScope {
    /// One shared budget across all platforms.
    #[default]
    Global,
    /// A separate budget per platform.
    PerPlatform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateLimitPolicy {
    pub on_error: RateLimitFailureMode,
    pub scope: RateLimitScope,
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    pub count_in_window: u64,
    pub limit: u32,
}

/// Admission control for outbound sends.
pub struct RateLimiter {
    counter: Arc<dyn SendCounter>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(counter: Arc<dyn SendCounter>, policy: RateLimitPolicy) -> Self {
        Self { counter, policy }
    }

    /// Decide whether one more send fits under `max_per_hour`.
    pub async fn check(&self, platform: Platform, max_per_hour: u32) -> RateLimitDecision {
        let since = Utc::now() - Duration::minutes(WINDOW_MINUTES);
        let filter = match self.policy.scope {
            RateLimitScope::Global => None,
            RateLimitScope::PerPlatform => Some(platform),
        };

        let count = match self.counter.count_sent_outbound_since(since, filter).await {
            Ok(count) => count,
            Err(e) => {
                return match self.policy.on_error {
                    RateLimitFailureMode::FailOpen => {
                        warn!(
                            platform = %platform,
                            error = %e,
                            "Rate limit count failed, allowing send (fail-open)"
                        );
                        RateLimitDecision {
                            allowed: true,
                            reason: None,
                            count_in_window: 0,
                            limit: max_per_hour,
                        }
                    }
                    RateLimitFailureMode::FailClosed => {
                        warn!(
                            platform = %platform,
                            error = %e,
                            "Rate limit count failed, denying send (fail-closed)"
                        );
                        RateLimitDecision {
                            allowed: false,
                            reason: Some(format!("rate limit check unavailable: {e}")),
                            count_in_window: 0,
                            limit: max_per_hour,
                        }
                    }
                };
            }
        };

        let allowed = count < u64::from(max_per_hour);
        debug!(
            platform = %platform,
            count,
            limit = max_per_hour,
            allowed,
            "Rate limit checked"
        );

        RateLimitDecision {
            allowed,
            reason: (!allowed).then(|| {
                format!("hourly send limit reached ({count}/{max_per_hour} in the last {WINDOW_MINUTES} minutes)")
            }),
            count_in_window: count,
            limit: max_per_hour,
        }
    }
}

/// Delay in milliseconds before an outbound send: the minimum plus 0–30 s of
/// jitter. A hint for the sender, not enforced here.
pub fn calculate_delay(min_seconds: u64) -> u64 {
    let jitter = rand::thread_rng().gen_range(0..=MAX_JITTER_MS);
    min_seconds.saturating_mul(1000).saturating_add(jitter)
}
