//! Runtime settings

use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SSID: &str = "MDI";
pub const DEFAULT_LOGIN_URL: &str = "https://172.16.16.16/24online/servlet/E24onlineHTTPClient";
pub const DEFAULT_GATEWAY_PREFIX: &str = "172.16.";

/// Retry tuning for failed login attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_consecutive_failures: u32,
    pub initial_backoff_s: f64,
    pub max_backoff_s: f64,
    pub cooldown_on_fatal_s: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
            initial_backoff_s: 2.0,
            max_backoff_s: 10.0,
            cooldown_on_fatal_s: 10.0,
        }
    }
}

impl RetrySettings {
    pub fn initial_backoff(&self) -> Duration {
        secs(self.initial_backoff_s)
    }

    pub fn max_backoff(&self) -> Duration {
        secs(self.max_backoff_s)
    }

    pub fn cooldown_on_fatal(&self) -> Duration {
        secs(self.cooldown_on_fatal_s)
    }
}

/// Runtime configuration settings
///
/// Persisted as a JSON document. Every field has a default so that a
/// partial document is still valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Target network name, matched as a case-insensitive substring
    pub ssid: String,
    pub username: String,
    pub login_url: String,
    pub base_interval_s: f64,
    pub post_timeout_s: f64,
    /// Minimum time between two login attempts
    pub post_grace_s: f64,
    pub post_probe_delay_s: f64,
    pub settle_max_s: f64,
    pub settle_step_s: f64,
    /// Poll interval while a cooldown is active
    pub cooldown_poll_s: f64,
    /// Address prefix of the portal network's default gateway
    pub gateway_prefix: String,
    pub retry: RetrySettings,
    /// Error pattern name to regex, matched in insertion order
    pub login_error_patterns: IndexMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ssid: DEFAULT_SSID.to_string(),
            username: String::new(),
            login_url: DEFAULT_LOGIN_URL.to_string(),
            base_interval_s: 5.0,
            post_timeout_s: 8.0,
            post_grace_s: 6.0,
            post_probe_delay_s: 1.5,
            settle_max_s: 10.0,
            settle_step_s: 0.5,
            cooldown_poll_s: 3.0,
            gateway_prefix: DEFAULT_GATEWAY_PREFIX.to_string(),
            retry: RetrySettings::default(),
            login_error_patterns: default_error_patterns(),
        }
    }
}

impl Settings {
    pub fn base_interval(&self) -> Duration {
        secs(self.base_interval_s)
    }

    pub fn post_timeout(&self) -> Duration {
        secs(self.post_timeout_s)
    }

    pub fn post_grace(&self) -> Duration {
        secs(self.post_grace_s)
    }

    pub fn post_probe_delay(&self) -> Duration {
        secs(self.post_probe_delay_s)
    }

    pub fn settle_max(&self) -> Duration {
        secs(self.settle_max_s)
    }

    pub fn settle_step(&self) -> Duration {
        secs(self.settle_step_s)
    }

    pub fn cooldown_poll(&self) -> Duration {
        secs(self.cooldown_poll_s)
    }
}

/// Portal error texts known from the 24online login servlet
pub fn default_error_patterns() -> IndexMap<String, String> {
    [
        (
            "quota_exceeded",
            r"\b(quota|data\s*quota|usage\s*quota)\b(?P<gap>.{0,80}?)\b(exceed(ed)?|exhaust(ed)?|over(\s*limit)?)\b",
        ),
        (
            "too_many_devices",
            r"\b(max(imum)?|too\s*many|simultaneous)\b.{0,40}\b(login|device|session)s?\b",
        ),
        (
            "bad_credentials",
            r"(invalid|incorrect).*?(user|id|credential|password)|authentication\s*failed",
        ),
        ("account_expired", r"(expired|inactive|blocked)"),
        ("already_logged_in", r"(already\s*logged\s*in|session\s*exists)"),
        ("idle_timeout", r"(idle\s*time(out)?|session\s*timed\s*out)"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name.to_string(), pattern.to_string()))
    .collect()
}

/// Upper bound for any interval read from the config document
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Convert a seconds value from the config document
///
/// Negative or NaN values become zero, anything above a day is capped.
fn secs(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value)
        .unwrap_or(MAX_INTERVAL)
        .min(MAX_INTERVAL)
}
