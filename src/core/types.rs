//! Domain types for captive portal detection and login

use std::fmt;

use secrecy::SecretString;
use serde::{Serialize, Serializer};

/// Reason codes that mean retrying cannot help until something changes
/// on the portal side.
pub const FATAL_REASONS: [&str; 4] = [
    "quota_exceeded",
    "too_many_devices",
    "account_expired",
    "bad_credentials",
];

/// Derived network state, recomputed on every poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    Online,
    CaptivePortal,
    Offline,
}

impl ConnectivityState {
    pub fn derive(online: bool, captive: bool) -> Self {
        if online {
            ConnectivityState::Online
        } else if captive {
            ConnectivityState::CaptivePortal
        } else {
            ConnectivityState::Offline
        }
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectivityState::Online => write!(f, "online"),
            ConnectivityState::CaptivePortal => write!(f, "captive"),
            ConnectivityState::Offline => write!(f, "offline"),
        }
    }
}

/// Agent lifecycle
///
/// `Stopped` is terminal; a stopped agent is never restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AgentState {
    NotRunning = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentState::NotRunning => write!(f, "not running"),
            AgentState::Running => write!(f, "running"),
            AgentState::Stopping => write!(f, "stopping"),
            AgentState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Classification of a login attempt
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReasonCode {
    Ok,
    Unknown,
    NetworkError,
    /// Name of the configured error pattern that matched
    Pattern(String),
}

impl ReasonCode {
    pub fn as_str(&self) -> &str {
        match self {
            ReasonCode::Ok => "ok",
            ReasonCode::Unknown => "unknown",
            ReasonCode::NetworkError => "network_error",
            ReasonCode::Pattern(name) => name,
        }
    }

    /// Fatal outcomes put the scheduler into cooldown instead of backoff
    pub fn is_fatal(&self) -> bool {
        match self {
            ReasonCode::Pattern(name) => FATAL_REASONS.contains(&name.as_str()),
            _ => false,
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ReasonCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Result of a single login attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginOutcome {
    pub ok: bool,
    /// HTTP status, 0 when the request never completed
    pub http_status: u16,
    pub reason_code: ReasonCode,
    pub reason_text: String,
    pub response_url: String,
}

impl LoginOutcome {
    pub fn network_error(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            http_status: 0,
            reason_code: ReasonCode::NetworkError,
            reason_text: reason.into(),
            response_url: String::new(),
        }
    }
}

/// Response of the connectivity check request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    pub requested_url: String,
    /// URL after following redirects
    pub final_url: String,
    pub body: String,
}

impl ProbeResponse {
    pub fn redirected(&self) -> bool {
        self.final_url != self.requested_url
    }
}

/// Raw reply of a form POST
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub url: String,
    pub body: String,
}

/// Portal login credentials
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_reason_codes() {
        assert!(ReasonCode::Pattern("quota_exceeded".into()).is_fatal());
        assert!(ReasonCode::Pattern("bad_credentials".into()).is_fatal());
        assert!(!ReasonCode::Pattern("idle_timeout".into()).is_fatal());
        assert!(!ReasonCode::Pattern("already_logged_in".into()).is_fatal());
        assert!(!ReasonCode::NetworkError.is_fatal());
        assert!(!ReasonCode::Unknown.is_fatal());
        assert!(!ReasonCode::Ok.is_fatal());
    }

    #[test]
    fn test_reason_code_display() {
        assert_eq!(ReasonCode::Ok.to_string(), "ok");
        assert_eq!(ReasonCode::NetworkError.to_string(), "network_error");
        assert_eq!(
            ReasonCode::Pattern("too_many_devices".into()).to_string(),
            "too_many_devices"
        );
    }

    #[test]
    fn test_outcome_serializes_reason_as_string() {
        let outcome = LoginOutcome::network_error("timed out");
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["reason_code"], "network_error");
        assert_eq!(json["http_status"], 0);
        assert_eq!(json["ok"], false);
    }

    #[test]
    fn test_connectivity_state_derive() {
        assert_eq!(ConnectivityState::derive(true, true), ConnectivityState::Online);
        assert_eq!(
            ConnectivityState::derive(false, true),
            ConnectivityState::CaptivePortal
        );
        assert_eq!(ConnectivityState::derive(false, false), ConnectivityState::Offline);
    }

    #[test]
    fn test_probe_redirect_detection() {
        let mut probe = ProbeResponse {
            status: 204,
            requested_url: "http://example.test/generate_204".into(),
            final_url: "http://example.test/generate_204".into(),
            body: String::new(),
        };
        assert!(!probe.redirected());

        probe.final_url = "https://172.16.16.16/login".into();
        assert!(probe.redirected());
    }
}
