//! One-shot login requested by the user

use std::{fmt, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    backend::NetworkBackend,
    config::Settings,
    core::{
        probe::ConnectivityProbe,
        submitter::LoginSubmitter,
        types::{Credentials, LoginOutcome, ReasonCode},
    },
};

const ALREADY_LOGGED_IN: &str = "already_logged_in";

/// Result of a manual login
#[derive(Debug, Clone)]
pub enum ManualLoginResult {
    MissingCredentials,
    AlreadyOnline,
    NotOnTargetNetwork { ssid: String },
    /// Portal accepted the login; `settled` when the probe confirmed it
    Success { settled: bool },
    AlreadyLoggedIn,
    Failed(LoginOutcome),
}

impl ManualLoginResult {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ManualLoginResult::Success { .. }
                | ManualLoginResult::AlreadyOnline
                | ManualLoginResult::AlreadyLoggedIn
        )
    }
}

impl fmt::Display for ManualLoginResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManualLoginResult::MissingCredentials => {
                write!(f, "Please set username and password first")
            }
            ManualLoginResult::AlreadyOnline => write!(f, "Already online"),
            ManualLoginResult::NotOnTargetNetwork { ssid } => write!(f, "Not on {} yet", ssid),
            ManualLoginResult::Success { settled: true } => write!(f, "Login successful, online"),
            ManualLoginResult::Success { settled: false } => {
                write!(f, "Login successful, waiting for portal")
            }
            ManualLoginResult::AlreadyLoggedIn => {
                write!(f, "Portal reports you are already logged in")
            }
            ManualLoginResult::Failed(outcome) => write!(f, "Login failed: {}", outcome.reason_text),
        }
    }
}

/// Log in once, independent of any running agent
///
/// Nothing is posted unless the portal is reachable on the target network.
pub async fn manual_login<B: NetworkBackend>(
    backend: Arc<B>,
    settings: &Settings,
    credentials: Option<&Credentials>,
) -> ManualLoginResult {
    let Some(credentials) = credentials else {
        return ManualLoginResult::MissingCredentials;
    };

    let probe = ConnectivityProbe::new(backend);
    if probe.is_online().await {
        return ManualLoginResult::AlreadyOnline;
    }
    if !probe
        .is_target_network_reachable(&settings.ssid, &settings.gateway_prefix)
        .await
    {
        return ManualLoginResult::NotOnTargetNetwork {
            ssid: settings.ssid.clone(),
        };
    }

    info!("Manual login as {}", credentials.username);
    let submitter = LoginSubmitter::new(probe);
    let outcome = submitter.submit(settings, credentials).await;

    tokio::time::sleep(settings.post_probe_delay()).await;
    let settled = submitter
        .wait_until_online(
            settings.settle_max(),
            settings.settle_step(),
            &CancellationToken::new(),
        )
        .await;

    if settled || outcome.ok {
        return ManualLoginResult::Success { settled };
    }

    match &outcome.reason_code {
        ReasonCode::Pattern(name) if name == ALREADY_LOGGED_IN => ManualLoginResult::AlreadyLoggedIn,
        _ => ManualLoginResult::Failed(outcome),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockNetworkBackend;
    use secrecy::SecretString;

    const PORTAL_URL: &str = "https://172.16.16.16/24online/servlet/E24onlineHTTPClient";

    fn credentials() -> Credentials {
        Credentials {
            username: "student".into(),
            password: SecretString::from("hunter2"),
        }
    }

    fn settings() -> Settings {
        Settings {
            settle_max_s: 1.0,
            ..Settings::default()
        }
    }

    async fn portal_backend() -> Arc<MockNetworkBackend> {
        let backend = Arc::new(MockNetworkBackend::new());
        backend.set_network_names(&["MDI"]).await;
        backend.set_probe(Some(MockNetworkBackend::portal_probe())).await;
        backend
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let backend = portal_backend().await;
        let result = manual_login(backend.clone(), &settings(), None).await;

        assert!(matches!(result, ManualLoginResult::MissingCredentials));
        assert_eq!(backend.login_calls().await, 0);
    }

    #[tokio::test]
    async fn test_already_online() {
        let backend = portal_backend().await;
        backend.set_probe(Some(MockNetworkBackend::online_probe())).await;

        let result = manual_login(backend.clone(), &settings(), Some(&credentials())).await;

        assert!(matches!(result, ManualLoginResult::AlreadyOnline));
        assert!(result.is_success());
        assert_eq!(backend.login_calls().await, 0);
    }

    #[tokio::test]
    async fn test_not_on_target_network_never_posts() {
        let backend = Arc::new(MockNetworkBackend::new());
        backend.set_network_names(&["Home"]).await;
        backend.set_gateways(&["192.168.1.1"]).await;
        backend.set_probe(Some(MockNetworkBackend::portal_probe())).await;

        let result = manual_login(backend.clone(), &settings(), Some(&credentials())).await;

        assert!(matches!(result, ManualLoginResult::NotOnTargetNetwork { .. }));
        assert_eq!(result.to_string(), "Not on MDI yet");
        assert_eq!(backend.login_calls().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_settled() {
        let backend = portal_backend().await;
        backend.set_probe(Some(MockNetworkBackend::online_probe())).await;
        backend
            .script_probes(vec![Some(MockNetworkBackend::portal_probe())])
            .await;
        backend.push_login_reply(200, PORTAL_URL, "Login successful").await;

        let result = manual_login(backend.clone(), &settings(), Some(&credentials())).await;

        assert!(matches!(result, ManualLoginResult::Success { settled: true }));
        assert_eq!(backend.login_calls().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_not_yet_settled() {
        let backend = portal_backend().await;
        backend.push_login_reply(200, PORTAL_URL, "Login successful").await;

        let result = manual_login(backend, &settings(), Some(&credentials())).await;

        assert!(matches!(result, ManualLoginResult::Success { settled: false }));
        assert_eq!(result.to_string(), "Login successful, waiting for portal");
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_logged_in() {
        let backend = portal_backend().await;
        backend
            .push_login_reply(200, PORTAL_URL, "You are already logged in from this device")
            .await;

        let result = manual_login(backend, &settings(), Some(&credentials())).await;

        assert!(matches!(result, ManualLoginResult::AlreadyLoggedIn));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_with_reason() {
        let backend = portal_backend().await;
        backend
            .push_login_reply(200, PORTAL_URL, "Invalid username or password")
            .await;

        let result = manual_login(backend, &settings(), Some(&credentials())).await;

        match &result {
            ManualLoginResult::Failed(outcome) => {
                assert_eq!(
                    outcome.reason_code,
                    ReasonCode::Pattern("bad_credentials".into())
                );
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!result.is_success());
        assert_eq!(result.to_string(), "Login failed: Bad Credentials");
    }
}
