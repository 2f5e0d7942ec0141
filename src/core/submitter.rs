//! Login submission and post-login settlement

use std::time::Duration;

use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    backend::NetworkBackend,
    config::Settings,
    core::{
        classifier::{classify, excerpt},
        probe::ConnectivityProbe,
        types::{Credentials, LoginOutcome, ReasonCode},
    },
};

/// Form mode understood by the 24online login servlet
pub const LOGIN_MODE: &str = "191";

/// Smallest step between two settlement probes
const MIN_SETTLE_STEP: Duration = Duration::from_millis(100);

/// Login submitter
pub struct LoginSubmitter<B: NetworkBackend> {
    probe: ConnectivityProbe<B>,
}

impl<B: NetworkBackend> LoginSubmitter<B> {
    pub fn new(probe: ConnectivityProbe<B>) -> Self {
        Self { probe }
    }

    /// POST the credentials to the portal and classify the reply
    ///
    /// Transport failures are reported as a `network_error` outcome.
    pub async fn submit(&self, settings: &Settings, credentials: &Credentials) -> LoginOutcome {
        let form = [
            ("mode", LOGIN_MODE),
            ("username", credentials.username.as_str()),
            ("password", credentials.password.expose_secret()),
        ];

        let reply = match self
            .probe
            .backend()
            .post_form(&settings.login_url, &form, settings.post_timeout())
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                info!("Error sending login POST: {}", e);
                return LoginOutcome::network_error(e.to_string());
            }
        };

        info!("Login POST sent (status {})", reply.status);
        let (reason_code, reason_text) = classify(settings, reply.status, &reply.url, &reply.body);
        if reason_code == ReasonCode::Unknown {
            info!("Portal page (excerpt): {} | url={}", excerpt(&reply.body), reply.url);
        }

        LoginOutcome {
            ok: reason_code == ReasonCode::Ok,
            http_status: reply.status,
            reason_code,
            reason_text,
            response_url: reply.url,
        }
    }

    /// Poll until the probe reports a clean connection or `max` elapsed
    ///
    /// Returns `false` early when `cancel` fires.
    pub async fn wait_until_online(
        &self,
        max: Duration,
        step: Duration,
        cancel: &CancellationToken,
    ) -> bool {
        let step = step.max(MIN_SETTLE_STEP);
        let mut waited = Duration::ZERO;

        while waited < max {
            if self.probe.is_online().await {
                return true;
            }
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(step) => {}
            }
            waited += step;
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockNetworkBackend;
    use indexmap::IndexMap;
    use secrecy::SecretString;
    use std::sync::Arc;

    fn credentials() -> Credentials {
        Credentials {
            username: "student".into(),
            password: SecretString::from("hunter2"),
        }
    }

    fn submitter(backend: &Arc<MockNetworkBackend>) -> LoginSubmitter<MockNetworkBackend> {
        LoginSubmitter::new(ConnectivityProbe::new(backend.clone()))
    }

    #[tokio::test]
    async fn test_submit_success_without_patterns() {
        let backend = Arc::new(MockNetworkBackend::new());
        backend
            .push_login_reply(200, "https://172.16.16.16/done", "Login successful")
            .await;
        let settings = Settings {
            login_error_patterns: IndexMap::new(),
            ..Settings::default()
        };

        let outcome = submitter(&backend).submit(&settings, &credentials()).await;

        assert!(outcome.ok);
        assert_eq!(outcome.reason_code, ReasonCode::Ok);
        assert_eq!(outcome.http_status, 200);
        assert_eq!(outcome.response_url, "https://172.16.16.16/done");
    }

    #[tokio::test]
    async fn test_submit_sends_mode_and_credentials() {
        let backend = Arc::new(MockNetworkBackend::new());
        backend.push_login_reply(200, "https://portal", "success").await;

        submitter(&backend)
            .submit(&Settings::default(), &credentials())
            .await;

        assert_eq!(
            backend.last_form().await,
            vec![
                ("mode".to_string(), "191".to_string()),
                ("username".to_string(), "student".to_string()),
                ("password".to_string(), "hunter2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_submit_network_error() {
        let backend = Arc::new(MockNetworkBackend::new());
        backend.push_login_failure("operation timed out").await;

        let outcome = submitter(&backend)
            .submit(&Settings::default(), &credentials())
            .await;

        assert!(!outcome.ok);
        assert_eq!(outcome.http_status, 0);
        assert_eq!(outcome.reason_code, ReasonCode::NetworkError);
        assert!(outcome.reason_text.contains("operation timed out"));
        assert!(outcome.response_url.is_empty());
    }

    #[tokio::test]
    async fn test_submit_fatal_pattern() {
        let backend = Arc::new(MockNetworkBackend::new());
        backend
            .push_login_reply(200, "https://portal", "Your data quota has been exceeded")
            .await;

        let outcome = submitter(&backend)
            .submit(&Settings::default(), &credentials())
            .await;

        assert!(!outcome.ok);
        assert_eq!(outcome.reason_code, ReasonCode::Pattern("quota_exceeded".into()));
        assert_eq!(outcome.reason_text, "Quota Exceeded");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_online_settles() {
        let backend = Arc::new(MockNetworkBackend::new());
        backend.set_probe(Some(MockNetworkBackend::online_probe())).await;
        backend
            .script_probes(vec![None, Some(MockNetworkBackend::portal_probe())])
            .await;

        let settled = submitter(&backend)
            .wait_until_online(
                Duration::from_secs(10),
                Duration::from_millis(500),
                &CancellationToken::new(),
            )
            .await;

        assert!(settled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_online_times_out() {
        let backend = Arc::new(MockNetworkBackend::new());
        backend.set_probe(Some(MockNetworkBackend::portal_probe())).await;

        let started = tokio::time::Instant::now();
        let settled = submitter(&backend)
            .wait_until_online(
                Duration::from_secs(2),
                Duration::from_millis(500),
                &CancellationToken::new(),
            )
            .await;

        assert!(!settled);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_online_cancelled() {
        let backend = Arc::new(MockNetworkBackend::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let settled = submitter(&backend)
            .wait_until_online(Duration::from_secs(60), Duration::from_secs(1), &cancel)
            .await;

        assert!(!settled);
    }
}
