//! Mock network backend for testing

use std::{
    collections::{BTreeSet, VecDeque},
    sync::Arc,
    time::Duration,
};
use tokio::sync::Mutex;

use crate::backend::NetworkBackend;
use crate::core::error::{BackendError, BackendResult};
use crate::core::types::{HttpReply, ProbeResponse};

pub const MOCK_PROBE_URL: &str = "http://probe.test/generate_204";

/// Internal state for the mock backend
#[derive(Debug, Clone, Default)]
struct MockState {
    network_names: BTreeSet<String>,
    gateways: Vec<String>,
    probe: Option<ProbeResponse>,
    /// Probe answers consumed before falling back to `probe`
    probe_script: VecDeque<Option<ProbeResponse>>,
    login_replies: VecDeque<BackendResult<HttpReply>>,
    login_calls: usize,
    last_form: Vec<(String, String)>,
}

/// Mock network backend for testing
///
/// Defaults to an offline host: no networks, no gateway, failing probe.
#[derive(Debug, Clone, Default)]
pub struct MockNetworkBackend {
    inner: Arc<Mutex<MockState>>,
}

impl MockNetworkBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe answer for an unfiltered internet connection
    pub fn online_probe() -> ProbeResponse {
        ProbeResponse {
            status: 204,
            requested_url: MOCK_PROBE_URL.to_string(),
            final_url: MOCK_PROBE_URL.to_string(),
            body: String::new(),
        }
    }

    /// Probe answer for a portal redirecting to its login page
    pub fn portal_probe() -> ProbeResponse {
        ProbeResponse {
            status: 200,
            requested_url: MOCK_PROBE_URL.to_string(),
            final_url: "https://172.16.16.16/24online/webpages/client.jsp".to_string(),
            body: "<html>24online</html>".to_string(),
        }
    }

    pub async fn set_network_names(&self, names: &[&str]) {
        self.inner.lock().await.network_names = names.iter().map(|n| n.to_string()).collect();
    }

    pub async fn set_gateways(&self, gateways: &[&str]) {
        self.inner.lock().await.gateways = gateways.iter().map(|g| g.to_string()).collect();
    }

    /// Configure the probe answer returned once the script is exhausted
    pub async fn set_probe(&self, probe: Option<ProbeResponse>) {
        self.inner.lock().await.probe = probe;
    }

    /// Queue probe answers returned in order before the steady answer
    pub async fn script_probes(&self, probes: Vec<Option<ProbeResponse>>) {
        self.inner.lock().await.probe_script.extend(probes);
    }

    /// Queue a reply for the next login POST
    pub async fn push_login_reply(&self, status: u16, url: &str, body: &str) {
        self.inner.lock().await.login_replies.push_back(Ok(HttpReply {
            status,
            url: url.to_string(),
            body: body.to_string(),
        }));
    }

    /// Queue a transport failure for the next login POST
    pub async fn push_login_failure(&self, reason: &str) {
        self.inner
            .lock()
            .await
            .login_replies
            .push_back(Err(BackendError::Http(reason.to_string())));
    }

    pub async fn login_calls(&self) -> usize {
        self.inner.lock().await.login_calls
    }

    pub async fn last_form(&self) -> Vec<(String, String)> {
        self.inner.lock().await.last_form.clone()
    }
}

impl NetworkBackend for MockNetworkBackend {
    async fn connected_network_names(&self) -> BTreeSet<String> {
        self.inner.lock().await.network_names.clone()
    }

    async fn default_gateways(&self) -> Vec<String> {
        self.inner.lock().await.gateways.clone()
    }

    async fn probe(&self) -> Option<ProbeResponse> {
        let mut state = self.inner.lock().await;
        match state.probe_script.pop_front() {
            Some(probe) => probe,
            None => state.probe.clone(),
        }
    }

    async fn post_form(
        &self,
        _url: &str,
        form: &[(&str, &str)],
        _timeout: Duration,
    ) -> BackendResult<HttpReply> {
        let mut state = self.inner.lock().await;
        state.login_calls += 1;
        state.last_form = form
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        state
            .login_replies
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::Http("no scripted reply".into())))
    }
}
