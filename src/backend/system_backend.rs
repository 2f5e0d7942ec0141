//! Host backend: reqwest for HTTP, command-line tools for network facts

use std::{collections::BTreeSet, time::Duration};

use reqwest::{Client, header};
use tracing::debug;

use crate::{
    backend::{NetworkBackend, platform},
    core::{
        error::{BackendError, BackendResult},
        types::{HttpReply, ProbeResponse},
    },
};

/// Connectivity check endpoint answering `204 No Content` when unfiltered
pub const DEFAULT_PROBE_URL: &str = "http://clients3.google.com/generate_204";

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AutoLogin";

/// Real backend for the host the agent runs on
///
/// Certificate validation is disabled: the probe may be intercepted and
/// the portal itself serves a self-signed certificate.
pub struct SystemBackend {
    client: Client,
    probe_url: String,
}

impl SystemBackend {
    pub fn new() -> BackendResult<Self> {
        Self::with_probe_url(DEFAULT_PROBE_URL)
    }

    pub fn with_probe_url(probe_url: impl Into<String>) -> BackendResult<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("*/*"));
        headers.insert(header::CONNECTION, header::HeaderValue::from_static("close"));

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .danger_accept_invalid_certs(true)
            .pool_max_idle_per_host(0)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| BackendError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            probe_url: probe_url.into(),
        })
    }

    pub fn probe_url(&self) -> &str {
        &self.probe_url
    }

    async fn read_reply(response: reqwest::Response) -> BackendResult<HttpReply> {
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;
        Ok(HttpReply { status, url, body })
    }
}

impl NetworkBackend for SystemBackend {
    async fn connected_network_names(&self) -> BTreeSet<String> {
        platform::current_network_names().await
    }

    async fn default_gateways(&self) -> Vec<String> {
        platform::current_gateways().await
    }

    async fn probe(&self) -> Option<ProbeResponse> {
        let response = match self
            .client
            .get(&self.probe_url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!("Connectivity probe failed: {}", e);
                return None;
            }
        };

        match Self::read_reply(response).await {
            Ok(reply) => Some(ProbeResponse {
                status: reply.status,
                requested_url: self.probe_url.clone(),
                final_url: reply.url,
                body: reply.body,
            }),
            Err(e) => {
                debug!("Connectivity probe body unreadable: {}", e);
                None
            }
        }
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        timeout: Duration,
    ) -> BackendResult<HttpReply> {
        let response = self
            .client
            .post(url)
            .form(form)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;

        Self::read_reply(response).await
    }
}
