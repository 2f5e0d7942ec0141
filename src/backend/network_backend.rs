//! Network backend trait definition

use std::{collections::BTreeSet, time::Duration};

use trait_variant::make;

use crate::core::{
    error::BackendResult,
    types::{HttpReply, ProbeResponse},
};

/// Abstraction over the host's network facts and HTTP access
///
/// Implementations must never fail on missing OS tooling: absent
/// information is reported as an empty collection so the agent loop
/// keeps running.
#[make(Send)]
pub trait NetworkBackend: Send + Sync + 'static {
    /// Names of the currently associated Wi-Fi networks
    ///
    /// Some platforms report more than one interface, so this is a set.
    async fn connected_network_names(&self) -> BTreeSet<String>;

    /// Addresses of the default gateways
    async fn default_gateways(&self) -> Vec<String>;

    /// Issue the connectivity check request
    ///
    /// Returns `None` when the request could not be completed at all.
    async fn probe(&self) -> Option<ProbeResponse>;

    /// POST an URL-encoded form, following redirects
    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        timeout: Duration,
    ) -> BackendResult<HttpReply>;
}
