//! Connectivity classification on top of the network backend

use std::{collections::BTreeSet, sync::Arc};

use crate::{
    backend::NetworkBackend,
    core::types::{ConnectivityState, ProbeResponse},
};

/// Body marker of the 24online portal software
pub const PORTAL_VENDOR_MARKER: &str = "24online";

/// Network probe
///
/// Every check treats missing information as "not online": a failed probe
/// counts as portal interference rather than an error.
pub struct ConnectivityProbe<B: NetworkBackend> {
    backend: Arc<B>,
}

impl<B: NetworkBackend> Clone for ConnectivityProbe<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
        }
    }
}

impl<B: NetworkBackend> ConnectivityProbe<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub async fn list_connected_network_names(&self) -> BTreeSet<String> {
        self.backend.connected_network_names().await
    }

    /// True if any default gateway starts with `prefix`
    pub async fn is_gateway_in_target_range(&self, prefix: &str) -> bool {
        !prefix.is_empty()
            && self
                .backend
                .default_gateways()
                .await
                .iter()
                .any(|gw| gw.starts_with(prefix))
    }

    pub async fn probe_connectivity(&self) -> Option<ProbeResponse> {
        self.backend.probe().await
    }

    /// Clean `204 No Content` without any redirect
    pub async fn is_online(&self) -> bool {
        self.probe_connectivity()
            .await
            .is_some_and(|probe| probe_is_online(&probe))
    }

    pub async fn is_portal_intercepting(&self, gateway_prefix: &str) -> bool {
        match self.probe_connectivity().await {
            Some(probe) => probe_is_intercepted(&probe, gateway_prefix),
            None => true,
        }
    }

    /// Online and intercepted flags from a single probe
    pub async fn observe(&self, gateway_prefix: &str) -> (bool, bool) {
        match self.probe_connectivity().await {
            Some(probe) => (
                probe_is_online(&probe),
                probe_is_intercepted(&probe, gateway_prefix),
            ),
            None => (false, true),
        }
    }

    /// The target network is visible by name or by its gateway
    pub async fn is_target_network_reachable(&self, ssid: &str, gateway_prefix: &str) -> bool {
        ssid_matches(&self.list_connected_network_names().await, ssid)
            || self.is_gateway_in_target_range(gateway_prefix).await
    }
}

pub fn probe_is_online(probe: &ProbeResponse) -> bool {
    probe.status == 204 && !probe.redirected()
}

/// Anything but a clean 204 counts as interception
pub fn probe_is_intercepted(probe: &ProbeResponse, gateway_prefix: &str) -> bool {
    let marker_in_url = !gateway_prefix.is_empty() && probe.final_url.contains(gateway_prefix);
    let marker_in_body = probe.body.to_lowercase().contains(PORTAL_VENDOR_MARKER);

    probe.status != 204 || probe.redirected() || marker_in_url || marker_in_body
}

/// Case-insensitive substring match of `ssid` against connected network names
pub fn ssid_matches(names: &BTreeSet<String>, ssid: &str) -> bool {
    if ssid.is_empty() {
        return false;
    }
    let target = ssid.to_lowercase();
    names.iter().any(|name| name.to_lowercase().contains(&target))
}

/// Derived state for logging; captive only counts on the target network
pub fn derive_state(online: bool, captive: bool, on_target: bool) -> ConnectivityState {
    ConnectivityState::derive(online, captive && on_target)
}
