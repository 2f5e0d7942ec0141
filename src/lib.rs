//! Captive Portal Auto-Login
//!
//! Keeps a 24online captive portal session alive:
//! - Connectivity probing and target network detection
//! - Login submission with portal reply classification
//! - Backoff and cooldown scheduling, woken early by network changes

pub mod backend;
pub mod config;
pub mod core;
pub mod events;

pub use core::{
    agent::AutoLoginAgent,
    error::{AgentError, BackendError, ConfigError, CredentialError},
    manual::{ManualLoginResult, manual_login},
    types::{AgentState, ConnectivityState, LoginOutcome, ReasonCode},
};
