//! Error types for the portal auto-login agent

use thiserror::Error;

/// Result type for network backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Result type for configuration store operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for credential store operations
pub type CredentialResult<T> = Result<T, CredentialError>;

/// Result type for agent lifecycle operations
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors related to network backend operations
#[derive(Error, Debug, Clone)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Command `{command}` failed: {reason}")]
    Command { command: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}

/// Errors related to the configuration store
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No configuration directory available for this user")]
    NoConfigDir,
}

/// Errors related to the credential store
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Username is empty")]
    EmptyUsername,
}

/// Errors related to the auto-login agent
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Agent is already running")]
    AlreadyRunning,

    #[error("Agent has been stopped and cannot be restarted")]
    Terminated,

    #[error("Agent task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Iteration failed: {0}")]
    Iteration(String),
}
