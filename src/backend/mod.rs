//! Network and credential backend abstraction layer

pub mod credentials;
pub mod mock_backend;
pub mod network_backend;
pub mod platform;
pub mod system_backend;

pub use credentials::{
    CredentialStore, KeyringStore, MemoryCredentialStore, lookup_credentials, resolve_credentials,
};
pub use mock_backend::MockNetworkBackend;
pub use network_backend::NetworkBackend;
pub use system_backend::SystemBackend;
