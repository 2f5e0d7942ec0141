//! Credential storage in the OS keyring

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error};

use crate::core::{
    error::{CredentialError, CredentialResult},
    types::Credentials,
};

pub const KEYRING_SERVICE: &str = "portal-autologin";

/// Secret store holding one password per username
pub trait CredentialStore: Send + Sync + 'static {
    /// Look up the password; `Ok(None)` when nothing is stored
    fn get_password(&self, username: &str) -> CredentialResult<Option<SecretString>>;

    fn set_password(&self, username: &str, password: &SecretString) -> CredentialResult<()>;
}

/// Resolve the credentials for `username`
///
/// Store failures are logged and reported as missing credentials.
pub fn resolve_credentials<S: CredentialStore + ?Sized>(
    store: &S,
    username: &str,
) -> Option<Credentials> {
    if username.is_empty() {
        return None;
    }

    match store.get_password(username) {
        Ok(Some(password)) if !password.expose_secret().is_empty() => Some(Credentials {
            username: username.to_string(),
            password,
        }),
        Ok(_) => None,
        Err(e) => {
            error!("Failed to read password from credential store: {}", e);
            None
        }
    }
}

/// Resolve credentials on the blocking pool, keyring access may block
pub async fn lookup_credentials<S: CredentialStore>(
    store: &Arc<S>,
    username: &str,
) -> Option<Credentials> {
    let store = store.clone();
    let username = username.to_string();

    tokio::task::spawn_blocking(move || resolve_credentials(store.as_ref(), &username))
        .await
        .unwrap_or_else(|e| {
            error!("Credential lookup task failed: {}", e);
            None
        })
}

/// OS keyring (Windows Credential Manager, macOS Keychain, Secret Service)
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self::with_service(KEYRING_SERVICE)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringStore {
    fn get_password(&self, username: &str) -> CredentialResult<Option<SecretString>> {
        if username.is_empty() {
            return Err(CredentialError::EmptyUsername);
        }

        let entry = keyring::Entry::new(&self.service, username)?;
        match entry.get_password() {
            Ok(password) => Ok(Some(SecretString::from(password))),
            Err(keyring::Error::NoEntry) => {
                debug!("No keyring entry for {}", username);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn set_password(&self, username: &str, password: &SecretString) -> CredentialResult<()> {
        if username.is_empty() {
            return Err(CredentialError::EmptyUsername);
        }

        let entry = keyring::Entry::new(&self.service, username)?;
        entry.set_password(password.expose_secret())?;
        Ok(())
    }
}

/// In-process store, used when no keyring is wanted and in tests
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    passwords: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get_password(&self, username: &str) -> CredentialResult<Option<SecretString>> {
        let passwords = self.passwords.lock().unwrap_or_else(|e| e.into_inner());
        Ok(passwords.get(username).cloned().map(SecretString::from))
    }

    fn set_password(&self, username: &str, password: &SecretString) -> CredentialResult<()> {
        if username.is_empty() {
            return Err(CredentialError::EmptyUsername);
        }
        self.passwords
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(username.to_string(), password.expose_secret().to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenStore;

    impl CredentialStore for BrokenStore {
        fn get_password(&self, _username: &str) -> CredentialResult<Option<SecretString>> {
            Err(CredentialError::Keyring(keyring::Error::NoStorageAccess(
                "locked".into(),
            )))
        }

        fn set_password(&self, _username: &str, _password: &SecretString) -> CredentialResult<()> {
            Err(CredentialError::EmptyUsername)
        }
    }

    #[test]
    fn test_resolve_credentials_present() {
        let store = MemoryCredentialStore::new();
        store
            .set_password("student", &SecretString::from("hunter2"))
            .unwrap();

        let creds = resolve_credentials(&store, "student").unwrap();
        assert_eq!(creds.username, "student");
        assert_eq!(creds.password.expose_secret(), "hunter2");
    }

    #[test]
    fn test_resolve_credentials_missing() {
        let store = MemoryCredentialStore::new();
        assert!(resolve_credentials(&store, "student").is_none());
        assert!(resolve_credentials(&store, "").is_none());

        store.set_password("student", &SecretString::from("")).unwrap();
        assert!(resolve_credentials(&store, "student").is_none());
    }

    #[test]
    fn test_resolve_credentials_store_failure_is_absent() {
        assert!(resolve_credentials(&BrokenStore, "student").is_none());
    }

    #[tokio::test]
    async fn test_lookup_credentials_on_blocking_pool() {
        let store = Arc::new(MemoryCredentialStore::new());
        assert!(lookup_credentials(&store, "student").await.is_none());

        store
            .set_password("student", &SecretString::from("hunter2"))
            .unwrap();
        let creds = lookup_credentials(&store, "student").await.unwrap();
        assert_eq!(creds.password.expose_secret(), "hunter2");
    }

    #[test]
    fn test_memory_store_rejects_empty_username() {
        let store = MemoryCredentialStore::new();
        assert!(matches!(
            store.set_password("", &SecretString::from("pw")),
            Err(CredentialError::EmptyUsername)
        ));
    }
}
