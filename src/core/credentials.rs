//! Credential persistence.
//!
//! API keys live in the platform keyring (or any other [`SecretStore`]
//! backend) under one entry per provider. The stored value is the JSON
//! object `{"key": "..."}`; the entry name is `<provider-id>-api-key`.
//! Secrets pass through here on their way to request builders and are
//! never logged or persisted anywhere else.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::core::error::GatewayError;

const STORAGE_SERVICE: &str = "palaver";
const STORAGE_KEY_SUFFIX: &str = "-api-key";

fn storage_key(provider_id: &str) -> String {
    format!("{provider_id}{STORAGE_KEY_SUFFIX}")
}

/// Opaque key-value collaborator the credential store delegates to.
pub trait SecretStore: Send + Sync {
    fn get(&self, name: &str) -> Result<Option<String>, GatewayError>;
    fn set(&self, name: &str, value: &str) -> Result<(), GatewayError>;
    fn delete(&self, name: &str) -> Result<(), GatewayError>;
}

/// Production backend on the platform keyring.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        KeyringStore {
            service: STORAGE_SERVICE.to_string(),
        }
    }

    fn entry(&self, name: &str) -> Result<keyring::Entry, GatewayError> {
        keyring::Entry::new(&self.service, name)
            .map_err(|err| GatewayError::storage(err.to_string()))
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for KeyringStore {
    fn get(&self, name: &str) -> Result<Option<String>, GatewayError> {
        match self.entry(name)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(GatewayError::storage(err.to_string())),
        }
    }

    fn set(&self, name: &str, value: &str) -> Result<(), GatewayError> {
        self.entry(name)?
            .set_password(value)
            .map_err(|err| GatewayError::storage(err.to_string()))
    }

    fn delete(&self, name: &str) -> Result<(), GatewayError> {
        match self.entry(name)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(GatewayError::storage(err.to_string())),
        }
    }
}

/// In-memory backend for tests and keyring-less environments.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl SecretStore for MemoryStore {
    fn get(&self, name: &str) -> Result<Option<String>, GatewayError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| GatewayError::storage("secret store lock poisoned"))?;
        Ok(entries.get(name).cloned())
    }

    fn set(&self, name: &str, value: &str) -> Result<(), GatewayError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| GatewayError::storage("secret store lock poisoned"))?;
        entries.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), GatewayError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| GatewayError::storage("secret store lock poisoned"))?;
        entries.remove(name);
        Ok(())
    }
}

/// Stable persisted shape of one credential entry.
#[derive(Serialize, Deserialize)]
struct StoredCredential {
    key: String,
}

/// Provider-keyed credential access over a [`SecretStore`] backend.
pub struct CredentialStore {
    backend: Box<dyn SecretStore>,
}

impl CredentialStore {
    pub fn new(backend: Box<dyn SecretStore>) -> Self {
        CredentialStore { backend }
    }

    /// The stored secret for a provider. A missing entry is an ordinary
    /// absent value, not an error.
    pub fn get(&self, provider_id: &str) -> Result<Option<String>, GatewayError> {
        let Some(raw) = self.backend.get(&storage_key(provider_id))? else {
            return Ok(None);
        };
        let stored: StoredCredential = serde_json::from_str(&raw).map_err(|_| {
            GatewayError::storage(format!(
                "stored credential for '{provider_id}' is not in the expected shape"
            ))
        })?;
        Ok(Some(stored.key))
    }

    /// Idempotent overwrite. Backend failures propagate so the caller
    /// can notify the user.
    pub fn set(&self, provider_id: &str, secret: &str) -> Result<(), GatewayError> {
        let stored = StoredCredential {
            key: secret.to_string(),
        };
        let raw = serde_json::to_string(&stored)
            .map_err(|err| GatewayError::storage(err.to_string()))?;
        self.backend.set(&storage_key(provider_id), &raw)
    }

    pub fn clear(&self, provider_id: &str) -> Result<(), GatewayError> {
        self.backend.delete(&storage_key(provider_id))
    }
}
