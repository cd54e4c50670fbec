// ABOUTME: Secret store abstraction over the OS keyring
// ABOUTME: Four session accounts plus a static api-token account under one service

use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Mutex;

/// Service namespace all accounts live under.
pub const SERVICE: &str = "jobtrail";

/// Identity-provider session cookie (`__session` value).
pub const ACCOUNT_SESSION_COOKIE: &str = "session-cookie";
/// Provider-assigned session id (`sess_...`).
pub const ACCOUNT_SESSION_ID: &str = "session-id";
/// Auxiliary `__client_uat` cookie value.
pub const ACCOUNT_CLIENT_UAT: &str = "client-uat";
/// JSON object of extra provider-domain cookies replayed on refresh.
pub const ACCOUNT_EXTRA_COOKIES: &str = "extra-cookies";
/// Static bearer token, used by the resolution chain when no session exists.
pub const ACCOUNT_API_TOKEN: &str = "api-token";

pub trait SecretStore {
    fn get(&self, account: &str) -> Result<Option<String>>;
    fn set(&self, account: &str, value: &str) -> Result<()>;
    /// Returns true if an entry existed and was removed.
    fn delete(&self, account: &str) -> Result<bool>;
}

/// OS keyring-backed store (macOS Keychain, Secret Service, Windows Credential Manager).
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        KeyringStore {
            service: SERVICE.into(),
        }
    }

    fn entry(&self, account: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, account).map_err(|e| Error::Store(e.to_string()))
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for KeyringStore {
    fn get(&self, account: &str) -> Result<Option<String>> {
        match self.entry(account)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Error::Store(e.to_string())),
        }
    }

    fn set(&self, account: &str, value: &str) -> Result<()> {
        self.entry(account)?
            .set_password(value)
            .map_err(|e| Error::Store(e.to_string()))
    }

    fn delete(&self, account: &str) -> Result<bool> {
        match self.entry(account)?.delete_password() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(Error::Store(e.to_string())),
        }
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemoryStore {
    fn get(&self, account: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(account).cloned())
    }

    fn set(&self, account: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(account.into(), value.into());
        Ok(())
    }

    fn delete(&self, account: &str) -> Result<bool> {
        Ok(self.entries.lock().unwrap().remove(account).is_some())
    }
}
