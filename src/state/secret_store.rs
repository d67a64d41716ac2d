use super::credential_store::{normalize, CredentialStore, StoreError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// OS keychain / secret service backed store. Reads are cached in memory so a
/// request burst does not hit the keychain once per request.
#[derive(Clone)]
pub struct KeyringStore {
    service: String,
    in_memory: Arc<Mutex<HashMap<String, String>>>,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            in_memory: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry, keyring::Error> {
        keyring::Entry::new(&self.service, key)
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.in_memory
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_available(&self) -> bool {
        let Ok(entry) = self.entry("availability-probe") else {
            return false;
        };

        match entry.get_password() {
            Ok(_) => true,
            Err(keyring::Error::NoEntry) => true,
            Err(keyring::Error::BadEncoding(_)) => true,
            Err(keyring::Error::Ambiguous(_)) => true,
            Err(keyring::Error::NoStorageAccess(_)) => false,
            Err(keyring::Error::PlatformFailure(_)) => false,
            Err(_) => false,
        }
    }

    /// Drops the cached value only once the keychain delete went through.
    fn remove_entry(&self, key: &str, entry: &keyring::Entry) -> Result<(), StoreError> {
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {
                self.cache().remove(key);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(key, error = %err, "keychain delete failed");
                Err(unavailable(err))
            }
        }
    }
}

fn unavailable(err: keyring::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

impl CredentialStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if let Some(value) = self.cache().get(key).cloned() {
            return Ok(Some(value));
        }

        let entry = self.entry(key).map_err(unavailable)?;
        match entry.get_password() {
            Ok(pwd) => {
                let value = normalize(&pwd);
                if let Some(value) = &value {
                    self.cache().insert(key.to_string(), value.clone());
                }
                Ok(value)
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err @ keyring::Error::NoStorageAccess(_)) => Err(unavailable(err)),
            Err(err @ keyring::Error::PlatformFailure(_)) => Err(unavailable(err)),
            Err(_) => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let Some(value) = normalize(value) else {
            return self.remove(key);
        };
        let entry = self.entry(key).map_err(unavailable)?;
        entry.set_password(&value).map_err(unavailable)?;
        self.cache().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let entry = self.entry(key).map_err(unavailable)?;
        self.remove_entry(key, &entry)
    }
}
