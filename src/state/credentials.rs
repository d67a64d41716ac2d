use super::credential_store::{CredentialStore, StoreError};
use crate::config::ClientConfig;
use std::sync::Arc;

/// The access/refresh pair as kept in a [`CredentialStore`] under fixed key names.
#[derive(Clone)]
pub struct Credentials {
    store: Arc<dyn CredentialStore>,
    access_key: String,
    refresh_key: String,
}

impl Credentials {
    pub fn new(store: Arc<dyn CredentialStore>, config: &ClientConfig) -> Self {
        Self {
            store,
            access_key: config.access_token_key.clone(),
            refresh_key: config.refresh_token_key.clone(),
        }
    }

    pub fn access_token(&self) -> Result<Option<String>, StoreError> {
        self.store.get(&self.access_key)
    }

    pub fn refresh_token(&self) -> Result<Option<String>, StoreError> {
        self.store.get(&self.refresh_key)
    }

    pub fn store_pair(&self, access: &str, refresh: &str) -> Result<(), StoreError> {
        self.store.set(&self.access_key, access)?;
        self.store.set(&self.refresh_key, refresh)
    }

    pub fn store_access(&self, access: &str) -> Result<(), StoreError> {
        self.store.set(&self.access_key, access)
    }

    pub fn store_refresh(&self, refresh: &str) -> Result<(), StoreError> {
        self.store.set(&self.refresh_key, refresh)
    }

    pub fn clear_access(&self) -> Result<(), StoreError> {
        self.store.remove(&self.access_key)
    }

    /// Removes both values; attempts the refresh removal even if the access one failed.
    pub fn clear(&self) -> Result<(), StoreError> {
        let access = self.store.remove(&self.access_key);
        let refresh = self.store.remove(&self.refresh_key);
        access.and(refresh)
    }

    pub fn is_present(&self) -> bool {
        matches!(self.access_token(), Ok(Some(_))) && matches!(self.refresh_token(), Ok(Some(_)))
    }
}
