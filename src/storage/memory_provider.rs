// src/storage/memory_provider.rs
//! In-memory identity provider.
//!
//! Keeps user records in a hashmap behind a mutex. Used for local development
//! (`provider = "memory"`) and as the provider in tests. Token minting can be
//! withheld to reproduce deployments where the service account lacks signing
//! rights.

use crate::models::credential::UserRecord;
use crate::models::error::ProviderError;
use crate::storage::identity_provider::IdentityProvider;
use crate::wallet::key_management::ServiceAccountKey;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// HashMap-backed identity provider.
#[derive(Debug, Default)]
pub struct InMemoryIdentityProvider {
    /// User records by uid
    users: Mutex<HashMap<String, UserRecord>>,
    /// Key for minting tokens; `None` means every mint is denied
    signing_key: Option<ServiceAccountKey>,
    /// Number of successful `create_user` calls
    created: AtomicUsize,
}

impl InMemoryIdentityProvider {
    /// Creates a provider that mints tokens with `signing_key`, or denies all
    /// mints when it is `None`.
    pub fn new(signing_key: Option<ServiceAccountKey>) -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            signing_key,
            created: AtomicUsize::new(0),
        }
    }
}

#[cfg(test)]
impl InMemoryIdentityProvider {
    /// Seeds an existing user record.
    pub fn insert_user(&self, record: UserRecord) {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        users.insert(record.uid.clone(), record);
    }

    /// Number of stored user records.
    pub fn user_count(&self) -> usize {
        self.users.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Number of records created through [`IdentityProvider::create_user`].
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn create_custom_token(&self, subject: &str) -> Result<String, ProviderError> {
        match &self.signing_key {
            Some(key) => key.mint_custom_token(subject),
            None => Err(ProviderError::PermissionDenied(
                "no signing key available to mint custom tokens".into(),
            )),
        }
    }

    async fn get_user(&self, uid: &str) -> Result<UserRecord, ProviderError> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        users
            .get(uid)
            .cloned()
            .ok_or_else(|| ProviderError::UserNotFound(uid.to_string()))
    }

    async fn create_user(
        &self,
        uid: &str,
        display_name: &str,
    ) -> Result<UserRecord, ProviderError> {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        if users.contains_key(uid) {
            return Err(ProviderError::UserExists(uid.to_string()));
        }

        let record = UserRecord::enabled(uid, display_name);
        users.insert(uid.to_string(), record.clone());
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }
}
