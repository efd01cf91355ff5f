// src/storage/identity_provider.rs
//! Interface to the external identity provider.
//!
//! The credential issuer depends only on this trait, so the provider backend
//! (REST API, in-memory store, test doubles) is chosen at startup.

use crate::models::credential::UserRecord;
use crate::models::error::ProviderError;
use async_trait::async_trait;

/// Operations the credential issuer needs from the identity provider.
///
/// Implementations must report a denied token mint as
/// [`ProviderError::PermissionDenied`] and an unknown uid as
/// [`ProviderError::UserNotFound`]; the issuer's fallback logic relies on it.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Mints a signed custom token for `subject`.
    async fn create_custom_token(&self, subject: &str) -> Result<String, ProviderError>;

    /// Looks up the user record for `uid`.
    async fn get_user(&self, uid: &str) -> Result<UserRecord, ProviderError>;

    /// Creates an enabled user record with the given display name.
    async fn create_user(&self, uid: &str, display_name: &str)
        -> Result<UserRecord, ProviderError>;
}
