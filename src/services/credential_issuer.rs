// src/services/credential_issuer.rs
//! Credential Issuer Service
//!
//! Turns a verification outcome into a credential from the identity provider:
//! - a custom token for the verified (or fallback) identity, or
//! - when the provider denies token minting, the provisioned user record
//!
//! Every provider call runs under a timeout. No retries are made here; a
//! failed call is reported and the caller decides what to do. Dropping the
//! `issue` future abandons whatever provider call is in flight.

use crate::models::credential::{display_name_for, Credential, UserRecord};
use crate::models::error::{AuthError, ProviderError};
use crate::models::init_data::VerificationOutcome;
use crate::storage::identity_provider::IdentityProvider;
use log::{error, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Default bound on a single identity provider round trip.
pub const DEFAULT_ISSUANCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Service issuing credentials for verified identities.
#[derive(Clone)]
pub struct CredentialIssuer {
    /// Identity provider backend, shared across requests
    provider: Arc<dyn IdentityProvider>,

    /// Upper bound for each provider call
    timeout: Duration,
}

impl CredentialIssuer {
    /// Creates a new CredentialIssuer instance
    ///
    /// # Arguments
    /// * `provider` - Identity provider used for tokens and user records
    /// * `timeout` - Upper bound for each provider round trip
    pub fn new(provider: Arc<dyn IdentityProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Issues a credential for an accepted verification outcome.
    ///
    /// # Returns
    /// - `Credential::Token` when the provider mints a custom token
    /// - `Credential::ProvisionedUser` when minting is denied for lack of
    ///   permission and the user record could be found or created
    ///
    /// # Errors
    /// - `AuthError::Rejected` if the outcome was a rejection
    /// - `AuthError::IssuanceFailed` for any other provider failure, including
    ///   timeouts
    pub async fn issue(&self, outcome: VerificationOutcome) -> Result<Credential, AuthError> {
        let identity = match outcome {
            VerificationOutcome::Verified(identity)
            | VerificationOutcome::MockIdentity(identity) => identity,
            VerificationOutcome::Rejected(reason) => return Err(AuthError::Rejected(reason)),
        };
        let subject = identity.subject();

        match self.call(self.provider.create_custom_token(&subject)).await {
            Ok(token) => {
                info!("custom token created for user {}", subject);
                Ok(Credential::Token(token))
            }
            Err(ProviderError::PermissionDenied(detail)) => {
                warn!(
                    "token minting denied ({}), provisioning user {} instead",
                    detail, subject
                );
                self.provision(&subject).await.map(Credential::ProvisionedUser)
            }
            Err(e) => {
                error!("error creating custom token for {}: {}", subject, e);
                Err(AuthError::IssuanceFailed(e.to_string()))
            }
        }
    }

    /// Returns the existing record for `uid`, creating it if absent.
    ///
    /// A concurrent creation between lookup and create is resolved by reading
    /// the record that won.
    async fn provision(&self, uid: &str) -> Result<UserRecord, AuthError> {
        match self.call(self.provider.get_user(uid)).await {
            Ok(record) => {
                info!("user {} already exists", uid);
                return Ok(record);
            }
            Err(ProviderError::UserNotFound(_)) => {}
            Err(e) => return Err(provisioning_failed(uid, e)),
        }

        let display_name = display_name_for(uid);
        match self.call(self.provider.create_user(uid, &display_name)).await {
            Ok(record) => {
                info!("created new user {}", uid);
                Ok(record)
            }
            Err(ProviderError::UserExists(_)) => self
                .call(self.provider.get_user(uid))
                .await
                .map_err(|e| provisioning_failed(uid, e)),
            Err(e) => Err(provisioning_failed(uid, e)),
        }
    }

    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .unwrap_or(Err(ProviderError::Timeout))
    }
}

fn provisioning_failed(uid: &str, e: ProviderError) -> AuthError {
    error!("error managing user {}: {}", uid, e);
    AuthError::IssuanceFailed(format!("failed to manage user: {}", e))
}
