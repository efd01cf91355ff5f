// src/wallet/key_management.rs
//! Service-account key management for custom token minting.
//!
//! Custom tokens are RS256 JWTs signed with the service account's private key
//! and exchanged by the client SDK for a session. Uses:
//! - `jsonwebtoken` for JWT encoding
//! - `chrono` for issue/expiry timestamps

use crate::models::error::ProviderError;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Audience the identity platform expects on custom tokens.
pub const CUSTOM_TOKEN_AUDIENCE: &str =
    "https://identitytoolkit.googleapis.com/google.identity.identitytoolkit.v1.IdentityToolkit";

/// Custom tokens are valid for one hour.
const CUSTOM_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Longest uid the identity platform accepts.
const MAX_UID_LEN: usize = 128;

/// Claims of a custom token.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub uid: String,
}

/// Signing material of a service account.
///
/// # Security Notes
/// - The private key never leaves this struct and `Debug` redacts it
/// - Tokens are short-lived (one hour)
#[derive(Clone)]
pub struct ServiceAccountKey {
    /// Service account e-mail, used as issuer and subject of minted tokens
    client_email: String,
    /// RS256 signing key parsed from the PEM
    encoding_key: EncodingKey,
}

impl ServiceAccountKey {
    /// Parses a PEM-encoded RSA private key (PKCS#1 or PKCS#8).
    ///
    /// # Errors
    /// Returns `Err` if the PEM cannot be parsed as an RSA key.
    pub fn from_pem(
        client_email: impl Into<String>,
        private_key_pem: &str,
    ) -> Result<Self, jsonwebtoken::errors::Error> {
        // env files usually carry the PEM with escaped newlines
        let pem = private_key_pem.replace("\\n", "\n");
        Ok(Self {
            client_email: client_email.into(),
            encoding_key: EncodingKey::from_rsa_pem(pem.as_bytes())?,
        })
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    /// Mints a custom token for `uid`.
    ///
    /// # Errors
    /// - `ProviderError::Api` (status 400) if the uid is empty or too long
    /// - `ProviderError::Api` (status 500) if signing fails
    pub fn mint_custom_token(&self, uid: &str) -> Result<String, ProviderError> {
        if uid.is_empty() || uid.len() > MAX_UID_LEN {
            return Err(ProviderError::Api {
                status: 400,
                message: format!("uid must be 1 to {} characters long", MAX_UID_LEN),
            });
        }

        let iat = Utc::now().timestamp();
        let claims = CustomTokenClaims {
            iss: self.client_email.clone(),
            sub: self.client_email.clone(),
            aud: CUSTOM_TOKEN_AUDIENCE.to_string(),
            iat,
            exp: iat + CUSTOM_TOKEN_LIFETIME_SECS,
            uid: uid.to_string(),
        };

        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key).map_err(|e| {
            ProviderError::Api {
                status: 500,
                message: format!("failed to sign custom token: {}", e),
            }
        })
    }
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("encoding_key", &"<REDACTED>")
            .finish()
    }
}
