// src/models/error.rs
//! Error taxonomy for init data verification and credential issuance.
//!
//! Verification failures are client-caused and always map to an authentication
//! failure. Issuance and configuration failures are operational: their detail is
//! logged server-side and the client only sees a generic message.

use thiserror::Error;

/// Why a payload was refused by the verification engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// The query string could not be decoded (bad percent-escape or non UTF-8).
    #[error("malformed payload")]
    MalformedPayload,

    /// No usable `user` field (absent, `"undefined"` or `"null"`).
    #[error("user field not found")]
    MissingUser,

    /// The `user` field is not valid JSON.
    #[error("user field is not valid JSON")]
    InvalidUserJson,

    /// The user record carries no positive numeric `id`.
    #[error("user id is missing or not numeric")]
    MissingId,

    /// The HMAC digest did not match the `hash` field, or there was no `hash`.
    #[error("signature mismatch")]
    BadSignature,

    /// `auth_date` is missing or outside the configured freshness window.
    #[error("payload is stale")]
    StalePayload,
}

/// Failure of the full verify-then-issue pipeline.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The payload was refused; maps to 401.
    #[error("invalid init data: {0}")]
    Rejected(#[from] RejectReason),

    /// The identity provider failed for a reason other than a permission denial.
    #[error("credential issuance failed: {0}")]
    IssuanceFailed(String),

    /// The service cannot verify anything (for example the bot secret is absent).
    #[error("server misconfigured: {0}")]
    ServerMisconfigured(String),
}

impl AuthError {
    /// HTTP status class the transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::Rejected(_) => 401,
            AuthError::IssuanceFailed(_) | AuthError::ServerMisconfigured(_) => 500,
        }
    }

    /// Whether the failure was caused by the client rather than by the deployment.
    pub fn is_client_error(&self) -> bool {
        matches!(self, AuthError::Rejected(_))
    }
}

/// Errors reported by an identity provider backend.
///
/// The permission fallback in the credential issuer keys off
/// [`ProviderError::PermissionDenied`] only, so backends must classify errors
/// structurally instead of leaving callers to inspect message text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider account lacks rights for the requested operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No user record exists for the uid.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// A user record already exists for the uid.
    #[error("user already exists: {0}")]
    UserExists(String),

    /// The call did not complete within the allotted time.
    #[error("identity provider timed out")]
    Timeout,

    /// The request never produced an API response.
    #[error("transport error: {0}")]
    Transport(String),

    /// Any other API-level failure.
    #[error("identity provider error ({status}): {message}")]
    Api { status: u16, message: String },
}
