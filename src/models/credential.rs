// src/models/credential.rs
//! Credential data model.
//!
//! A credential is what the caller receives after a successful verification:
//! either a custom token minted by the identity provider, or, when token
//! minting is unavailable, the provisioned user record itself.

use serde::{Deserialize, Serialize};

/// A user record as stored by the identity provider.
///
/// Serialized with camelCase keys, the shape mini app clients already expect.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Provider uid (the stringified identity uid)
    pub uid: String,

    /// Human readable name, e.g. "Telegram User 12345"
    pub display_name: Option<String>,

    /// Whether the account is disabled at the provider
    #[serde(default)]
    pub disabled: bool,
}

impl UserRecord {
    /// An enabled record, as the provisioning path creates it.
    pub fn enabled(uid: &str, display_name: &str) -> Self {
        Self {
            uid: uid.to_string(),
            display_name: Some(display_name.to_string()),
            disabled: false,
        }
    }

    /// The record provisioning creates for `uid`, with the synthesized name.
    #[cfg(test)]
    pub fn provisioned(uid: &str) -> Self {
        Self::enabled(uid, &display_name_for(uid))
    }
}

/// Display name given to users created by the provisioning fallback.
pub fn display_name_for(uid: &str) -> String {
    format!("Telegram User {}", uid)
}

/// Outcome of credential issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Opaque signed custom token for the identity provider's client SDK.
    Token(String),

    /// Token minting was denied; the (existing or freshly created) user record.
    ProvisionedUser(UserRecord),
}
