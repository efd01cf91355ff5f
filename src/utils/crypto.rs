// src/utils/crypto.rs
//! HMAC-SHA256 utilities for init data signatures.
//!
//! All MAC operations go through `ring::hmac`, whose `verify` compares tags in
//! constant time.

use ring::hmac;
use std::fmt;

/// Key the platform uses to derive the per-bot secret from a bot token.
const WEB_APP_DATA_KEY: &[u8] = b"WebAppData";

/// The final HMAC key bytes used to check init data signatures.
///
/// `Debug` output is redacted so the key never ends up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    /// Wraps raw key bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        SecretKey(bytes.into())
    }

    /// Decodes a hex-encoded key (the form the bot secret is deployed in).
    ///
    /// # Errors
    /// Returns `Err` if the string is not valid hex or is empty.
    pub fn from_hex(encoded: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(encoded.trim())?;
        if bytes.is_empty() {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        Ok(SecretKey::new(bytes))
    }

    /// Derives the key from a raw bot token: `HMAC-SHA256("WebAppData", token)`.
    pub fn derive_from_bot_token(bot_token: &str) -> Self {
        SecretKey::new(sign(WEB_APP_DATA_KEY, bot_token.as_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SecretKey").field(&"<REDACTED>").finish()
    }
}

/// Computes HMAC-SHA256 of `message` under `key`.
pub fn sign(key: &[u8], message: &[u8]) -> Vec<u8> {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::sign(&key, message).as_ref().to_vec()
}

/// Computes HMAC-SHA256 of `message` and renders it as lowercase hex.
#[cfg(test)]
pub fn sign_hex(key: &SecretKey, message: &str) -> String {
    hex::encode(sign(key.as_bytes(), message.as_bytes()))
}

/// Checks a hex-encoded HMAC-SHA256 tag in constant time.
///
/// A tag that is not valid hex cannot match and yields `false`.
pub fn verify_hex(key: &SecretKey, message: &str, expected_hex: &str) -> bool {
    let expected = match hex::decode(expected_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let key = hmac::Key::new(hmac::HMAC_SHA256, key.as_bytes());
    hmac::verify(&key, message.as_bytes(), &expected).is_ok()
}
