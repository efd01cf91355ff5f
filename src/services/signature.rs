// src/services/signature.rs
//! Init data signature check.

use crate::models::init_data::{FieldMap, HASH_FIELD};
use crate::utils::crypto::{verify_hex, SecretKey};
use log::debug;

/// Checks the `hash` field of a decoded payload against its check-string.
///
/// Returns `true` iff the HMAC-SHA256 of [`FieldMap::check_string`] under
/// `secret`, rendered as lowercase hex, equals the provided hash. A payload
/// without a `hash` field, or with anything but lowercase hex in it, simply
/// fails. The digest comparison is constant-time.
pub fn verify_signature(fields: &FieldMap, secret: &SecretKey) -> bool {
    let provided = match fields.get(HASH_FIELD) {
        Some(hash) => hash,
        None => {
            debug!("init data carries no hash field");
            return false;
        }
    };
    if !is_lowercase_hex(provided) {
        debug!("init data hash is not lowercase hex");
        return false;
    }

    verify_hex(secret, &fields.check_string(), provided)
}

fn is_lowercase_hex(value: &str) -> bool {
    value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
