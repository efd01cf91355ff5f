// src/services/identity.rs
//! Extraction of the caller's identity from the embedded `user` record.

use crate::models::error::RejectReason;
use crate::models::init_data::{FieldMap, Identity, USER_FIELD};
use log::debug;
use serde_json::Value;

/// Client bugs sometimes serialize a missing object as these literals.
const ABSENT_LITERALS: [&str; 2] = ["undefined", "null"];

/// Reads the uid out of the payload's `user` JSON record.
///
/// # Errors
/// - [`RejectReason::MissingUser`] if there is no `user` field, or it holds
///   `"undefined"` / `"null"`
/// - [`RejectReason::InvalidUserJson`] if the field is not JSON
/// - [`RejectReason::MissingId`] if `id` is absent, not a number, or not a
///   positive integer
pub fn extract_identity(fields: &FieldMap) -> Result<Identity, RejectReason> {
    let raw_user = match fields.get(USER_FIELD) {
        Some(value) if !value.is_empty() && !ABSENT_LITERALS.contains(&value) => value,
        _ => return Err(RejectReason::MissingUser),
    };

    let user: Value = serde_json::from_str(raw_user).map_err(|e| {
        debug!("user field is not JSON: {}", e);
        RejectReason::InvalidUserJson
    })?;

    user.get("id")
        .and_then(Value::as_u64)
        .filter(|uid| *uid > 0)
        .map(Identity::new)
        .ok_or(RejectReason::MissingId)
}
