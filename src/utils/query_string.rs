// src/utils/query_string.rs
//! Decoding of URL-encoded init data into a [`FieldMap`].
//!
//! The decoding has to agree byte-for-byte with what the platform signed, so it
//! follows the usual form encoding rules: pairs separated by `&`, key and value
//! separated by the first `=`, `+` meaning a space and `%XX` escapes decoded as
//! UTF-8. Repeated keys are folded by [`FieldMap::append`].

use crate::models::init_data::FieldMap;
use percent_encoding::percent_decode_str;
use thiserror::Error;

/// Reasons a raw payload cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CanonicalizeError {
    #[error("invalid percent-escape at byte {0}")]
    InvalidEscape(usize),

    #[error("decoded component is not valid UTF-8")]
    InvalidUtf8,
}

/// Parses a raw query string into a field map.
///
/// An empty string is a valid, empty map. Segments without `=` get an empty
/// value and empty segments (`a=1&&b=2`) are skipped.
///
/// # Errors
/// Returns `Err` if a component holds a `%` not followed by two hex digits, or
/// if its decoded bytes are not UTF-8.
pub fn canonicalize(raw: &str) -> Result<FieldMap, CanonicalizeError> {
    let mut fields = FieldMap::new();
    let mut offset = 0;

    for segment in raw.split('&') {
        let start = offset;
        offset += segment.len() + 1;
        if segment.is_empty() {
            continue;
        }

        let (key, value, value_start) = match segment.find('=') {
            Some(eq) => (&segment[..eq], &segment[eq + 1..], start + eq + 1),
            None => (segment, "", start + segment.len()),
        };

        fields.append(decode_component(key, start)?, decode_component(value, value_start)?);
    }

    Ok(fields)
}

fn decode_component(component: &str, offset: usize) -> Result<String, CanonicalizeError> {
    check_escapes(component).map_err(|at| CanonicalizeError::InvalidEscape(offset + at))?;

    let spaced = component.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| CanonicalizeError::InvalidUtf8)
}

/// Returns the index of the first `%` that does not start a valid escape.
fn check_escapes(component: &str) -> Result<(), usize> {
    let bytes = component.as_bytes();
    for (i, byte) in bytes.iter().enumerate() {
        if *byte != b'%' {
            continue;
        }
        let valid = bytes.get(i + 1).map_or(false, u8::is_ascii_hexdigit)
            && bytes.get(i + 2).map_or(false, u8::is_ascii_hexdigit);
        if !valid {
            return Err(i);
        }
    }
    Ok(())
}
