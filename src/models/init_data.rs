// src/models/init_data.rs
//! Data model for mini app launch payloads ("init data").
//!
//! A launch payload is an unordered URL-encoded query string. Once decoded it
//! becomes a [`FieldMap`], from which the signed check-string is rebuilt and the
//! caller's [`Identity`] is extracted.

use crate::models::error::RejectReason;
use std::collections::BTreeMap;

/// Field carrying the hex HMAC digest; never part of the check-string.
pub const HASH_FIELD: &str = "hash";

/// Field carrying the JSON-encoded user record.
pub const USER_FIELD: &str = "user";

/// Field carrying the unix timestamp the platform signed the payload at.
pub const AUTH_DATE_FIELD: &str = "auth_date";

/// Reserved uid meaning "anonymous/unverified caller".
///
/// Real identities always carry a positive uid, so zero can never collide.
pub const ANONYMOUS_UID: u64 = 0;

/// Provider subject used for the anonymous sentinel identity.
pub const ANONYMOUS_SUBJECT: &str = "telegram_user_fallback";

/// Decoded payload fields, ordered by key.
///
/// Keys are unique. A key that appeared several times in the raw payload holds
/// its values joined with `,` in encounter order, which is how the platform's
/// signer saw them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    fields: BTreeMap<String, String>,
}

impl FieldMap {
    /// Creates an empty field map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, joining it onto any earlier value for the same key.
    pub fn append(&mut self, key: String, value: String) {
        self.fields
            .entry(key)
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(&value);
            })
            .or_insert(value);
    }

    /// Looks up a field value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over `(key, value)` pairs in lexicographic key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Builds the data check-string: every field except `hash`, sorted by key,
    /// rendered `key=value` and joined with `\n`.
    ///
    /// Ordering comes from the map itself, so the result does not depend on the
    /// order keys had in the raw payload.
    pub fn check_string(&self) -> String {
        self.iter()
            .filter(|(key, _)| *key != HASH_FIELD)
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        for (key, value) in iter {
            map.append(key.into(), value.into());
        }
        map
    }
}

/// The stable identity claim extracted from a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity {
    pub uid: u64,
}

impl Identity {
    pub fn new(uid: u64) -> Self {
        Self { uid }
    }

    /// The sentinel identity handed out when the client supplied no payload.
    pub fn anonymous() -> Self {
        Self { uid: ANONYMOUS_UID }
    }

    pub fn is_anonymous(&self) -> bool {
        self.uid == ANONYMOUS_UID
    }

    /// Subject string used with the identity provider.
    pub fn subject(&self) -> String {
        if self.is_anonymous() {
            ANONYMOUS_SUBJECT.to_string()
        } else {
            self.uid.to_string()
        }
    }
}

/// How the fallback policy classified a raw payload before any decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadClass {
    /// No payload at all: empty, `"undefined"` or `"null"`.
    Empty,
    /// A recognised test fixture carrying its own uid.
    FixtureMock(u64),
    /// Anything else; must go through the cryptographic path.
    RealCandidate,
}

/// Result of running a payload through the verification engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// Signature checked and identity extracted.
    Verified(Identity),
    /// Accepted by the fallback policy without any signature check.
    MockIdentity(Identity),
    /// Refused.
    Rejected(RejectReason),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_joins_repeated_keys_in_order() {
        let mut fields = FieldMap::new();
        fields.append("tag".into(), "b".into());
        fields.append("tag".into(), "a".into());
        assert_eq!(fields.get("tag"), Some("b,a"));
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn test_check_string_excludes_hash_and_sorts() {
        let fields: FieldMap = [
            ("user", "{\"id\":12345}"),
            ("hash", "deadbeef"),
            ("auth_date", "1700000000"),
            ("query_id", "AAA"),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            fields.check_string(),
            "auth_date=1700000000\nquery_id=AAA\nuser={\"id\":12345}"
        );
    }

    #[test]
    fn test_check_string_is_order_independent() {
        let pairs = [("b", "2"), ("a", "1"), ("c", "3"), ("hash", "x")];
        let forward: FieldMap = pairs.iter().copied().collect();
        let reversed: FieldMap = pairs.iter().rev().copied().collect();
        let rotated: FieldMap = pairs.iter().cycle().skip(2).take(4).copied().collect();

        assert_eq!(forward.check_string(), reversed.check_string());
        assert_eq!(forward.check_string(), rotated.check_string());
        assert_eq!(forward.check_string(), "a=1\nb=2\nc=3");
    }

    #[test]
    fn test_anonymous_identity_subject() {
        assert!(Identity::anonymous().is_anonymous());
        assert_eq!(Identity::anonymous().subject(), "telegram_user_fallback");
        assert_eq!(Identity::new(42).subject(), "42");
    }
}
