// src/services/fallback_policy.rs
//! Mock-acceptance rules applied before any cryptographic work.
//!
//! Two kinds of payload skip signature verification entirely:
//! - an absent payload (empty, `"undefined"` or `"null"`), accepted as the
//!   anonymous sentinel identity so the endpoint keeps working when the client
//!   fails to pass its launch data
//! - test fixtures of the form `mock_init_data_for_<uid>`
//!
//! Both grant an unauthenticated identity. Production deployments switch them
//! off with [`FallbackPolicy::disabled`] and the verification path is untouched.

use crate::models::init_data::PayloadClass;

/// Literal prefix of test fixture payloads.
pub const FIXTURE_PREFIX: &str = "mock_init_data_for_";

const ABSENT_PAYLOADS: [&str; 3] = ["", "undefined", "null"];

/// Decides which raw payloads bypass verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPolicy {
    /// Accept an absent payload as the anonymous identity
    pub allow_anonymous: bool,
    /// Accept `mock_init_data_for_<uid>` fixtures
    pub allow_fixtures: bool,
}

impl FallbackPolicy {
    pub fn new(allow_anonymous: bool, allow_fixtures: bool) -> Self {
        Self { allow_anonymous, allow_fixtures }
    }

    /// Every payload goes through signature verification.
    pub fn disabled() -> Self {
        Self::new(false, false)
    }

    /// Both mock paths enabled.
    pub fn permissive() -> Self {
        Self::new(true, true)
    }

    /// Classifies a raw payload without decoding it.
    ///
    /// A fixture whose suffix (after the last `_`) is not a positive integer in
    /// canonical decimal form (ASCII digits, no sign, no leading zero) is not a
    /// fixture and comes back as [`PayloadClass::RealCandidate`].
    pub fn classify(&self, raw: &str) -> PayloadClass {
        if self.allow_anonymous && ABSENT_PAYLOADS.contains(&raw) {
            return PayloadClass::Empty;
        }

        if self.allow_fixtures && raw.starts_with(FIXTURE_PREFIX) {
            if let Some(uid) = fixture_uid(raw) {
                return PayloadClass::FixtureMock(uid);
            }
        }

        PayloadClass::RealCandidate
    }
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self::permissive()
    }
}

fn fixture_uid(raw: &str) -> Option<u64> {
    let suffix = raw.rsplit('_').next()?;
    // The suffix becomes the provider subject, so it must print back unchanged.
    if suffix.starts_with('0') || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse::<u64>().ok()
}
