// src/services/verifier.rs
//! Init data verification engine.
//!
//! Composes the fallback policy, query string decoding, identity extraction
//! and the HMAC check into a single `verify(raw, secret)` call. The steps run
//! in a fixed order:
//!
//! 1. fallback policy (absent payloads and fixtures, no crypto at all)
//! 2. decoding, failing with `MalformedPayload`
//! 3. identity extraction
//! 4. signature check, failing with `BadSignature`
//! 5. `auth_date` freshness, only when a maximum age is configured

use crate::models::error::RejectReason;
use crate::models::init_data::{
    FieldMap, Identity, PayloadClass, VerificationOutcome, AUTH_DATE_FIELD,
};
use crate::services::fallback_policy::FallbackPolicy;
use crate::services::identity::extract_identity;
use crate::services::signature::verify_signature;
use crate::utils::crypto::SecretKey;
use crate::utils::query_string::canonicalize;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};

/// Allowed clock skew for `auth_date` values from the future.
const MAX_FUTURE_SKEW_SECS: i64 = 60;

/// Stateless verifier for mini app launch payloads.
///
/// Holds only immutable configuration, so one instance can be shared across
/// any number of concurrent requests.
#[derive(Debug, Clone)]
pub struct VerificationEngine {
    policy: FallbackPolicy,
    max_auth_age: Option<Duration>,
}

impl VerificationEngine {
    /// Creates an engine with the given mock-acceptance policy and no
    /// freshness limit.
    pub fn new(policy: FallbackPolicy) -> Self {
        Self { policy, max_auth_age: None }
    }

    /// Rejects signed payloads whose `auth_date` is older than `max_age`.
    pub fn with_max_auth_age(mut self, max_age: Duration) -> Self {
        self.max_auth_age = Some(max_age);
        self
    }

    pub fn policy(&self) -> &FallbackPolicy {
        &self.policy
    }

    /// Verifies a raw payload against the bot secret.
    pub fn verify(&self, raw: &str, secret: &SecretKey) -> VerificationOutcome {
        self.verify_at(raw, secret, Utc::now())
    }

    /// Same as [`verify`](Self::verify) with an explicit clock reading.
    pub fn verify_at(
        &self,
        raw: &str,
        secret: &SecretKey,
        now: DateTime<Utc>,
    ) -> VerificationOutcome {
        match self.policy.classify(raw) {
            PayloadClass::Empty => {
                warn!("init data is absent ({:?}), using anonymous fallback identity", raw);
                return VerificationOutcome::MockIdentity(Identity::anonymous());
            }
            PayloadClass::FixtureMock(uid) => {
                info!("using fixture identity {}", uid);
                return VerificationOutcome::MockIdentity(Identity::new(uid));
            }
            PayloadClass::RealCandidate => {}
        }

        debug!("received init data: {}...", truncate(raw, 50));

        match self.verify_signed(raw, secret, now) {
            Ok(identity) => {
                info!("verified init data for user {}", identity.uid);
                VerificationOutcome::Verified(identity)
            }
            Err(reason) => {
                warn!("rejected init data: {}", reason);
                VerificationOutcome::Rejected(reason)
            }
        }
    }

    fn verify_signed(
        &self,
        raw: &str,
        secret: &SecretKey,
        now: DateTime<Utc>,
    ) -> Result<Identity, RejectReason> {
        let fields = canonicalize(raw).map_err(|e| {
            debug!("init data decoding failed: {}", e);
            RejectReason::MalformedPayload
        })?;
        debug!("decoded {} init data fields", fields.len());

        let identity = extract_identity(&fields)?;

        if !verify_signature(&fields, secret) {
            return Err(RejectReason::BadSignature);
        }

        if let Some(max_age) = self.max_auth_age {
            check_freshness(&fields, max_age, now)?;
        }

        Ok(identity)
    }
}

fn check_freshness(
    fields: &FieldMap,
    max_age: Duration,
    now: DateTime<Utc>,
) -> Result<(), RejectReason> {
    let signed_at = fields
        .get(AUTH_DATE_FIELD)
        .and_then(|value| value.parse::<i64>().ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .ok_or(RejectReason::StalePayload)?;

    let age = now.signed_duration_since(signed_at);
    if age > max_age || age < -Duration::seconds(MAX_FUTURE_SKEW_SECS) {
        debug!("auth_date {} is {}s old", signed_at, age.num_seconds());
        return Err(RejectReason::StalePayload);
    }
    Ok(())
}

/// Cuts a payload for logging without splitting a UTF-8 sequence.
fn truncate(raw: &str, max_chars: usize) -> &str {
    match raw.char_indices().nth(max_chars) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}
