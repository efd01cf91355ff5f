pub mod api_server;
pub mod credential_issuer;
pub mod fallback_policy;
pub mod identity;
pub mod signature;
pub mod verifier;
