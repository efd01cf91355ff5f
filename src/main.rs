// src/main.rs

//! # Mini App Authentication Service - Main Entry Point
//!
//! Verifies the signed launch payload ("init data") a messaging-platform mini
//! app sends to its backend and exchanges the caller's identity for a
//! credential from the identity provider.
//!
//! ## Architecture Overview
//! 1. **Utils Layer**: query string decoding and HMAC-SHA256 primitives
//! 2. **Services Layer**: fallback policy, verification engine, credential issuer, API server
//! 3. **Storage Layer**: identity provider backends (REST API or in-memory)
//! 4. **Wallet Layer**: service-account key for minting custom tokens
//!
//! Configuration is read from `MINIAPP_AUTH_*` environment variables, see
//! [`settings`].

use crate::services::api_server::ApiServer;
use crate::services::credential_issuer::CredentialIssuer;
use crate::services::verifier::VerificationEngine;
use crate::settings::Settings;
use anyhow::Context;
use log::{info, warn};

// Module declarations (organized by functional domain)
mod models;        // Data structures and errors
mod services;      // Verification, issuance and API
mod settings;      // Environment configuration
mod storage;       // Identity provider backends
mod utils;         // Decoding and crypto helpers
mod wallet;        // Service-account signing key

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Initialize logging and load configuration
/// 2. Build the identity provider and services
/// 3. Start API server
///
/// A missing bot secret does not stop startup: requests are answered with a
/// server error until it is configured.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load settings")?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let addr = settings.socket_addr()?;
    let secret = settings.secret_key()?;
    if secret.is_none() {
        warn!("no bot secret configured; every request will fail with a server error");
    }

    let mut engine = VerificationEngine::new(settings.fallback_policy());
    if let Some(max_age) = settings.max_auth_age()? {
        info!("rejecting init data older than {}s", max_age.num_seconds());
        engine = engine.with_max_auth_age(max_age);
    }
    if engine.policy().allow_anonymous {
        warn!("absent init data is accepted as the anonymous fallback identity");
    }
    if engine.policy().allow_fixtures {
        warn!("mock_init_data_for_<uid> fixtures bypass signature verification");
    }

    let provider = settings.build_provider().context("failed to build identity provider")?;
    let issuer = CredentialIssuer::new(provider, settings.issuance_timeout());

    let api_server = ApiServer::new(engine, issuer, secret, settings.allowed_origins());

    info!("Available endpoints:");
    info!("- POST /getCustomToken");
    info!("- GET  /healthz");

    api_server.run(addr).await?;
    Ok(())
}
