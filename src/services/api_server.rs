// src/services/api_server.rs
//! API Server for mini app authentication
//!
//! Thin HTTP wrapper around the verification engine and credential issuer.
//! It accepts the client's init data, maps typed outcomes onto HTTP responses
//! and handles CORS for the mini app origins.
//!
//! Endpoints:
//! - `POST /getCustomToken` - verify init data and issue a credential
//! - `GET  /healthz` - liveness probe

use crate::models::credential::{Credential, UserRecord};
use crate::models::error::AuthError;
use crate::services::credential_issuer::CredentialIssuer;
use crate::services::verifier::VerificationEngine;
use crate::utils::crypto::SecretKey;
use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::{header, request::Parts, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Request payload for the token endpoint
#[derive(Serialize, Deserialize)]
struct TokenRequest {
    /// Raw init data string exactly as the mini app received it
    #[serde(rename = "initData", default)]
    init_data: Option<String>,
}

/// Response carrying a freshly minted custom token
#[derive(Serialize, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Response carrying a provisioned user when token minting is unavailable
#[derive(Serialize, Deserialize)]
struct ProvisionedUserResponse {
    success: bool,
    user: UserRecord,
    message: String,
}

/// Error body; `details` is only filled for client-caused failures
#[derive(Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = match &self {
            AuthError::Rejected(reason) => ErrorResponse {
                error: "Invalid initData".into(),
                details: Some(reason.to_string()),
            },
            AuthError::IssuanceFailed(_) => ErrorResponse {
                error: "Failed to create custom token".into(),
                details: None,
            },
            AuthError::ServerMisconfigured(_) => ErrorResponse {
                error: "Server mis-configuration.".into(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

/// API server state containing all service dependencies
pub struct ApiServer {
    /// Init data verification
    engine: VerificationEngine,

    /// Credential issuance against the identity provider
    issuer: CredentialIssuer,

    /// Bot secret; `None` makes every request fail as misconfigured
    secret: Option<SecretKey>,

    /// Exact origins allowed by CORS in addition to localhost
    allowed_origins: Vec<String>,
}

impl ApiServer {
    /// Creates a new instance of the API server
    ///
    /// # Arguments
    /// * `engine` - Verification engine with its fallback policy
    /// * `issuer` - Credential issuer
    /// * `secret` - Bot secret key, if configured
    /// * `allowed_origins` - CORS allowlist
    pub fn new(
        engine: VerificationEngine,
        issuer: CredentialIssuer,
        secret: Option<SecretKey>,
        allowed_origins: Vec<String>,
    ) -> Self {
        ApiServer { engine, issuer, secret, allowed_origins }
    }

    /// Builds the router with all routes and the CORS layer.
    pub fn router(self) -> Router {
        let cors = cors_layer(self.allowed_origins.clone());
        Router::new()
            .route("/getCustomToken", post(Self::get_custom_token_handler))
            .route("/healthz", get(Self::health_handler))
            .layer(cors)
            .with_state(Arc::new(self))
    }

    /// Starts the API server and serves until the process is stopped.
    ///
    /// # Errors
    /// Returns `Err` if the address cannot be bound or serving fails.
    pub async fn run(self, addr: SocketAddr) -> std::io::Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API server running at http://{}", addr);
        axum::serve(listener, app).await
    }

    /// Verifies init data and issues a credential
    ///
    /// # Endpoint
    /// POST /getCustomToken
    ///
    /// # Request Body
    /// `{"initData": "<query string>"}`; a missing or `null` field counts as
    /// absent init data
    ///
    /// # Responses
    /// - 200 OK: `{"token"}` or `{"success", "user", "message"}`
    /// - 400 Bad Request: body is not JSON or `initData` is not a string
    /// - 401 Unauthorized: init data rejected
    /// - 500 Internal Server Error: missing secret or provider failure
    async fn get_custom_token_handler(
        State(state): State<Arc<ApiServer>>,
        payload: Result<Json<TokenRequest>, JsonRejection>,
    ) -> Response {
        info!("getCustomToken request started");

        let secret = match &state.secret {
            Some(secret) => secret,
            None => {
                error!("bot secret is not configured");
                return AuthError::ServerMisconfigured("bot secret is missing".into())
                    .into_response();
            }
        };

        let request = match payload {
            Ok(Json(request)) => request,
            Err(rejection) => {
                info!("unreadable request body: {}", rejection);
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse {
                        error: "Invalid request body".into(),
                        details: Some(rejection.body_text()),
                    }),
                )
                    .into_response();
            }
        };
        let raw = request.init_data.unwrap_or_default();

        let outcome = state.engine.verify(&raw, secret);
        match state.issuer.issue(outcome).await {
            Ok(Credential::Token(token)) => {
                (StatusCode::OK, Json(TokenResponse { token })).into_response()
            }
            Ok(Credential::ProvisionedUser(user)) => (
                StatusCode::OK,
                Json(ProvisionedUserResponse {
                    success: true,
                    user,
                    message: "User authenticated via Telegram".into(),
                }),
            )
                .into_response(),
            Err(e) => {
                if e.is_client_error() {
                    info!("request rejected: {}", e);
                } else {
                    error!("request failed: {}", e);
                }
                e.into_response()
            }
        }
    }

    /// Liveness probe
    ///
    /// # Endpoint
    /// GET /healthz
    async fn health_handler() -> &'static str {
        "ok"
    }
}

fn cors_layer(allowed_origins: Vec<String>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _: &Parts| {
            origin
                .to_str()
                .map(|origin| is_localhost(origin) || allowed_origins.iter().any(|o| o == origin))
                .unwrap_or(false)
        }))
        .allow_methods([Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

/// Local development origins are always accepted.
fn is_localhost(origin: &str) -> bool {
    let host = origin
        .split_once("://")
        .map_or(origin, |(_, rest)| rest)
        .split(':')
        .next()
        .unwrap_or_default();
    host == "localhost" || host == "127.0.0.1"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::init_data::Identity;
    use crate::services::fallback_policy::FallbackPolicy;
    use crate::storage::memory_provider::InMemoryIdentityProvider;
    use crate::wallet::key_management::tests::{decode_claims, test_key};
    use crate::wallet::key_management::ServiceAccountKey;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    const VECTOR_PAYLOAD: &str = "query_id=AAA&user=%7B%22id%22%3A12345%7D&auth_date=1700000000\
        &hash=e8b583a2c207905025a5434df1741ea6f2045e124955040bc55b57c4549d9c44";

    fn secret() -> SecretKey {
        SecretKey::from_hex("00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff")
            .unwrap()
    }

    fn app(signing_key: Option<ServiceAccountKey>, secret: Option<SecretKey>) -> Router {
        app_with(Arc::new(InMemoryIdentityProvider::new(signing_key)), secret)
    }

    fn app_with(provider: Arc<InMemoryIdentityProvider>, secret: Option<SecretKey>) -> Router {
        ApiServer::new(
            VerificationEngine::new(FallbackPolicy::permissive()),
            CredentialIssuer::new(provider, Duration::from_secs(5)),
            secret,
            vec!["https://miniapp.example.com".into()],
        )
        .router()
    }

    fn post_json(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/getCustomToken")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_valid_init_data_gets_token() {
        let (status, body) =
            send(app(Some(test_key()), Some(secret())), post_json(json!({"initData": VECTOR_PAYLOAD})))
                .await;

        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap();
        assert_eq!(decode_claims(token).uid, "12345");
    }

    #[tokio::test]
    async fn test_fixture_init_data_gets_token() {
        let (status, body) = send(
            app(Some(test_key()), Some(secret())),
            post_json(json!({"initData": "mock_init_data_for_42"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(decode_claims(body["token"].as_str().unwrap()).uid, "42");
    }

    #[tokio::test]
    async fn test_missing_init_data_uses_fallback_identity() {
        let (status, body) =
            send(app(Some(test_key()), Some(secret())), post_json(json!({}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            decode_claims(body["token"].as_str().unwrap()).uid,
            Identity::anonymous().subject()
        );
    }

    #[tokio::test]
    async fn test_null_init_data_uses_fallback_identity() {
        let (status, body) =
            send(app(Some(test_key()), Some(secret())), post_json(json!({"initData": null}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            decode_claims(body["token"].as_str().unwrap()).uid,
            Identity::anonymous().subject()
        );
    }

    #[tokio::test]
    async fn test_non_string_init_data_is_bad_request() {
        for init_data in [json!(12345), json!({"user": 1}), json!(["mock_init_data_for_42"])] {
            // Minting is denied, so any issued credential would create a user.
            let provider = Arc::new(InMemoryIdentityProvider::new(None));
            let (status, body) = send(
                app_with(provider.clone(), Some(secret())),
                post_json(json!({ "initData": init_data.clone() })),
            )
            .await;

            assert_eq!(status, StatusCode::BAD_REQUEST, "initData {}", init_data);
            assert_eq!(body["error"], "Invalid request body");
            assert!(body.get("token").is_none());
            assert!(body.get("user").is_none());
            assert_eq!(provider.user_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_unparseable_body_is_bad_request() {
        let garbage = Request::builder()
            .method("POST")
            .uri("/getCustomToken")
            .header("content-type", "application/json")
            .body(Body::from("garbage"))
            .unwrap();
        let untyped = Request::builder()
            .method("POST")
            .uri("/getCustomToken")
            .body(Body::from(r#"{"initData":"mock_init_data_for_42"}"#))
            .unwrap();

        for request in [garbage, untyped] {
            let provider = Arc::new(InMemoryIdentityProvider::new(None));
            let (status, body) = send(app_with(provider.clone(), Some(secret())), request).await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "Invalid request body");
            assert!(body.get("token").is_none());
            assert_eq!(provider.user_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_bad_signature_is_unauthorized() {
        let tampered = VECTOR_PAYLOAD.replace("query_id=AAA", "query_id=AAB");
        let (status, body) = send(
            app(Some(test_key()), Some(secret())),
            post_json(json!({"initData": tampered})),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"error": "Invalid initData", "details": "signature mismatch"}));
    }

    #[tokio::test]
    async fn test_missing_secret_is_server_error() {
        let (status, body) = send(
            app(Some(test_key()), None),
            post_json(json!({"initData": "mock_init_data_for_42"})),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "Server mis-configuration."}));
    }

    #[tokio::test]
    async fn test_denied_minting_returns_user() {
        let (status, body) =
            send(app(None, Some(secret())), post_json(json!({"initData": VECTOR_PAYLOAD}))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "success": true,
                "user": {"uid": "12345", "displayName": "Telegram User 12345", "disabled": false},
                "message": "User authenticated via Telegram"
            })
        );
    }

    #[tokio::test]
    async fn test_get_is_not_allowed() {
        let request = Request::builder().uri("/getCustomToken").body(Body::empty()).unwrap();
        let response = app(None, Some(secret())).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let preflight = |origin: &str| {
            Request::builder()
                .method("OPTIONS")
                .uri("/getCustomToken")
                .header("origin", origin)
                .header("access-control-request-method", "POST")
                .body(Body::empty())
                .unwrap()
        };

        let allowed = app(None, Some(secret()))
            .oneshot(preflight("https://miniapp.example.com"))
            .await
            .unwrap();
        assert!(allowed.status().is_success());
        assert_eq!(
            allowed.headers()["access-control-allow-origin"],
            "https://miniapp.example.com"
        );

        let local = app(None, Some(secret()))
            .oneshot(preflight("http://localhost:5173"))
            .await
            .unwrap();
        assert_eq!(local.headers()["access-control-allow-origin"], "http://localhost:5173");

        let foreign = app(None, Some(secret()))
            .oneshot(preflight("https://evil.example.net"))
            .await
            .unwrap();
        assert!(foreign.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
        let response = app(None, None).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_is_localhost() {
        assert!(is_localhost("http://localhost:3000"));
        assert!(is_localhost("https://127.0.0.1"));
        assert!(!is_localhost("https://localhost.evil.com"));
        assert!(!is_localhost("https://example.com"));
    }
}
