// src/storage/identity_toolkit.rs
//! Identity Toolkit REST client.
//!
//! Talks to the identity platform's `accounts` API for user records and mints
//! custom tokens locally with the service-account key.
//!
//! # Error classification
//! The API answers failures with `{"error": {"code", "message", "status"}}`.
//! They are mapped onto [`ProviderError`] by HTTP status, the `status` string
//! and well-known message codes, never by free-text matching.

use crate::models::credential::UserRecord;
use crate::models::error::ProviderError;
use crate::storage::identity_provider::IdentityProvider;
use crate::wallet::key_management::ServiceAccountKey;
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Production endpoint of the Identity Toolkit API.
pub const DEFAULT_BASE_URL: &str = "https://identitytoolkit.googleapis.com";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    local_id: [&'a str; 1],
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<AccountInfo>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest<'a> {
    local_id: &'a str,
    display_name: &'a str,
    disabled: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountInfo {
    local_id: String,
    display_name: Option<String>,
    #[serde(default)]
    disabled: bool,
}

impl From<AccountInfo> for UserRecord {
    fn from(info: AccountInfo) -> Self {
        UserRecord {
            uid: info.local_id,
            display_name: info.display_name,
            disabled: info.disabled,
        }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// REST-backed identity provider.
#[derive(Clone, Debug)]
pub struct IdentityToolkitProvider {
    http: Client,
    /// Base URL, e.g. `https://identitytoolkit.googleapis.com` or an emulator
    base_url: String,
    project_id: String,
    /// Bearer token sent with every API call
    access_token: String,
    /// Key for custom tokens; `None` means minting is denied
    signing_key: Option<ServiceAccountKey>,
}

impl IdentityToolkitProvider {
    /// Creates a client for `project_id` at `base_url`.
    ///
    /// # Arguments
    /// * `base_url` - API root without trailing slash
    /// * `project_id` - Identity platform project
    /// * `access_token` - OAuth bearer token for the API (`owner` on the emulator)
    /// * `signing_key` - Service-account key used to mint custom tokens
    pub fn new(
        base_url: &str,
        project_id: &str,
        access_token: &str,
        signing_key: Option<ServiceAccountKey>,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            access_token: access_token.to_string(),
            signing_key,
        }
    }

    fn accounts_url(&self, method: &str) -> String {
        format!("{}/v1/projects/{}/{}", self.base_url, self.project_id, method)
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<R, ProviderError> {
        debug!("POST {}", url);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &body));
        }

        response.json::<R>().await.map_err(|e| ProviderError::Api {
            status: status.as_u16(),
            message: format!("unexpected response body: {}", e),
        })
    }
}

#[async_trait]
impl IdentityProvider for IdentityToolkitProvider {
    async fn create_custom_token(&self, subject: &str) -> Result<String, ProviderError> {
        match &self.signing_key {
            Some(key) => key.mint_custom_token(subject),
            None => Err(ProviderError::PermissionDenied(
                "credentials cannot sign blobs (iam.serviceAccounts.signBlob)".into(),
            )),
        }
    }

    async fn get_user(&self, uid: &str) -> Result<UserRecord, ProviderError> {
        let response: LookupResponse = self
            .post(&self.accounts_url("accounts:lookup"), &LookupRequest { local_id: [uid] })
            .await?;

        response
            .users
            .into_iter()
            .next()
            .map(UserRecord::from)
            .ok_or_else(|| ProviderError::UserNotFound(uid.to_string()))
    }

    async fn create_user(
        &self,
        uid: &str,
        display_name: &str,
    ) -> Result<UserRecord, ProviderError> {
        let request = CreateRequest { local_id: uid, display_name, disabled: false };
        let _: serde_json::Value = self.post(&self.accounts_url("accounts"), &request).await?;

        Ok(UserRecord::enabled(uid, display_name))
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Transport(e.to_string())
    }
}

/// Maps an API error response onto a [`ProviderError`].
fn classify_error(status: StatusCode, body: &str) -> ProviderError {
    let (message, api_status) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => (envelope.error.message, envelope.error.status),
        Err(_) => (body.to_string(), String::new()),
    };

    // codes may carry a detail suffix, e.g. "USER_NOT_FOUND : no such user"
    let code = message.split(|c: char| c == ' ' || c == ':').next().unwrap_or_default();

    if status == StatusCode::FORBIDDEN || api_status == "PERMISSION_DENIED" {
        ProviderError::PermissionDenied(message)
    } else if code == "USER_NOT_FOUND" {
        ProviderError::UserNotFound(message)
    } else if code == "DUPLICATE_LOCAL_ID" || code == "UID_ALREADY_EXISTS" {
        ProviderError::UserExists(message)
    } else {
        ProviderError::Api { status: status.as_u16(), message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::key_management::tests::{decode_claims, test_key};
    use mockito::{mock, server_url, Matcher};
    use serde_json::json;

    fn provider(project: &str) -> IdentityToolkitProvider {
        IdentityToolkitProvider::new(&server_url(), project, "owner", None)
    }

    #[test]
    fn test_classify_permission_errors() {
        let forbidden = classify_error(StatusCode::FORBIDDEN, "denied");
        assert_eq!(forbidden, ProviderError::PermissionDenied("denied".into()));

        let by_status = classify_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"code":400,"message":"INSUFFICIENT_PERMISSION","status":"PERMISSION_DENIED"}}"#,
        );
        assert!(matches!(by_status, ProviderError::PermissionDenied(_)));
    }

    #[test]
    fn test_classify_user_errors() {
        let not_found = classify_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"code":400,"message":"USER_NOT_FOUND"}}"#,
        );
        assert!(matches!(not_found, ProviderError::UserNotFound(_)));

        let exists = classify_error(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"code":400,"message":"DUPLICATE_LOCAL_ID : uid taken"}}"#,
        );
        assert!(matches!(exists, ProviderError::UserExists(_)));
    }

    #[test]
    fn test_permission_word_in_message_is_not_a_denial() {
        let err = classify_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error":{"code":500,"message":"Permission cache unavailable","status":"INTERNAL"}}"#,
        );
        assert_eq!(
            err,
            ProviderError::Api { status: 500, message: "Permission cache unavailable".into() }
        );
    }

    #[tokio::test]
    async fn test_get_user_found() {
        let _m = mock("POST", "/v1/projects/lookup-found/accounts:lookup")
            .match_header("authorization", "Bearer owner")
            .match_body(Matcher::Json(json!({"localId": ["12345"]})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"kind":"identitytoolkit#GetAccountInfoResponse","users":[{"localId":"12345","displayName":"Telegram User 12345","disabled":false}]}"#,
            )
            .create();

        let record = provider("lookup-found").get_user("12345").await.unwrap();
        assert_eq!(record, UserRecord::provisioned("12345"));
    }

    #[tokio::test]
    async fn test_get_user_missing() {
        let _m = mock("POST", "/v1/projects/lookup-missing/accounts:lookup")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"kind":"identitytoolkit#GetAccountInfoResponse"}"#)
            .create();

        assert_eq!(
            provider("lookup-missing").get_user("777").await,
            Err(ProviderError::UserNotFound("777".into()))
        );
    }

    #[tokio::test]
    async fn test_create_user() {
        let m = mock("POST", "/v1/projects/create-ok/accounts")
            .match_body(Matcher::Json(json!({
                "localId": "42",
                "displayName": "Telegram User 42",
                "disabled": false
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"kind":"identitytoolkit#SignupNewUserResponse","localId":"42"}"#)
            .expect(1)
            .create();

        let record = provider("create-ok").create_user("42", "Telegram User 42").await.unwrap();
        assert_eq!(record, UserRecord::provisioned("42"));
        m.assert();
    }

    #[tokio::test]
    async fn test_create_duplicate_user() {
        let _m = mock("POST", "/v1/projects/create-dup/accounts")
            .with_status(400)
            .with_body(r#"{"error":{"code":400,"message":"DUPLICATE_LOCAL_ID","status":"INVALID_ARGUMENT"}}"#)
            .create();

        assert!(matches!(
            provider("create-dup").create_user("42", "Telegram User 42").await,
            Err(ProviderError::UserExists(_))
        ));
    }

    #[tokio::test]
    async fn test_server_error_is_api_error() {
        let _m = mock("POST", "/v1/projects/server-error/accounts:lookup")
            .with_status(503)
            .with_body("upstream unavailable")
            .create();

        assert_eq!(
            provider("server-error").get_user("1").await,
            Err(ProviderError::Api { status: 503, message: "upstream unavailable".into() })
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let provider = IdentityToolkitProvider::new("http://127.0.0.1:1", "demo", "owner", None);
        assert!(matches!(provider.get_user("1").await, Err(ProviderError::Transport(_))));
    }

    #[tokio::test]
    async fn test_custom_token_needs_signing_key() {
        assert!(matches!(
            provider("no-key").create_custom_token("42").await,
            Err(ProviderError::PermissionDenied(_))
        ));

        let with_key =
            IdentityToolkitProvider::new(&server_url(), "with-key", "owner", Some(test_key()));
        let token = with_key.create_custom_token("42").await.unwrap();
        assert_eq!(decode_claims(&token).uid, "42");
    }
}
