// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SSO OIDC service client: client registration, device authorization and
//! token exchange.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, IdentityError};

pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";
pub const GRANT_DEVICE_CODE: &str = "urn:ietf:params:oauth:grant-type:device_code";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterClientRequest {
    pub client_name: String,
    pub client_type: String,
    pub scopes: Vec<String>,
    pub grant_types: Vec<String>,
    pub redirect_uris: Vec<String>,
    pub issuer_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterClientResponse {
    pub client_id: String,
    pub client_secret: String,
    /// Epoch seconds.
    #[serde(default)]
    pub client_id_issued_at: Option<i64>,
    /// Epoch seconds.
    #[serde(default)]
    pub client_secret_expires_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartDeviceAuthorizationRequest {
    pub client_id: String,
    pub client_secret: String,
    pub start_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartDeviceAuthorizationResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    /// Seconds until the device code expires.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Seconds between polls.
    #[serde(default)]
    pub interval: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenRequest {
    pub client_id: String,
    pub client_secret: String,
    pub grant_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    /// Seconds until the access token expires.
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Error types reported by the OIDC service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OidcErrorKind {
    AuthorizationPending,
    SlowDown,
    InvalidGrant,
    ExpiredToken,
    AccessDenied,
    InvalidClient,
    /// Any other service error, by its reported type name.
    Service(String),
    /// The request never produced a service response.
    Transport,
}

impl OidcErrorKind {
    /// Decode a service error type, accepting both the exception name
    /// (`SlowDownException`) and the OAuth error code (`slow_down`).
    pub fn from_type_name(name: &str) -> Self {
        let name = name.split(':').next().unwrap_or_default().trim();
        match name {
            "AuthorizationPendingException" | "authorization_pending" => Self::AuthorizationPending,
            "SlowDownException" | "slow_down" => Self::SlowDown,
            "InvalidGrantException" | "invalid_grant" => Self::InvalidGrant,
            "ExpiredTokenException" | "expired_token" => Self::ExpiredToken,
            "AccessDeniedException" | "access_denied" => Self::AccessDenied,
            "InvalidClientException" | "invalid_client" => Self::InvalidClient,
            other => Self::Service(other.to_owned()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct OidcError {
    pub kind: OidcErrorKind,
    pub status: Option<u16>,
    pub message: String,
    #[source]
    source: Option<reqwest::Error>,
}

impl OidcError {
    pub fn new(kind: OidcErrorKind, message: impl Into<String>) -> Self {
        Self { kind, status: None, message: message.into(), source: None }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    fn transport(err: reqwest::Error) -> Self {
        Self {
            kind: OidcErrorKind::Transport,
            status: err.status().map(|s| s.as_u16()),
            message: format!("OIDC request failed: {err}"),
            source: Some(err),
        }
    }

    /// Convert into a coded error, keeping the HTTP status.
    pub fn into_identity(self, code: ErrorCode, message: impl Into<String>) -> IdentityError {
        let status = self.status;
        let err = IdentityError::new(code, message).with_source(self);
        match status {
            Some(s) => err.with_http_status(s),
            None => err,
        }
    }
}

/// SSO OIDC operations the flows and refreshing cache depend on.
#[async_trait]
pub trait OidcClient: Send + Sync {
    async fn register_client(
        &self,
        region: &str,
        request: &RegisterClientRequest,
    ) -> Result<RegisterClientResponse, OidcError>;

    async fn start_device_authorization(
        &self,
        region: &str,
        request: &StartDeviceAuthorizationRequest,
    ) -> Result<StartDeviceAuthorizationResponse, OidcError>;

    async fn create_token(
        &self,
        region: &str,
        request: &CreateTokenRequest,
    ) -> Result<CreateTokenResponse, OidcError>;

    /// Browser authorize endpoint for the authorization-code grant.
    fn authorize_endpoint(&self, region: &str) -> String;
}

/// [`OidcClient`] over the public `oidc.{region}.amazonaws.com` JSON API.
#[derive(Debug, Clone)]
pub struct HttpOidcClient {
    http: reqwest::Client,
    endpoint: Option<String>,
}

impl HttpOidcClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http, endpoint: None }
    }

    /// Send every request to `endpoint` instead of the regional service.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    fn base_url(&self, region: &str) -> String {
        match &self.endpoint {
            Some(e) => e.trim_end_matches('/').to_owned(),
            None => format!("https://oidc.{region}.amazonaws.com"),
        }
    }

    async fn post<Req: Serialize + Sync, Resp: DeserializeOwned + Send>(
        &self,
        region: &str,
        path: &str,
        body: &Req,
    ) -> Result<Resp, OidcError> {
        let url = format!("{}{path}", self.base_url(region));
        let resp = self.http.post(&url).json(body).send().await.map_err(OidcError::transport)?;

        let status = resp.status();
        if status.is_success() {
            return resp.json().await.map_err(OidcError::transport);
        }

        let header_type = resp
            .headers()
            .get("x-amzn-errortype")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let text = resp.text().await.unwrap_or_default();
        let body: serde_json::Value = serde_json::from_str(&text).unwrap_or_default();
        let type_name = header_type
            .or_else(|| body.get("__type").and_then(|v| v.as_str()).map(String::from))
            .or_else(|| body.get("error").and_then(|v| v.as_str()).map(String::from))
            .unwrap_or_default();
        let description = body
            .get("error_description")
            .or_else(|| body.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or(text.as_str());

        tracing::debug!(%url, status = status.as_u16(), error_type = %type_name, "OIDC request failed");
        Err(OidcError::new(
            OidcErrorKind::from_type_name(&type_name),
            format!("{path} failed ({status}): {description}"),
        )
        .with_status(status.as_u16()))
    }
}

#[async_trait]
impl OidcClient for HttpOidcClient {
    async fn register_client(
        &self,
        region: &str,
        request: &RegisterClientRequest,
    ) -> Result<RegisterClientResponse, OidcError> {
        self.post(region, "/client/register", request).await
    }

    async fn start_device_authorization(
        &self,
        region: &str,
        request: &StartDeviceAuthorizationRequest,
    ) -> Result<StartDeviceAuthorizationResponse, OidcError> {
        self.post(region, "/device_authorization", request).await
    }

    async fn create_token(
        &self,
        region: &str,
        request: &CreateTokenRequest,
    ) -> Result<CreateTokenResponse, OidcError> {
        self.post(region, "/token", request).await
    }

    fn authorize_endpoint(&self, region: &str) -> String {
        format!("{}/authorize", self.base_url(region))
    }
}

#[cfg(test)]
#[path = "oidc_tests.rs"]
mod tests;
