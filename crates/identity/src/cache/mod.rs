// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cached entities and the store contracts over them.

pub mod file;
pub mod refreshing;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::profile::SsoSession;
use crate::shape::{ShapeValidator, UnmatchedFields};

/// OIDC public-client identity issued to this tool for one SSO session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SsoClientRegistration {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub scopes: Vec<String>,
}

impl SsoClientRegistration {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SsoToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_url: Option<String>,
}

impl SsoToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Access keys, static or issued by STS.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IamCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for IamCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IamCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("expiration", &self.expiration)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssumedRoleUser {
    pub arn: String,
    pub assumed_role_id: String,
}

/// Result of a role assumption, stored as one flat record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StsCredential {
    #[serde(flatten)]
    pub credentials: IamCredentials,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assumed_role_user: Option<AssumedRoleUser>,
}

impl StsCredential {
    /// Credentials without an expiration never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.credentials.expiration.is_some_and(|e| now >= e)
    }
}

/// Store for SSO client registrations and tokens.
///
/// Reads never fail for missing or malformed entries; they return `None`.
#[async_trait]
pub trait SsoCache: Send + Sync {
    async fn get_sso_client_registration(
        &self,
        client_name: &str,
        session: &SsoSession,
    ) -> Result<Option<SsoClientRegistration>>;

    async fn set_sso_client_registration(
        &self,
        client_name: &str,
        session: &SsoSession,
        registration: &SsoClientRegistration,
    ) -> Result<()>;

    async fn get_sso_token(&self, client_name: &str, session: &SsoSession)
        -> Result<Option<SsoToken>>;

    async fn set_sso_token(
        &self,
        client_name: &str,
        session: &SsoSession,
        token: &SsoToken,
    ) -> Result<()>;

    async fn remove_sso_token(&self, session_name: &str) -> Result<()>;
}

/// Store for STS credentials keyed by profile name.
#[async_trait]
pub trait StsCache: Send + Sync {
    async fn get_sts_credential(&self, id: &str) -> Result<Option<StsCredential>>;

    async fn set_sts_credential(&self, id: &str, credential: &StsCredential) -> Result<()>;

    async fn remove_sts_credential(&self, id: &str) -> Result<()>;
}

pub(crate) fn registration_shape() -> ShapeValidator {
    ShapeValidator::new()
        .require("clientId")
        .require("clientSecret")
        .require("expiresAt")
        .require("scopes")
        .optional("issuedAt")
}

pub(crate) fn token_shape() -> ShapeValidator {
    ShapeValidator::new()
        .require("accessToken")
        .require("expiresAt")
        .optional("refreshToken")
        .optional("clientId")
        .optional("clientSecret")
        .optional("registrationExpiresAt")
        .optional("region")
        .optional("startUrl")
}

pub(crate) fn sts_shape() -> ShapeValidator {
    ShapeValidator::new()
        .require("accessKeyId")
        .require("secretAccessKey")
        .optional("sessionToken")
        .optional("expiration")
        .optional("assumedRoleUser")
}

/// Accept `value` only if it passes `shape` and decodes strictly into `T`.
pub(crate) fn decode<T: DeserializeOwned>(value: Value, shape: &ShapeValidator) -> Option<T> {
    if !shape.evaluate(Some(&value), UnmatchedFields::Optional) {
        return None;
    }
    serde_json::from_value(value).ok()
}
