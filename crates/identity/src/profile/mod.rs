// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Profile and SSO session records supplied by a [`ProfileStore`].

pub mod shared_config;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorCode, IdentityError, Result};
use crate::shape::{ShapeValidator, UnmatchedFields};

pub const ROLE_ARN: &str = "role_arn";
pub const SOURCE_PROFILE: &str = "source_profile";
pub const MFA_SERIAL: &str = "mfa_serial";
pub const REGION: &str = "region";
pub const SSO_SESSION: &str = "sso_session";
pub const ACCESS_KEY_ID: &str = "aws_access_key_id";
pub const SECRET_ACCESS_KEY: &str = "aws_secret_access_key";
pub const SESSION_TOKEN: &str = "aws_session_token";

pub type Settings = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileKind {
    /// Static access keys.
    IamCredentials,
    /// Role assumed with the credentials of another profile.
    IamSourceProfile,
    /// Bearer token from an IAM Identity Center session.
    SsoToken,
    Unknown,
}

fn source_profile_shape() -> ShapeValidator {
    ShapeValidator::new()
        .require(ROLE_ARN)
        .require(SOURCE_PROFILE)
        .optional("external_id")
        .optional("role_session_name")
        .optional(REGION)
        .optional(MFA_SERIAL)
        .disallow("credential_source")
}

fn sso_token_shape() -> ShapeValidator {
    ShapeValidator::new()
        .require(SSO_SESSION)
        .optional(REGION)
        .disallow("sso_account_id")
        .disallow("sso_role_name")
}

fn iam_credentials_shape() -> ShapeValidator {
    ShapeValidator::new()
        .require(ACCESS_KEY_ID)
        .require(SECRET_ACCESS_KEY)
        .optional(SESSION_TOKEN)
}

impl ProfileKind {
    /// Classify a profile by the settings it carries. Role assumption wins
    /// over static keys when both are present.
    pub fn classify(settings: &Settings) -> Self {
        let value = settings_value(settings);
        let matches = |shape: &ShapeValidator| shape.evaluate(Some(&value), UnmatchedFields::Optional);
        if matches(&source_profile_shape()) {
            Self::IamSourceProfile
        } else if matches(&sso_token_shape()) {
            Self::SsoToken
        } else if matches(&iam_credentials_shape()) {
            Self::IamCredentials
        } else {
            Self::Unknown
        }
    }
}

fn settings_value(settings: &Settings) -> Value {
    Value::Object(
        settings
            .iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub kind: ProfileKind,
    pub settings: Settings,
}

impl Profile {
    pub fn new(name: impl Into<String>, settings: Settings) -> Self {
        let kind = ProfileKind::classify(&settings);
        Self { name: name.into(), kind, settings }
    }

    /// A setting value, treating blank values as unset.
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsoSessionSettings {
    pub sso_region: String,
    pub sso_start_url: String,
    #[serde(default)]
    pub sso_registration_scopes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsoSession {
    pub name: String,
    pub settings: SsoSessionSettings,
}

impl SsoSession {
    /// Fail with `E_INVALID_SSO_SESSION` unless name, region and start URL
    /// are all set.
    pub fn validate(&self) -> Result<()> {
        let missing = [
            ("name", &self.name),
            ("sso_region", &self.settings.sso_region),
            ("sso_start_url", &self.settings.sso_start_url),
        ]
        .into_iter()
        .find(|(_, v)| v.trim().is_empty());
        match missing {
            Some((field, _)) => IdentityError::fail(
                ErrorCode::InvalidSsoSession,
                format!("SSO session {field} is required."),
            ),
            None => Ok(()),
        }
    }
}

/// Everything a [`ProfileStore`] knows about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileData {
    pub profiles: Vec<Profile>,
    pub sso_sessions: Vec<SsoSession>,
}

impl ProfileData {
    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    pub fn sso_session(&self, name: &str) -> Option<&SsoSession> {
        self.sso_sessions.iter().find(|s| s.name == name)
    }
}

/// Source of profile and SSO session records.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn load(&self) -> Result<ProfileData>;
}

/// Split a comma-separated setting into trimmed, de-duplicated, sorted values.
pub fn normalize_setting_list(list: &str) -> Vec<String> {
    let mut values: Vec<String> = list
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect();
    values.sort();
    values.dedup();
    values
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
