// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser and device authorization flows producing [`SsoToken`]s.

pub mod device_code;
pub mod pkce;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::cache::{SsoClientRegistration, SsoToken};
use crate::error::{ErrorCode, IdentityError, Result};
use crate::host::HostUi;
use crate::oidc::{CreateTokenResponse, OidcClient};
use crate::profile::{SsoSession, SsoSessionSettings};

/// Reserved session name of the AWS Builder ID login.
pub const BUILDER_ID_SESSION_NAME: &str = "__aws_builder_id__";
pub const BUILDER_ID_START_URL: &str = "https://view.awsapps.com/start";
pub const BUILDER_ID_REGION: &str = "us-east-1";

/// Redirect URI registered for the authorization-code grant. Loopback
/// redirects may use any port.
pub const REGISTERED_REDIRECT_URI: &str = "http://127.0.0.1/oauth/callback";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum AuthorizationFlowKind {
    #[default]
    Pkce,
    DeviceCode,
}

/// The session used for AWS Builder ID logins with the given scopes.
pub fn builder_id_session(scopes: &[String]) -> SsoSession {
    SsoSession {
        name: BUILDER_ID_SESSION_NAME.to_owned(),
        settings: SsoSessionSettings {
            sso_region: BUILDER_ID_REGION.to_owned(),
            sso_start_url: BUILDER_ID_START_URL.to_owned(),
            sso_registration_scopes: scopes.to_vec(),
        },
    }
}

/// Inputs shared by both authorization flows.
pub struct SsoFlowParams<'a> {
    pub client_name: &'a str,
    pub registration: &'a SsoClientRegistration,
    pub session: &'a SsoSession,
    pub oidc: &'a dyn OidcClient,
    pub host: &'a dyn HostUi,
    pub cancel: &'a CancellationToken,
}

impl SsoFlowParams<'_> {
    /// Validate the registration and session before any network call.
    pub fn validate(&self) -> Result<()> {
        if self.client_name.trim().is_empty() {
            return IdentityError::fail(ErrorCode::InvalidSsoClient, "Client name is required.");
        }
        validate_registration(self.registration)?;
        self.session.validate()
    }
}

/// Fail with `E_INVALID_SSO_CLIENT` unless the registration is complete.
pub fn validate_registration(registration: &SsoClientRegistration) -> Result<()> {
    if registration.client_id.trim().is_empty() {
        return IdentityError::fail(ErrorCode::InvalidSsoClient, "Client ID is required.");
    }
    if registration.client_secret.trim().is_empty() {
        return IdentityError::fail(ErrorCode::InvalidSsoClient, "Client secret is required.");
    }
    Ok(())
}

fn expires_at(response: &CreateTokenResponse, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    response
        .expires_in
        .and_then(Duration::try_seconds)
        .map(|d| now + d)
        .ok_or_else(|| {
            IdentityError::new(ErrorCode::CannotCreateSsoToken, "Token response has no expiry.")
        })
}

impl SsoToken {
    /// Build a token from a successful token exchange.
    pub fn from_create_token(
        response: &CreateTokenResponse,
        registration: &SsoClientRegistration,
        session: &SsoSession,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let access_token = response
            .access_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                IdentityError::new(ErrorCode::CannotCreateSsoToken, "Token response has no access token.")
            })?;
        Ok(Self {
            access_token,
            refresh_token: response.refresh_token.clone(),
            client_id: Some(registration.client_id.clone()),
            client_secret: Some(registration.client_secret.clone()),
            expires_at: expires_at(response, now)?,
            registration_expires_at: Some(registration.expires_at),
            region: Some(session.settings.sso_region.clone()),
            start_url: Some(session.settings.sso_start_url.clone()),
        })
    }

    /// Merge a refresh-token grant result in place. Region and start URL are
    /// kept; a response without a new refresh token keeps the old one.
    pub fn apply_refresh(
        &mut self,
        response: &CreateTokenResponse,
        registration: &SsoClientRegistration,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let access_token = response.access_token.clone().filter(|t| !t.is_empty()).ok_or_else(|| {
            IdentityError::new(ErrorCode::CannotRefreshSsoToken, "Token response has no access token.")
        })?;
        self.expires_at = expires_at(response, now)
            .map_err(|e| IdentityError::new(ErrorCode::CannotRefreshSsoToken, e.message()))?;
        self.access_token = access_token;
        if let Some(refresh) = &response.refresh_token {
            self.refresh_token = Some(refresh.clone());
        }
        self.client_id = Some(registration.client_id.clone());
        self.client_secret = Some(registration.client_secret.clone());
        self.registration_expires_at = Some(registration.expires_at);
        Ok(())
    }
}

/// Fail with `E_CANCELLED` once `cancel` has fired.
pub(crate) fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return IdentityError::fail(ErrorCode::Cancelled, "Login was cancelled.");
    }
    Ok(())
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
