// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cache decorators that renew SSO tokens on read and reject expired STS
//! credentials.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

use super::{SsoCache, SsoClientRegistration, SsoToken, StsCache, StsCredential};
use crate::error::{ErrorCode, IdentityError, Result};
use crate::events::{ChangeKind, EventSender, ResourceKind};
use crate::oidc::{
    CreateTokenRequest, OidcClient, OidcErrorKind, RegisterClientRequest, GRANT_AUTHORIZATION_CODE,
    GRANT_REFRESH_TOKEN,
};
use crate::profile::SsoSession;
use crate::schedule::RefreshScheduler;
use crate::sso::REGISTERED_REDIRECT_URI;

/// [`SsoCache`] that registers clients on demand and refreshes tokens that
/// have entered their refresh window.
pub struct RefreshingSsoCache {
    next: Arc<dyn SsoCache>,
    oidc: Arc<dyn OidcClient>,
    events: EventSender,
    scheduler: RefreshScheduler,
    /// Last refresh attempt per session name.
    last_refresh: parking_lot::Mutex<HashMap<String, Instant>>,
}

impl RefreshingSsoCache {
    pub fn new(next: Arc<dyn SsoCache>, oidc: Arc<dyn OidcClient>, events: EventSender) -> Self {
        Self {
            next,
            oidc,
            events,
            scheduler: RefreshScheduler::default(),
            last_refresh: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// The undecorated cache.
    pub fn inner(&self) -> &Arc<dyn SsoCache> {
        &self.next
    }

    fn cooling_down(&self, session: &str) -> bool {
        self.last_refresh
            .lock()
            .get(session)
            .is_some_and(|at| at.elapsed() < self.scheduler.retry_cooldown)
    }

    /// Exchange `token`'s refresh token for a new access token. The result is
    /// returned, not persisted.
    pub async fn refresh_sso_token(
        &self,
        client_name: &str,
        session: &SsoSession,
        mut token: SsoToken,
    ) -> Result<SsoToken> {
        self.last_refresh.lock().insert(session.name.clone(), Instant::now());

        let Some(refresh_token) = token.refresh_token.clone() else {
            return IdentityError::fail(ErrorCode::CannotRefreshSsoToken, "SSO token has no refresh token.");
        };
        let registration = self.get_sso_client_registration(client_name, session).await?;
        let Some(registration) = registration else {
            return IdentityError::fail(ErrorCode::InvalidSsoClient, "No client registration.");
        };

        tracing::debug!(session = %session.name, "refreshing SSO token");
        let request = CreateTokenRequest {
            client_id: registration.client_id.clone(),
            client_secret: registration.client_secret.clone(),
            grant_type: GRANT_REFRESH_TOKEN.to_owned(),
            refresh_token: Some(refresh_token),
            ..Default::default()
        };
        let response = self
            .oidc
            .create_token(&session.settings.sso_region, &request)
            .await
            .map_err(|e| match e.kind {
                OidcErrorKind::InvalidGrant => {
                    e.into_identity(ErrorCode::SsoTokenExpired, "SSO refresh token is no longer valid.")
                }
                _ => e.into_identity(ErrorCode::CannotRefreshSsoToken, "Cannot refresh SSO token."),
            })?;

        token.apply_refresh(&response, &registration, Utc::now())?;
        Ok(token)
    }

    fn usable_registration(
        registration: Option<SsoClientRegistration>,
        now: DateTime<Utc>,
    ) -> Option<SsoClientRegistration> {
        registration.filter(|r| !r.is_expired(now))
    }
}

#[async_trait]
impl SsoCache for RefreshingSsoCache {
    async fn get_sso_client_registration(
        &self,
        client_name: &str,
        session: &SsoSession,
    ) -> Result<Option<SsoClientRegistration>> {
        let cached = self.next.get_sso_client_registration(client_name, session).await?;
        if let Some(registration) = Self::usable_registration(cached, Utc::now()) {
            return Ok(Some(registration));
        }

        tracing::info!(session = %session.name, "registering SSO client");
        let request = RegisterClientRequest {
            client_name: client_name.to_owned(),
            client_type: "public".to_owned(),
            scopes: session.settings.sso_registration_scopes.clone(),
            grant_types: vec![GRANT_AUTHORIZATION_CODE.to_owned(), GRANT_REFRESH_TOKEN.to_owned()],
            redirect_uris: vec![REGISTERED_REDIRECT_URI.to_owned()],
            issuer_url: session.settings.sso_start_url.clone(),
        };
        let response = self
            .oidc
            .register_client(&session.settings.sso_region, &request)
            .await
            .map_err(|e| e.into_identity(ErrorCode::CannotRegisterClient, "Cannot register SSO client."))?;

        let expires_at = response
            .client_secret_expires_at
            .and_then(|s| DateTime::from_timestamp(s, 0))
            .ok_or_else(|| {
                IdentityError::new(ErrorCode::CannotRegisterClient, "Client registration has no expiry.")
            })?;
        let registration = SsoClientRegistration {
            client_id: response.client_id,
            client_secret: response.client_secret,
            issued_at: response.client_id_issued_at.and_then(|s| DateTime::from_timestamp(s, 0)),
            expires_at,
            scopes: session.settings.sso_registration_scopes.clone(),
        };
        self.next.set_sso_client_registration(client_name, session, &registration).await?;
        Ok(Some(registration))
    }

    async fn set_sso_client_registration(
        &self,
        client_name: &str,
        session: &SsoSession,
        registration: &SsoClientRegistration,
    ) -> Result<()> {
        self.next.set_sso_client_registration(client_name, session, registration).await
    }

    async fn get_sso_token(
        &self,
        client_name: &str,
        session: &SsoSession,
    ) -> Result<Option<SsoToken>> {
        let Some(token) = self.next.get_sso_token(client_name, session).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        if token.is_expired(now) {
            tracing::debug!(session = %session.name, "cached SSO token expired");
            return Ok(None);
        }
        if !self.scheduler.in_refresh_window(token.expires_at, now) {
            return Ok(Some(token));
        }
        if self.cooling_down(&session.name) {
            return Ok(Some(token));
        }
        if token.refresh_token.is_none() {
            tracing::debug!(session = %session.name, "SSO token cannot be refreshed");
            return Ok(None);
        }

        let token = self.refresh_sso_token(client_name, session, token).await?;
        self.next.set_sso_token(client_name, session, &token).await?;
        let _ = self.events.send(ResourceKind::SsoToken.changed(ChangeKind::Refreshed, &session.name));
        tracing::info!(session = %session.name, "SSO token refreshed");
        Ok(Some(token))
    }

    async fn set_sso_token(
        &self,
        client_name: &str,
        session: &SsoSession,
        token: &SsoToken,
    ) -> Result<()> {
        self.next.set_sso_token(client_name, session, token).await
    }

    async fn remove_sso_token(&self, session_name: &str) -> Result<()> {
        self.last_refresh.lock().remove(session_name);
        self.next.remove_sso_token(session_name).await
    }
}

/// [`StsCache`] that fails reads of expired credentials with
/// `E_STS_CREDENTIAL_EXPIRED`; role assumption must be redone by the caller.
pub struct RefreshingStsCache {
    next: Arc<dyn StsCache>,
}

impl RefreshingStsCache {
    pub fn new(next: Arc<dyn StsCache>) -> Self {
        Self { next }
    }

    /// The undecorated cache.
    pub fn inner(&self) -> &Arc<dyn StsCache> {
        &self.next
    }
}

#[async_trait]
impl StsCache for RefreshingStsCache {
    async fn get_sts_credential(&self, id: &str) -> Result<Option<StsCredential>> {
        match self.next.get_sts_credential(id).await? {
            Some(credential) if credential.is_expired(Utc::now()) => {
                IdentityError::fail(ErrorCode::StsCredentialExpired, "STS credential has expired.")
            }
            other => Ok(other),
        }
    }

    async fn set_sts_credential(&self, id: &str, credential: &StsCredential) -> Result<()> {
        self.next.set_sts_credential(id, credential).await
    }

    async fn remove_sts_credential(&self, id: &str) -> Result<()> {
        self.next.remove_sts_credential(id).await
    }
}

#[cfg(test)]
#[path = "refreshing_tests.rs"]
mod tests;
