// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operations exposed to the hosting tool: tokens, credentials, logout.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cache::refreshing::{RefreshingSsoCache, RefreshingStsCache};
use crate::cache::{IamCredentials, SsoCache, SsoToken, StsCache, StsCredential};
use crate::error::{ErrorCode, IdentityError, Result};
use crate::events::{self, EventSender, IdentityEvent, MetricEvent, MetricResult, ResourceKind};
use crate::host::HostUi;
use crate::iam::{IamCredentialOptions, IamProvider};
use crate::oidc::OidcClient;
use crate::profile::{ProfileKind, ProfileStore, SsoSession, SSO_SESSION};
use crate::refresher::{AutoRefresher, Renewal};
use crate::schedule::RefreshScheduler;
use crate::sso::{builder_id_session, device_code, pkce, AuthorizationFlowKind, SsoFlowParams};
use crate::sts::StsService;

const EVENT_CAPACITY: usize = 256;

/// Where an SSO token comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SsoTokenSource {
    /// A profile whose `sso_session` names an IAM Identity Center session.
    IamIdentityCenter { profile_name: String },
    /// AWS Builder ID with the given scopes.
    AwsBuilderId { scopes: Vec<String> },
}

impl SsoTokenSource {
    fn label(&self) -> &'static str {
        match self {
            Self::IamIdentityCenter { .. } => "IamIdentityCenter",
            Self::AwsBuilderId { .. } => "AwsBuilderId",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SsoTokenOptions {
    /// Run a login flow when no usable token is cached.
    pub login_on_invalid_token: bool,
    pub authorization_flow: AuthorizationFlowKind,
}

impl Default for SsoTokenOptions {
    fn default() -> Self {
        Self { login_on_invalid_token: true, authorization_flow: AuthorizationFlowKind::Pkce }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SsoTokenResult {
    /// The SSO session name the token is cached under.
    pub id: String,
    pub access_token: String,
}

/// External services and stores the engine is wired to.
pub struct Collaborators {
    pub profiles: Arc<dyn ProfileStore>,
    pub sso_cache: Arc<dyn SsoCache>,
    pub sts_cache: Arc<dyn StsCache>,
    pub oidc: Arc<dyn OidcClient>,
    pub sts: Arc<dyn StsService>,
    pub host: Arc<dyn HostUi>,
}

pub struct IdentityService {
    client_name: String,
    profiles: Arc<dyn ProfileStore>,
    sso_cache: Arc<RefreshingSsoCache>,
    sts_cache: Arc<RefreshingStsCache>,
    oidc: Arc<dyn OidcClient>,
    host: Arc<dyn HostUi>,
    iam: Arc<IamProvider>,
    sso_watcher: Arc<AutoRefresher<SsoToken>>,
    events: EventSender,
}

impl IdentityService {
    /// `client_name` identifies this tool in SSO client registrations.
    pub fn new(client_name: impl Into<String>, parts: Collaborators) -> Self {
        let (events, _) = events::channel(EVENT_CAPACITY);
        let sso_cache = Arc::new(RefreshingSsoCache::new(parts.sso_cache, parts.oidc.clone(), events.clone()));
        let sts_cache = Arc::new(RefreshingStsCache::new(parts.sts_cache));
        let sso_watcher = AutoRefresher::new(ResourceKind::SsoToken, RefreshScheduler::default(), events.clone());
        let sts_watcher =
            AutoRefresher::new(ResourceKind::StsCredential, RefreshScheduler::default(), events.clone());
        let iam = IamProvider::new(
            parts.profiles.clone(),
            sts_cache.clone(),
            parts.sts,
            parts.host.clone(),
            sts_watcher,
        );
        Self {
            client_name: client_name.into(),
            profiles: parts.profiles,
            sso_cache,
            sts_cache,
            oidc: parts.oidc,
            host: parts.host,
            iam,
            sso_watcher,
            events,
        }
    }

    /// Change notifications and metrics from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<IdentityEvent> {
        self.events.subscribe()
    }

    pub fn sso_watcher(&self) -> &Arc<AutoRefresher<SsoToken>> {
        &self.sso_watcher
    }

    pub fn sts_watcher(&self) -> &Arc<AutoRefresher<StsCredential>> {
        self.iam.watcher()
    }

    /// A valid access token for `source`, logging in if allowed and needed.
    pub async fn get_sso_token(
        &self,
        source: &SsoTokenSource,
        options: SsoTokenOptions,
        cancel: &CancellationToken,
    ) -> Result<SsoTokenResult> {
        let started = Instant::now();
        let mut data = BTreeMap::new();
        data.insert("source".to_owned(), serde_json::Value::from(source.label()));
        data.insert(
            "authorizationFlow".to_owned(),
            serde_json::to_value(options.authorization_flow).unwrap_or_default(),
        );

        let result = self.sso_token(source, options, cancel, &mut data).await;
        self.record("aws_identity_getSsoToken", started, data, &result);
        result
    }

    async fn sso_token(
        &self,
        source: &SsoTokenSource,
        options: SsoTokenOptions,
        cancel: &CancellationToken,
        data: &mut BTreeMap<String, serde_json::Value>,
    ) -> Result<SsoTokenResult> {
        let session = self.resolve_session(source).await?;
        data.insert("ssoRegion".to_owned(), session.settings.sso_region.clone().into());
        data.insert("startUrl".to_owned(), session.settings.sso_start_url.clone().into());

        let token = match self.sso_cache.get_sso_token(&self.client_name, &session).await {
            Ok(Some(token)) => token,
            read => {
                if !options.login_on_invalid_token {
                    read?;
                    return IdentityError::fail(ErrorCode::InvalidSsoToken, "SSO token not found.");
                }
                if let Err(e) = read {
                    tracing::warn!(session = %session.name, err = %e, "cannot read SSO token; logging in");
                }
                self.login(&session, options.authorization_flow, cancel).await?
            }
        };

        self.watch_sso_token(&session).await;
        Ok(SsoTokenResult { id: session.name, access_token: token.access_token })
    }

    async fn resolve_session(&self, source: &SsoTokenSource) -> Result<SsoSession> {
        let profile_name = match source {
            SsoTokenSource::AwsBuilderId { scopes } => return Ok(builder_id_session(scopes)),
            SsoTokenSource::IamIdentityCenter { profile_name } => profile_name,
        };
        let data = self.profiles.load().await?;
        let profile = data.profile(profile_name).ok_or_else(|| {
            IdentityError::new(ErrorCode::ProfileNotFound, format!("Profile {profile_name} not found."))
        })?;
        if profile.kind != ProfileKind::SsoToken {
            return IdentityError::fail(
                ErrorCode::InvalidProfile,
                format!("Profile {profile_name} is not an IAM Identity Center profile."),
            );
        }
        let session_name = profile.setting(SSO_SESSION).unwrap_or_default();
        let session = data.sso_session(session_name).cloned().ok_or_else(|| {
            IdentityError::new(ErrorCode::InvalidSsoSession, format!("SSO session {session_name} not found."))
        })?;
        session.validate()?;
        Ok(session)
    }

    async fn login(
        &self,
        session: &SsoSession,
        flow: AuthorizationFlowKind,
        cancel: &CancellationToken,
    ) -> Result<SsoToken> {
        let registration = self
            .sso_cache
            .get_sso_client_registration(&self.client_name, session)
            .await?
            .ok_or_else(|| IdentityError::new(ErrorCode::InvalidSsoClient, "No client registration."))?;

        tracing::info!(session = %session.name, ?flow, "starting SSO login");
        let params = SsoFlowParams {
            client_name: &self.client_name,
            registration: &registration,
            session,
            oidc: self.oidc.as_ref(),
            host: self.host.as_ref(),
            cancel,
        };
        let token = match flow {
            AuthorizationFlowKind::Pkce => pkce::authorization_code_pkce_flow(&params).await,
            AuthorizationFlowKind::DeviceCode => device_code::device_code_flow(&params).await,
        }
        .map_err(|e| IdentityError::wrap(e, ErrorCode::CannotCreateSsoToken, "Cannot create SSO token."))?;

        self.sso_cache.set_sso_token(&self.client_name, session, &token).await.map_err(|e| {
            IdentityError::wrap(e, ErrorCode::CannotWriteCache, "Cannot cache SSO token.")
        })?;
        Ok(token)
    }

    async fn watch_sso_token(&self, session: &SsoSession) {
        let renewal = Arc::new(SsoRenewal {
            cache: self.sso_cache.clone(),
            client_name: self.client_name.clone(),
            session: session.clone(),
        });
        if let Err(e) = self.sso_watcher.watch(&session.name, renewal).await {
            tracing::warn!(session = %session.name, err = %e, "cannot watch SSO token");
        }
    }

    /// Credentials for the named profile.
    pub async fn get_iam_credential(
        &self,
        profile_name: &str,
        options: &IamCredentialOptions,
    ) -> Result<IamCredentials> {
        let started = Instant::now();
        let mut data = BTreeMap::new();
        let result: Result<IamCredentials> = async {
            let profiles = self.profiles.load().await?;
            let profile = profiles.profile(profile_name).ok_or_else(|| {
                IdentityError::new(ErrorCode::ProfileNotFound, format!("Profile {profile_name} not found."))
            })?;
            data.insert("profileKind".to_owned(), serde_json::to_value(profile.kind).unwrap_or_default());
            self.iam.get_credential(profile, options).await
        }
        .await;
        self.record("aws_identity_getIamCredential", started, data, &result);
        result
    }

    /// Stop refreshing and delete the cached token for SSO session `id`.
    pub async fn invalidate_sso_token(&self, id: &str) -> Result<()> {
        let started = Instant::now();
        self.sso_watcher.unwatch(id);
        let result = self.sso_cache.remove_sso_token(id).await;
        self.record("aws_identity_invalidateSsoToken", started, BTreeMap::new(), &result);
        result
    }

    /// Stop refreshing and delete the cached STS credential for profile `id`.
    pub async fn invalidate_sts_credential(&self, id: &str) -> Result<()> {
        let started = Instant::now();
        self.iam.watcher().unwatch(id);
        let result = self.sts_cache.remove_sts_credential(id).await;
        self.record("aws_identity_invalidateStsCredential", started, BTreeMap::new(), &result);
        result
    }

    /// Cancel every background refresh.
    pub fn dispose(&self) {
        self.sso_watcher.dispose();
        self.iam.watcher().dispose();
    }

    fn record<T>(
        &self,
        name: &str,
        started: Instant,
        data: BTreeMap<String, serde_json::Value>,
        result: &Result<T>,
    ) {
        let metric = match result {
            Ok(_) => MetricEvent::new(name, MetricResult::Succeeded, started.elapsed()),
            Err(e) if e.code() == ErrorCode::Cancelled => {
                MetricEvent::new(name, MetricResult::Cancelled, started.elapsed()).with_error(e)
            }
            Err(e) => {
                tracing::warn!(operation = name, code = %e.code(), err = %e, "operation failed");
                MetricEvent::new(name, MetricResult::Failed, started.elapsed()).with_error(e)
            }
        };
        let metric = data.into_iter().fold(metric, |m, (key, value)| m.with_data(&key, value));
        let _ = self.events.send(IdentityEvent::Metric(metric));
    }
}

impl Drop for IdentityService {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Refreshes a watched session's token through the refresh-token grant.
struct SsoRenewal {
    cache: Arc<RefreshingSsoCache>,
    client_name: String,
    session: SsoSession,
}

#[async_trait]
impl Renewal<SsoToken> for SsoRenewal {
    async fn current(&self) -> Result<Option<SsoToken>> {
        self.cache.inner().get_sso_token(&self.client_name, &self.session).await
    }

    async fn renew(&self) -> Result<SsoToken> {
        let Some(token) = self.current().await? else {
            return IdentityError::fail(ErrorCode::SsoTokenExpired, "SSO token is no longer cached.");
        };
        self.cache.refresh_sso_token(&self.client_name, &self.session, token).await
    }

    async fn persist(&self, value: &SsoToken) -> Result<()> {
        self.cache.inner().set_sso_token(&self.client_name, &self.session, value).await
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
