// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolve a profile to IAM credentials, following `source_profile` chains
//! through STS role assumption.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::cache::refreshing::RefreshingStsCache;
use crate::cache::{IamCredentials, StsCache, StsCredential};
use crate::error::{ErrorCode, IdentityError, Result};
use crate::host::HostUi;
use crate::profile::{
    Profile, ProfileData, ProfileKind, ProfileStore, ACCESS_KEY_ID, MFA_SERIAL, REGION, ROLE_ARN,
    SECRET_ACCESS_KEY, SESSION_TOKEN, SOURCE_PROFILE,
};
use crate::refresher::{AutoRefresher, Renewal};
use crate::sts::{to_iam_arn, AssumeRoleRequest, MfaToken, StsService, DEFAULT_REGION, MFA_CONTEXT_KEY};

/// Maximum number of `source_profile` references followed from the
/// requested profile.
pub const MAX_CHAIN_LENGTH: usize = 5;

/// How long the user has to enter an MFA code.
pub const MFA_TIMEOUT: Duration = Duration::from_secs(2 * 60);

const ASSUME_ROLE_ACTION: &str = "sts:AssumeRole";

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone)]
pub struct IamCredentialOptions {
    /// Assume the role when no usable credential is cached.
    pub call_sts_on_invalid_credential: bool,
    /// MFA code supplied up front; skips the host prompt.
    pub mfa_code: Option<String>,
    /// Aborts a pending MFA prompt.
    pub cancel: CancellationToken,
}

impl Default for IamCredentialOptions {
    fn default() -> Self {
        Self { call_sts_on_invalid_credential: true, mfa_code: None, cancel: CancellationToken::new() }
    }
}

/// State for one top-level resolution. Nothing here outlives the call.
struct Resolution<'a> {
    data: &'a ProfileData,
    options: &'a IamCredentialOptions,
    /// Background renewals must never prompt.
    interactive: bool,
}

pub struct IamProvider {
    me: Weak<IamProvider>,
    profiles: Arc<dyn ProfileStore>,
    cache: Arc<RefreshingStsCache>,
    sts: Arc<dyn StsService>,
    host: Arc<dyn HostUi>,
    watcher: Arc<AutoRefresher<StsCredential>>,
}

impl IamProvider {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        cache: Arc<RefreshingStsCache>,
        sts: Arc<dyn StsService>,
        host: Arc<dyn HostUi>,
        watcher: Arc<AutoRefresher<StsCredential>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self { me: me.clone(), profiles, cache, sts, host, watcher })
    }

    pub fn watcher(&self) -> &Arc<AutoRefresher<StsCredential>> {
        &self.watcher
    }

    /// Credentials for `profile`. Chained profiles are resolved against the
    /// store's current contents.
    pub async fn get_credential(
        &self,
        profile: &Profile,
        options: &IamCredentialOptions,
    ) -> Result<IamCredentials> {
        let data = self.profiles.load().await?;
        let resolution = Resolution { data: &data, options, interactive: true };
        self.resolve(profile, &resolution, vec![profile.name.clone()]).await
    }

    /// `chain` holds every profile name visited so far, `profile` last.
    fn resolve<'a>(
        &'a self,
        profile: &'a Profile,
        resolution: &'a Resolution<'a>,
        chain: Vec<String>,
    ) -> BoxFuture<'a, Result<IamCredentials>> {
        Box::pin(async move {
            match profile.kind {
                ProfileKind::IamCredentials => static_credentials(profile),
                ProfileKind::IamSourceProfile => self.role_credentials(profile, resolution, chain).await,
                ProfileKind::SsoToken | ProfileKind::Unknown => IdentityError::fail(
                    ErrorCode::InvalidProfile,
                    "credentials could not be found for provided profile kind.",
                ),
            }
        })
    }

    async fn role_credentials(
        &self,
        profile: &Profile,
        resolution: &Resolution<'_>,
        chain: Vec<String>,
    ) -> Result<IamCredentials> {
        let mfa_bound = profile.setting(MFA_SERIAL).is_some();

        if let Some(cached) = self.cached(&profile.name).await? {
            tracing::debug!(profile = %profile.name, "using cached STS credential");
            if !mfa_bound {
                self.watch(&profile.name).await;
            }
            return Ok(cached.credentials);
        }
        if !resolution.options.call_sts_on_invalid_credential {
            return IdentityError::fail(ErrorCode::InvalidStsCredential, "STS credential not found.");
        }

        let (credential, used_mfa) = self.assume(profile, resolution, chain).await?;
        self.cache.set_sts_credential(&profile.name, &credential).await.map_err(|e| {
            IdentityError::wrap(e, ErrorCode::CannotWriteCache, "Cannot cache STS credential.")
        })?;
        if !used_mfa {
            self.watch(&profile.name).await;
        }
        Ok(credential.credentials)
    }

    /// A cached credential that has not expired.
    async fn cached(&self, profile_name: &str) -> Result<Option<StsCredential>> {
        match self.cache.get_sts_credential(profile_name).await {
            Err(e) if e.code() == ErrorCode::StsCredentialExpired => {
                tracing::debug!(profile = %profile_name, "cached STS credential expired");
                Ok(None)
            }
            other => other,
        }
    }

    /// Assume the profile's role with its parent's credentials. The flag is
    /// true when an MFA code was sent.
    async fn assume(
        &self,
        profile: &Profile,
        resolution: &Resolution<'_>,
        chain: Vec<String>,
    ) -> Result<(StsCredential, bool)> {
        let role_arn = profile.setting(ROLE_ARN).ok_or_else(|| {
            IdentityError::new(ErrorCode::InvalidProfile, format!("Profile {} has no role_arn.", profile.name))
        })?;
        let region = profile.setting(REGION).unwrap_or(DEFAULT_REGION);
        let parent = self.parent_credentials(profile, resolution, chain).await?;

        let mut request = AssumeRoleRequest::new(role_arn);
        if self.requires_mfa(&parent, region).await? {
            let Some(serial) = profile.setting(MFA_SERIAL) else {
                return IdentityError::fail(ErrorCode::MfaRequired, "MFA serial required");
            };
            let token_code = self.mfa_code(profile, serial, resolution).await?;
            request.mfa = Some(MfaToken { serial_number: serial.to_owned(), token_code });
        }

        tracing::info!(profile = %profile.name, region, "assuming role");
        let credential = self.sts.assume_role(&parent, region, &request).await.map_err(|e| {
            IdentityError::wrap(e, ErrorCode::CannotCreateStsCredential, "Failed to assume role.")
        })?;
        Ok((credential, request.mfa.is_some()))
    }

    async fn parent_credentials(
        &self,
        profile: &Profile,
        resolution: &Resolution<'_>,
        mut chain: Vec<String>,
    ) -> Result<IamCredentials> {
        let Some(source_name) = profile.setting(SOURCE_PROFILE) else {
            return IdentityError::fail(
                ErrorCode::InvalidProfile,
                format!("Profile {} has no source_profile.", profile.name),
            );
        };
        if chain.len() > MAX_CHAIN_LENGTH || chain.iter().any(|n| n == source_name) {
            return IdentityError::fail(
                ErrorCode::InvalidProfile,
                "Source profile chain exceeded max length.",
            );
        }
        let Some(source) = resolution.data.profile(source_name) else {
            return IdentityError::fail(
                ErrorCode::ProfileNotFound,
                format!("Source profile {source_name} not found."),
            );
        };
        chain.push(source.name.clone());
        self.resolve(source, resolution, chain).await
    }

    /// Ask IAM whether assuming a role with `parent` needs MFA.
    async fn requires_mfa(&self, parent: &IamCredentials, region: &str) -> Result<bool> {
        let caller = self.sts.get_caller_identity_arn(parent, region).await?;
        let results = self
            .sts
            .simulate_principal_policy(parent, region, &to_iam_arn(&caller), &[ASSUME_ROLE_ACTION])
            .await?;
        Ok(results
            .iter()
            .any(|r| r.missing_context_values.iter().any(|v| v == MFA_CONTEXT_KEY)))
    }

    async fn mfa_code(&self, profile: &Profile, serial: &str, resolution: &Resolution<'_>) -> Result<String> {
        if let Some(code) = resolution.options.mfa_code.as_deref().filter(|c| !c.trim().is_empty()) {
            return Ok(code.trim().to_owned());
        }
        if !resolution.interactive {
            return IdentityError::fail(ErrorCode::MfaRequired, "MFA required.");
        }
        let answer = tokio::select! {
            answer = tokio::time::timeout(MFA_TIMEOUT, self.host.get_mfa_code(serial, &profile.name)) => answer,
            _ = resolution.options.cancel.cancelled() => {
                return IdentityError::fail(ErrorCode::Cancelled, "MFA prompt cancelled.");
            }
        };
        match answer {
            Ok(Ok(Some(code))) if !code.trim().is_empty() => Ok(code.trim().to_owned()),
            Ok(Err(e)) => Err(e),
            Ok(_) | Err(_) => IdentityError::fail(ErrorCode::MfaRequired, "MFA required."),
        }
    }

    /// Arm the background refresh for `profile_name`. Failures are logged.
    async fn watch(&self, profile_name: &str) {
        let renewal = Arc::new(StsRenewal { provider: self.me.clone(), profile_name: profile_name.to_owned() });
        if let Err(e) = self.watcher.watch(profile_name, renewal).await {
            tracing::warn!(profile = %profile_name, err = %e, "cannot watch STS credential");
        }
    }
}

fn static_credentials(profile: &Profile) -> Result<IamCredentials> {
    let (Some(access_key_id), Some(secret_access_key)) =
        (profile.setting(ACCESS_KEY_ID), profile.setting(SECRET_ACCESS_KEY))
    else {
        return IdentityError::fail(
            ErrorCode::InvalidProfile,
            format!("Profile {} has incomplete access keys.", profile.name),
        );
    };
    Ok(IamCredentials {
        access_key_id: access_key_id.to_owned(),
        secret_access_key: secret_access_key.to_owned(),
        session_token: profile.setting(SESSION_TOKEN).map(String::from),
        expiration: None,
    })
}

/// Re-assumes a watched profile's role without user interaction.
struct StsRenewal {
    provider: Weak<IamProvider>,
    profile_name: String,
}

impl StsRenewal {
    fn provider(&self) -> Result<Arc<IamProvider>> {
        self.provider
            .upgrade()
            .ok_or_else(|| IdentityError::new(ErrorCode::Cancelled, "Credential provider was disposed."))
    }
}

#[async_trait]
impl Renewal<StsCredential> for StsRenewal {
    async fn current(&self) -> Result<Option<StsCredential>> {
        self.provider()?.cache.inner().get_sts_credential(&self.profile_name).await
    }

    async fn renew(&self) -> Result<StsCredential> {
        let provider = self.provider()?;
        let data = provider.profiles.load().await?;
        let Some(profile) = data.profile(&self.profile_name) else {
            return IdentityError::fail(
                ErrorCode::ProfileNotFound,
                format!("Profile {} not found.", self.profile_name),
            );
        };
        let options = IamCredentialOptions::default();
        let resolution = Resolution { data: &data, options: &options, interactive: false };
        let (credential, _) = provider
            .assume(profile, &resolution, vec![profile.name.clone()])
            .await
            .map_err(|e| match e.code() {
                ErrorCode::CannotCreateStsCredential => e.with_code(ErrorCode::CannotRefreshStsCredential),
                _ => e,
            })?;
        Ok(credential)
    }

    async fn persist(&self, value: &StsCredential) -> Result<()> {
        self.provider()?.cache.set_sts_credential(&self.profile_name, value).await
    }
}

#[cfg(test)]
#[path = "iam_tests.rs"]
mod tests;
