// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only [`ProfileStore`] over the shared AWS `config` and `credentials`
//! INI files.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use aws_config::profile::profile_file::{ProfileFileKind, ProfileFiles};
use aws_config::profile::ProfileSet;
use aws_types::os_shim_internal::{Env, Fs};

use super::{
    normalize_setting_list, Profile, ProfileData, ProfileStore, Settings, SsoSession,
    SsoSessionSettings, ACCESS_KEY_ID, MFA_SERIAL, REGION, ROLE_ARN, SECRET_ACCESS_KEY,
    SESSION_TOKEN, SOURCE_PROFILE, SSO_SESSION,
};
use crate::error::{ErrorCode, IdentityError, Result};

/// Profile keys carried into [`Settings`].
const PROFILE_KEYS: &[&str] = &[
    ACCESS_KEY_ID,
    SECRET_ACCESS_KEY,
    SESSION_TOKEN,
    ROLE_ARN,
    SOURCE_PROFILE,
    MFA_SERIAL,
    REGION,
    SSO_SESSION,
    "credential_source",
    "external_id",
    "role_session_name",
    "duration_seconds",
    "sso_account_id",
    "sso_role_name",
    "sso_region",
    "sso_start_url",
];

pub struct SharedConfigProfileStore {
    config_path: PathBuf,
    credentials_path: PathBuf,
}

impl SharedConfigProfileStore {
    pub fn new(config_path: impl Into<PathBuf>, credentials_path: impl Into<PathBuf>) -> Self {
        Self { config_path: config_path.into(), credentials_path: credentials_path.into() }
    }
}

#[async_trait]
impl ProfileStore for SharedConfigProfileStore {
    /// Parse both files with the SDK profile loader. Credentials-file keys
    /// take precedence over config-file keys.
    async fn load(&self) -> Result<ProfileData> {
        let mut builder = ProfileFiles::builder();
        let mut any = false;
        for (kind, path) in [
            (ProfileFileKind::Config, &self.config_path),
            (ProfileFileKind::Credentials, &self.credentials_path),
        ] {
            if exists(path).await? {
                builder = builder.with_file(kind, path.clone());
                any = true;
            }
        }
        if !any {
            return Ok(ProfileData::default());
        }

        let set = aws_config::profile::load(
            &Fs::real(),
            &Env::real(),
            &builder.build(),
            Some(Cow::Borrowed("default")),
        )
        .await
        .map_err(|e| IdentityError::new(ErrorCode::InvalidProfile, "Cannot load shared config.").with_source(e))?;
        Ok(profile_data(&set))
    }
}

async fn exists(path: &Path) -> Result<bool> {
    tokio::fs::try_exists(path).await.map_err(|e| {
        IdentityError::new(ErrorCode::InvalidProfile, format!("Cannot read {}.", path.display()))
            .with_source(e)
    })
}

/// Map a parsed profile set onto profiles and the SSO sessions they name.
pub fn profile_data(set: &ProfileSet) -> ProfileData {
    let mut profiles: BTreeMap<String, Settings> = BTreeMap::new();
    for name in set.profiles() {
        let Some(profile) = set.get_profile(name) else {
            continue;
        };
        let settings = PROFILE_KEYS
            .iter()
            .filter_map(|key| profile.get(key).map(|v| ((*key).to_owned(), v.to_owned())))
            .collect();
        profiles.insert(name.to_owned(), settings);
    }

    let session_names: BTreeSet<&str> =
        profiles.values().filter_map(|s| s.get(SSO_SESSION)).map(String::as_str).collect();
    let sso_sessions = session_names
        .into_iter()
        .filter_map(|name| {
            let Some(section) = set.sso_session(name) else {
                tracing::debug!(session = %name, "sso-session section not found");
                return None;
            };
            Some(SsoSession {
                name: name.to_owned(),
                settings: SsoSessionSettings {
                    sso_region: section.get("sso_region").unwrap_or_default().to_owned(),
                    sso_start_url: section.get("sso_start_url").unwrap_or_default().to_owned(),
                    sso_registration_scopes: section
                        .get("sso_registration_scopes")
                        .map(normalize_setting_list)
                        .unwrap_or_default(),
                },
            })
        })
        .collect();

    ProfileData {
        profiles: profiles.into_iter().map(|(name, settings)| Profile::new(name, settings)).collect(),
        sso_sessions,
    }
}

#[cfg(test)]
#[path = "shared_config_tests.rs"]
mod tests;
