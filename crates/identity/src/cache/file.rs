// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed caches: one JSON file per entry, named by the SHA-1 of the
//! entry's lookup key, written atomically with owner-only permissions.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sha1::{Digest, Sha1};
use tokio::io::AsyncWriteExt;

use super::{
    decode, registration_shape, sts_shape, token_shape, SsoCache, SsoClientRegistration,
    SsoToken, StsCache, StsCredential,
};
use crate::error::{ErrorCode, IdentityError, Result};
use crate::profile::SsoSession;

/// Path of the cache file for `key` inside `dir`.
pub fn cache_file(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.json", hex::encode(Sha1::digest(key.as_bytes()))))
}

/// Lookup key of a client registration: the tool name plus the session's
/// region and start URL.
pub fn registration_key(client_name: &str, session: &SsoSession) -> String {
    serde_json::json!({
        "region": session.settings.sso_region,
        "startUrl": session.settings.sso_start_url,
        "tool": client_name,
    })
    .to_string()
}

async fn read_json(path: &Path) -> Option<Value> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::debug!(path = %path.display(), err = %e, "unreadable cache entry");
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::debug!(path = %path.display(), err = %e, "malformed cache entry");
            None
        }
    }
}

/// Write `value` to `path` atomically (write tmp + rename).
///
/// The temp name carries PID + counter so concurrent writers never share a
/// partially written file.
async fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let write_err = |e: std::io::Error| {
        IdentityError::new(ErrorCode::CannotWriteCache, format!("Cannot write {}.", path.display()))
            .with_source(e)
    };

    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            IdentityError::new(
                ErrorCode::CannotCreateCache,
                format!("Cannot create cache directory {}.", dir.display()),
            )
            .with_source(e)
        })?;
    }

    let json = serde_json::to_vec_pretty(value).map_err(|e| {
        IdentityError::new(ErrorCode::CannotWriteCache, "Cannot serialize cache entry.").with_source(e)
    })?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(&tmp_path).await.map_err(write_err)?;
    file.write_all(&json).await.map_err(write_err)?;
    file.flush().await.map_err(write_err)?;
    drop(file);

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }
    Ok(())
}

async fn remove_file(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(IdentityError::new(
            ErrorCode::CannotWriteCache,
            format!("Cannot remove {}.", path.display()),
        )
        .with_source(e)),
    }
}

/// SSO registrations and tokens under one directory (usually `~/.aws/sso/cache`).
pub struct FileSsoCache {
    dir: PathBuf,
}

impl FileSsoCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SsoCache for FileSsoCache {
    async fn get_sso_client_registration(
        &self,
        client_name: &str,
        session: &SsoSession,
    ) -> Result<Option<SsoClientRegistration>> {
        let path = cache_file(&self.dir, &registration_key(client_name, session));
        Ok(read_json(&path).await.and_then(|v| decode(v, &registration_shape())))
    }

    async fn set_sso_client_registration(
        &self,
        client_name: &str,
        session: &SsoSession,
        registration: &SsoClientRegistration,
    ) -> Result<()> {
        let path = cache_file(&self.dir, &registration_key(client_name, session));
        write_json(&path, registration).await
    }

    async fn get_sso_token(
        &self,
        _client_name: &str,
        session: &SsoSession,
    ) -> Result<Option<SsoToken>> {
        let path = cache_file(&self.dir, &session.name);
        Ok(read_json(&path).await.and_then(|v| decode(v, &token_shape())))
    }

    async fn set_sso_token(
        &self,
        _client_name: &str,
        session: &SsoSession,
        token: &SsoToken,
    ) -> Result<()> {
        write_json(&cache_file(&self.dir, &session.name), token).await
    }

    async fn remove_sso_token(&self, session_name: &str) -> Result<()> {
        if session_name.trim().is_empty() {
            return IdentityError::fail(ErrorCode::InvalidSsoSession, "SSO session name is required.");
        }
        remove_file(&cache_file(&self.dir, session_name)).await
    }
}

/// STS credentials under one directory, keyed by profile name.
pub struct FileStsCache {
    dir: PathBuf,
}

impl FileStsCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, id: &str) -> Result<PathBuf> {
        if id.trim().is_empty() {
            return IdentityError::fail(ErrorCode::InvalidProfile, "Profile name is required.");
        }
        Ok(cache_file(&self.dir, id))
    }
}

#[async_trait]
impl StsCache for FileStsCache {
    async fn get_sts_credential(&self, id: &str) -> Result<Option<StsCredential>> {
        let Ok(path) = self.path(id) else {
            return Ok(None);
        };
        Ok(read_json(&path).await.and_then(|v| decode(v, &sts_shape())))
    }

    async fn set_sts_credential(&self, id: &str, credential: &StsCredential) -> Result<()> {
        write_json(&self.path(id)?, credential).await
    }

    async fn remove_sts_credential(&self, id: &str) -> Result<()> {
        remove_file(&self.path(id)?).await
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
