// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{Duration, Utc};

use super::{cache_file, registration_key, FileSsoCache, FileStsCache};
use crate::cache::{SsoCache, SsoClientRegistration, StsCache};
use crate::error::ErrorCode;
use crate::test_support::{sso_session, sso_token, sts_credential};

#[test]
fn cache_file_is_sha1_of_key() {
    let dir = std::path::Path::new("/cache");
    assert_eq!(
        cache_file(dir, "corp"),
        dir.join("ee0bfd2552fbd840c02cc48b6e823320543c450f.json")
    );

    let key = registration_key("aws-identity", &sso_session("corp"));
    assert_eq!(
        key,
        r#"{"region":"us-east-1","startUrl":"https://d-123.awsapps.com/start","tool":"aws-identity"}"#
    );
    assert_eq!(
        cache_file(dir, &key),
        dir.join("4a5e4fc5885f40ee6e8cbc85835ba9f8ef7345b8.json")
    );
}

#[tokio::test]
async fn registration_and_token_persist() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let cache = FileSsoCache::new(dir.path());
    let session = sso_session("corp");

    assert_eq!(cache.get_sso_client_registration("tool", &session).await?, None);
    assert_eq!(cache.get_sso_token("tool", &session).await?, None);

    let registration = SsoClientRegistration {
        client_id: "client".into(),
        client_secret: "secret".into(),
        issued_at: None,
        expires_at: Utc::now() + Duration::days(90),
        scopes: vec!["sso:account:access".into()],
    };
    cache.set_sso_client_registration("tool", &session, &registration).await?;
    let token = sso_token(Utc::now() + Duration::hours(1));
    cache.set_sso_token("tool", &session, &token).await?;

    assert_eq!(cache.get_sso_client_registration("tool", &session).await?, Some(registration));
    assert_eq!(cache.get_sso_token("tool", &session).await?, Some(token));

    cache.remove_sso_token("corp").await?;
    assert_eq!(cache.get_sso_token("tool", &session).await?, None);
    Ok(())
}

#[tokio::test]
async fn token_written_by_other_tools_is_readable() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let cache = FileSsoCache::new(dir.path());
    std::fs::write(
        cache_file(dir.path(), "corp"),
        r#"{"startUrl":"https://d-123.awsapps.com/start","region":"us-east-1","accessToken":"tok","expiresAt":"2099-01-01T00:00:00Z"}"#,
    )?;
    let token = cache.get_sso_token("tool", &sso_session("corp")).await?;
    assert_eq!(token.map(|t| t.access_token), Some("tok".to_string()));
    Ok(())
}

#[tokio::test]
async fn invalid_token_reads_as_absent() -> anyhow::Result<()> {
    let cases = [
        "{ not json",
        r#"{"expiresAt":"2099-01-01T00:00:00Z"}"#,
        r#"{"accessToken":"tok","expiresAt":null}"#,
        r#"{"accessToken":"tok","expiresAt":"tomorrow"}"#,
        r#"["accessToken"]"#,
    ];
    let dir = tempfile::tempdir()?;
    let cache = FileSsoCache::new(dir.path());
    for contents in cases {
        std::fs::write(cache_file(dir.path(), "corp"), contents)?;
        let token = cache.get_sso_token("tool", &sso_session("corp")).await?;
        assert_eq!(token, None, "{contents}");
    }
    Ok(())
}

#[tokio::test]
async fn sts_credential_round_trips_flat() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let cache = FileStsCache::new(dir.path());
    let credential = sts_credential(Utc::now() + Duration::hours(1));
    cache.set_sts_credential("dev", &credential).await?;

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(cache_file(dir.path(), "dev"))?)?;
    assert!(raw.get("accessKeyId").is_some());
    assert!(raw.get("credentials").is_none());

    assert_eq!(cache.get_sts_credential("dev").await?, Some(credential));
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn sts_file_is_owner_only() -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir()?;
    let cache = FileStsCache::new(dir.path());
    cache.set_sts_credential("dev", &sts_credential(Utc::now() + Duration::hours(1))).await?;
    let mode = std::fs::metadata(cache_file(dir.path(), "dev"))?.permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
    Ok(())
}

#[tokio::test]
async fn sts_blank_id() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let cache = FileStsCache::new(dir.path());
    assert_eq!(cache.get_sts_credential(" ").await?, None);
    let err = cache.remove_sts_credential(" ").await.err().map(|e| e.code());
    assert_eq!(err, Some(ErrorCode::InvalidProfile));
    cache.remove_sts_credential("never-written").await?;
    Ok(())
}

#[tokio::test]
async fn write_failure_is_an_error_not_a_miss() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "file, not a directory")?;
    let cache = FileStsCache::new(blocker.join("sts"));

    let result =
        cache.set_sts_credential("dev", &sts_credential(Utc::now() + Duration::hours(1))).await;
    let code = result.err().map(|e| e.code());
    assert_eq!(code, Some(ErrorCode::CannotCreateCache));
    Ok(())
}
