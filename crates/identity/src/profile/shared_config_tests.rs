// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use super::SharedConfigProfileStore;
use crate::profile::{ProfileData, ProfileKind, ProfileStore};

const CONFIG: &str = "\
[default]
region = us-west-2

# role chained through base
[profile dev]
role_arn = arn:aws:iam::123456789012:role/dev
source_profile = base
s3 =
  max_concurrent_requests = 20

[profile codecatalyst]
sso_session = corp

[sso-session corp]
sso_region = us-east-1
sso_start_url = https://d-123.awsapps.com/start
sso_registration_scopes = sso:account:access, codewhisperer:completions
";

const CREDENTIALS: &str = "\
[base]
aws_access_key_id = AKIAEXAMPLE
aws_secret_access_key = secret

; overrides config region
[default]
region = eu-west-1
";

async fn load(dir: &Path, config: &str, credentials: &str) -> anyhow::Result<ProfileData> {
    std::fs::write(dir.join("config"), config)?;
    std::fs::write(dir.join("credentials"), credentials)?;
    let store = SharedConfigProfileStore::new(dir.join("config"), dir.join("credentials"));
    Ok(store.load().await?)
}

#[tokio::test]
async fn parses_profiles_and_sessions() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let data = load(dir.path(), CONFIG, CREDENTIALS).await?;

    let kinds: Vec<(&str, ProfileKind)> =
        data.profiles.iter().map(|p| (p.name.as_str(), p.kind)).collect();
    assert_eq!(
        kinds,
        vec![
            ("base", ProfileKind::IamCredentials),
            ("codecatalyst", ProfileKind::SsoToken),
            ("default", ProfileKind::Unknown),
            ("dev", ProfileKind::IamSourceProfile),
        ]
    );

    let dev = data.profile("dev");
    assert_eq!(dev.and_then(|p| p.setting("source_profile")), Some("base"));
    assert_eq!(dev.and_then(|p| p.setting("max_concurrent_requests")), None);

    let default = data.profile("default");
    assert_eq!(default.and_then(|p| p.setting("region")), Some("eu-west-1"));

    let corp = data.sso_session("corp");
    assert_eq!(corp.map(|s| s.settings.sso_region.as_str()), Some("us-east-1"));
    assert_eq!(
        corp.map(|s| s.settings.sso_registration_scopes.clone()),
        Some(vec!["codewhisperer:completions".to_string(), "sso:account:access".to_string()])
    );
    Ok(())
}

#[tokio::test]
async fn inline_comments_are_stripped_from_values() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = "\
[profile default]
region = us-west-2 # prod region

[profile dev]
role_arn = arn:aws:iam::123456789012:role/dev ; chained
source_profile = base
";
    let data = load(dir.path(), config, "").await?;

    assert_eq!(data.profile("default").and_then(|p| p.setting("region")), Some("us-west-2"));
    assert_eq!(
        data.profile("dev").and_then(|p| p.setting("role_arn")),
        Some("arn:aws:iam::123456789012:role/dev")
    );
    Ok(())
}

#[tokio::test]
async fn sessions_without_a_section_are_skipped() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let data = load(dir.path(), "[profile orphan]\nsso_session = missing\n", "").await?;
    assert_eq!(data.profile("orphan").map(|p| p.kind), Some(ProfileKind::SsoToken));
    assert!(data.sso_session("missing").is_none());
    Ok(())
}

#[tokio::test]
async fn missing_files_load_empty() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = SharedConfigProfileStore::new(dir.path().join("config"), dir.path().join("credentials"));
    let data = store.load().await?;
    assert!(data.profiles.is_empty());
    assert!(data.sso_sessions.is_empty());
    Ok(())
}
