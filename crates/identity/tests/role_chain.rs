// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Role-chain resolution against real shared config files and the on-disk
//! STS cache, with STS itself faked.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use aws_identity::cache::file::FileStsCache;
use aws_identity::cache::StsCache;
use aws_identity::error::ErrorCode;
use aws_identity::events::IdentityEvent;
use aws_identity::iam::IamCredentialOptions;
use aws_identity::profile::shared_config::SharedConfigProfileStore;
use aws_identity::service::{Collaborators, IdentityService};
use aws_identity::test_support::{FakeHost, FakeOidc, FakeSts, MemorySsoCache};

const CONFIG: &str = "\
[profile base]
role_arn = arn:aws:iam::123456789012:role/Base
source_profile = intermediate

[profile intermediate]
role_arn = arn:aws:iam::123456789012:role/Intermediate
source_profile = iam-creds
region = us-west-2
";

const CREDENTIALS: &str = "\
[iam-creds]
aws_access_key_id = AKIALEAF
aws_secret_access_key = leaf-secret
";

fn service(dir: &Path, sts: Arc<FakeSts>) -> anyhow::Result<IdentityService> {
    std::fs::write(dir.join("config"), CONFIG)?;
    std::fs::write(dir.join("credentials"), CREDENTIALS)?;
    Ok(IdentityService::new(
        "aws-identity",
        Collaborators {
            profiles: Arc::new(SharedConfigProfileStore::new(dir.join("config"), dir.join("credentials"))),
            sso_cache: Arc::new(MemorySsoCache::default()),
            sts_cache: Arc::new(FileStsCache::new(dir.join("sts/cache"))),
            oidc: Arc::new(FakeOidc::new()),
            sts,
            host: Arc::new(FakeHost::default()),
        },
    ))
}

#[tokio::test]
async fn three_profile_chain_resolves_through_two_assume_role_calls() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let sts = Arc::new(FakeSts::default());
    let service = service(dir.path(), sts.clone())?;

    let creds = service.get_iam_credential("base", &IamCredentialOptions::default()).await?;
    assert_eq!(creds.access_key_id, "ASIA2");

    let calls = sts.assume_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].parent_access_key_id, "AKIALEAF");
    assert_eq!(calls[0].request.role_arn, "arn:aws:iam::123456789012:role/Intermediate");
    assert_eq!(calls[0].region, "us-west-2");
    assert_eq!(calls[1].parent_access_key_id, "ASIA1");
    assert_eq!(calls[1].request.role_arn, "arn:aws:iam::123456789012:role/Base");
    assert_eq!(calls[1].region, "us-east-1");

    let on_disk = FileStsCache::new(dir.path().join("sts/cache"));
    let cached = on_disk.get_sts_credential("base").await?;
    assert_eq!(cached.map(|c| c.credentials.access_key_id), Some("ASIA2".to_owned()));
    assert!(service.sts_watcher().is_watching("base"));
    assert!(service.sts_watcher().is_watching("intermediate"));

    // Served from the cache the second time.
    let again = service.get_iam_credential("base", &IamCredentialOptions::default()).await?;
    assert_eq!(again.access_key_id, "ASIA2");
    assert_eq!(sts.assume_calls().len(), 2);
    Ok(())
}

#[tokio::test]
async fn mfa_requirement_without_serial_fails_before_assume_role() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let sts = Arc::new(FakeSts::default());
    sts.mfa_required.store(true, Ordering::Relaxed);
    let service = service(dir.path(), sts.clone())?;
    let mut events = service.subscribe();

    let err = service.get_iam_credential("intermediate", &IamCredentialOptions::default()).await.err();
    assert_eq!(err.map(|e| e.code()), Some(ErrorCode::MfaRequired));
    assert!(sts.assume_calls().is_empty());
    assert_eq!(sts.simulate_calls.load(Ordering::Relaxed), 1);
    assert!(!service.sts_watcher().is_watching("intermediate"));

    match events.try_recv() {
        Ok(IdentityEvent::Metric(metric)) => {
            let code = metric.error_data.map(|e| e.error_code);
            assert_eq!(code.as_deref(), Some("E_MFA_REQUIRED"));
        }
        other => panic!("expected metric, got {other:?}"),
    }
    Ok(())
}
