// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;

use super::{Cli, Command};
use crate::sso::AuthorizationFlowKind;

fn parse(args: &[&str]) -> Cli {
    Cli::parse_from(args)
}

#[test]
fn derived_paths_live_under_aws_dir() -> anyhow::Result<()> {
    let cli = parse(&["aws-identity", "--aws-dir", "/tmp/aws", "logout-sso", "corp"]);
    cli.config.validate()?;
    assert_eq!(cli.config.config_path()?, PathBuf::from("/tmp/aws/config"));
    assert_eq!(cli.config.credentials_path()?, PathBuf::from("/tmp/aws/credentials"));
    assert_eq!(cli.config.sso_cache_dir()?, PathBuf::from("/tmp/aws/sso/cache"));
    assert_eq!(cli.config.sts_cache_dir()?, PathBuf::from("/tmp/aws/sts/cache"));
    assert_eq!(cli.config.client_name, "aws-identity");
    Ok(())
}

#[test]
fn explicit_files_override_aws_dir() -> anyhow::Result<()> {
    let cli = parse(&[
        "aws-identity",
        "--aws-dir",
        "/tmp/aws",
        "--config-file",
        "/etc/aws/config",
        "--credentials-file",
        "/etc/aws/creds",
        "logout-sts",
        "dev",
    ]);
    assert_eq!(cli.config.config_path()?, PathBuf::from("/etc/aws/config"));
    assert_eq!(cli.config.credentials_path()?, PathBuf::from("/etc/aws/creds"));
    assert!(matches!(cli.command, Command::LogoutSts { ref profile } if profile == "dev"));
    Ok(())
}

#[yare::parameterized(
    bad_format = { &["aws-identity", "--log-format", "xml", "logout-sso", "corp"] as &[&str] },
    blank_client = { &["aws-identity", "--client-name", " ", "logout-sso", "corp"] as &[&str] },
)]
fn invalid_config(args: &[&str]) {
    assert!(parse(args).config.validate().is_err());
}

#[test]
fn sso_token_flags() {
    let cli = parse(&["aws-identity", "sso-token", "--profile", "dev-sso", "--flow", "device-code", "--no-login"]);
    match cli.command {
        Command::SsoToken { profile, builder_id, flow, no_login, .. } => {
            assert_eq!(profile.as_deref(), Some("dev-sso"));
            assert!(!builder_id);
            assert_eq!(flow, AuthorizationFlowKind::DeviceCode);
            assert!(no_login);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn builder_id_scopes_split_on_commas() {
    let cli = parse(&["aws-identity", "sso-token", "--builder-id", "--scopes", "a:b,c:d"]);
    match cli.command {
        Command::SsoToken { builder_id, scopes, flow, .. } => {
            assert!(builder_id);
            assert_eq!(scopes, vec!["a:b", "c:d"]);
            assert_eq!(flow, AuthorizationFlowKind::Pkce);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[yare::parameterized(
    neither = { &["aws-identity", "sso-token"] as &[&str] },
    both = { &["aws-identity", "sso-token", "--profile", "p", "--builder-id"] as &[&str] },
)]
fn sso_token_needs_exactly_one_source(args: &[&str]) {
    assert!(Cli::try_parse_from(args).is_err());
}
