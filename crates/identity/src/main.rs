// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::error;

use aws_identity::config::{Cli, Command, IdentityConfig};
use aws_identity::host::TerminalHost;
use aws_identity::iam::IamCredentialOptions;
use aws_identity::service::{IdentityService, SsoTokenOptions, SsoTokenSource};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    init_tracing(&cli.config);

    if let Err(e) = run(cli).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(config: &IdentityConfig) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    // stdout carries command output.
    match config.log_format.as_str() {
        "json" => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).json().init();
        }
        _ => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let service = cli.config.build_service(Arc::new(TerminalHost))?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let output = execute(&service, cli.command, &cancel).await;
    service.dispose();
    println!("{}", serde_json::to_string_pretty(&output?)?);
    Ok(())
}

async fn execute(
    service: &IdentityService,
    command: Command,
    cancel: &CancellationToken,
) -> anyhow::Result<serde_json::Value> {
    match command {
        Command::Credentials { profile, no_sts, mfa_code } => {
            let options = IamCredentialOptions {
                call_sts_on_invalid_credential: !no_sts,
                mfa_code,
                cancel: cancel.clone(),
            };
            let creds = service.get_iam_credential(&profile, &options).await?;
            Ok(json!({
                "Version": 1,
                "AccessKeyId": creds.access_key_id,
                "SecretAccessKey": creds.secret_access_key,
                "SessionToken": creds.session_token,
                "Expiration": creds.expiration,
            }))
        }
        Command::SsoToken { profile, builder_id: _, scopes, flow, no_login } => {
            let source = match profile {
                Some(profile_name) => SsoTokenSource::IamIdentityCenter { profile_name },
                None => SsoTokenSource::AwsBuilderId { scopes },
            };
            let options = SsoTokenOptions { login_on_invalid_token: !no_login, authorization_flow: flow };
            let token = service.get_sso_token(&source, options, cancel).await?;
            Ok(serde_json::to_value(token)?)
        }
        Command::LogoutSso { session } => {
            service.invalidate_sso_token(&session).await?;
            Ok(json!({ "loggedOut": session }))
        }
        Command::LogoutSts { profile } => {
            service.invalidate_sts_credential(&profile).await?;
            Ok(json!({ "loggedOut": profile }))
        }
    }
}
