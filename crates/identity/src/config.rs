// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgGroup, Args, Parser, Subcommand};

use crate::cache::file::{FileSsoCache, FileStsCache};
use crate::host::HostUi;
use crate::oidc::HttpOidcClient;
use crate::profile::shared_config::SharedConfigProfileStore;
use crate::service::{Collaborators, IdentityService};
use crate::sso::AuthorizationFlowKind;
use crate::sts::AwsStsService;

/// Where the engine keeps its state and how it logs.
#[derive(Debug, Clone, Args)]
pub struct IdentityConfig {
    /// Root of the AWS state directory (default: $HOME/.aws).
    #[arg(long, env = "AWS_IDENTITY_DIR")]
    pub aws_dir: Option<PathBuf>,

    /// Shared config file (default: <aws-dir>/config).
    #[arg(long, env = "AWS_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Shared credentials file (default: <aws-dir>/credentials).
    #[arg(long, env = "AWS_SHARED_CREDENTIALS_FILE")]
    pub credentials_file: Option<PathBuf>,

    /// Client name used when registering with SSO OIDC.
    #[arg(long, env = "AWS_IDENTITY_CLIENT_NAME", default_value = "aws-identity")]
    pub client_name: String,

    /// Log format (json or text).
    #[arg(long, env = "AWS_IDENTITY_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "AWS_IDENTITY_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,
}

impl IdentityConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.client_name.trim().is_empty() {
            anyhow::bail!("--client-name must not be empty");
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        Ok(())
    }

    pub fn aws_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(ref dir) = self.aws_dir {
            return Ok(dir.clone());
        }
        let home = std::env::var_os("HOME").ok_or_else(|| anyhow::anyhow!("HOME is not set; pass --aws-dir"))?;
        Ok(PathBuf::from(home).join(".aws"))
    }

    pub fn config_path(&self) -> anyhow::Result<PathBuf> {
        match self.config_file {
            Some(ref path) => Ok(path.clone()),
            None => Ok(self.aws_dir()?.join("config")),
        }
    }

    pub fn credentials_path(&self) -> anyhow::Result<PathBuf> {
        match self.credentials_file {
            Some(ref path) => Ok(path.clone()),
            None => Ok(self.aws_dir()?.join("credentials")),
        }
    }

    pub fn sso_cache_dir(&self) -> anyhow::Result<PathBuf> {
        Ok(self.aws_dir()?.join("sso").join("cache"))
    }

    pub fn sts_cache_dir(&self) -> anyhow::Result<PathBuf> {
        Ok(self.aws_dir()?.join("sts").join("cache"))
    }

    /// Wire the file caches, shared config files and AWS endpoints together.
    pub fn build_service(&self, host: Arc<dyn HostUi>) -> anyhow::Result<IdentityService> {
        crate::install_crypto_provider();
        let http = reqwest::Client::builder().build()?;
        let parts = Collaborators {
            profiles: Arc::new(SharedConfigProfileStore::new(self.config_path()?, self.credentials_path()?)),
            sso_cache: Arc::new(FileSsoCache::new(self.sso_cache_dir()?)),
            sts_cache: Arc::new(FileStsCache::new(self.sts_cache_dir()?)),
            oidc: Arc::new(HttpOidcClient::new(http)),
            sts: Arc::new(AwsStsService),
            host,
        };
        Ok(IdentityService::new(self.client_name.clone(), parts))
    }
}

/// AWS credential and SSO token helper.
#[derive(Debug, Parser)]
#[command(name = "aws-identity", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub config: IdentityConfig,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print credentials for a profile.
    Credentials {
        profile: String,
        /// Fail instead of calling STS when nothing valid is cached.
        #[arg(long)]
        no_sts: bool,
        /// MFA code to use if the role requires one.
        #[arg(long)]
        mfa_code: Option<String>,
    },
    /// Print an SSO access token.
    #[command(group(ArgGroup::new("source").required(true).args(["profile", "builder_id"])))]
    SsoToken {
        /// IAM Identity Center profile.
        #[arg(long)]
        profile: Option<String>,
        /// Use AWS Builder ID instead of a profile.
        #[arg(long)]
        builder_id: bool,
        /// Scopes requested for a Builder ID login.
        #[arg(long, value_delimiter = ',', default_value = "codewhisperer:completions,codewhisperer:analysis")]
        scopes: Vec<String>,
        #[arg(long, value_enum, default_value_t)]
        flow: AuthorizationFlowKind,
        /// Fail instead of logging in when no valid token is cached.
        #[arg(long)]
        no_login: bool,
    },
    /// Delete the cached token of an SSO session.
    LogoutSso { session: String },
    /// Delete the cached STS credential of a profile.
    LogoutSts { profile: String },
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
