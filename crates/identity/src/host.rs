// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capabilities the engine needs from the hosting tool's UI.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::{ErrorCode, IdentityError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRequest {
    pub message: String,
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    InProgress,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub title: String,
    pub state: ProgressState,
    pub message: Option<String>,
}

#[async_trait]
pub trait HostUi: Send + Sync {
    /// Open `url` for the user, usually in a browser.
    async fn show_url(&self, url: &str) -> Result<()>;

    /// Prompt the user; resolves to the chosen action, or `None` if dismissed.
    async fn show_message_request(&self, request: &MessageRequest) -> Result<Option<String>>;

    fn show_progress(&self, progress: Progress);

    /// Ask for a one-time MFA code for `mfa_serial`.
    async fn get_mfa_code(&self, mfa_serial: &str, profile_name: &str) -> Result<Option<String>>;
}

/// Shows an indeterminate progress indicator until dropped.
pub struct ProgressGuard<'a> {
    host: &'a dyn HostUi,
    title: String,
}

impl<'a> ProgressGuard<'a> {
    pub fn begin(host: &'a dyn HostUi, title: impl Into<String>, message: impl Into<String>) -> Self {
        let title = title.into();
        host.show_progress(Progress {
            title: title.clone(),
            state: ProgressState::InProgress,
            message: Some(message.into()),
        });
        Self { host, title }
    }
}

impl Drop for ProgressGuard<'_> {
    fn drop(&mut self) {
        self.host.show_progress(Progress {
            title: std::mem::take(&mut self.title),
            state: ProgressState::Complete,
            message: None,
        });
    }
}

/// [`HostUi`] for the command line: prompts on stderr, reads stdin.
#[derive(Debug, Default)]
pub struct TerminalHost;

#[async_trait]
impl HostUi for TerminalHost {
    async fn show_url(&self, url: &str) -> Result<()> {
        eprintln!("Open this URL in your browser to continue:\n  {url}");
        Ok(())
    }

    async fn show_message_request(&self, request: &MessageRequest) -> Result<Option<String>> {
        eprintln!("{}", request.message);
        Ok(request.actions.first().cloned())
    }

    fn show_progress(&self, progress: Progress) {
        match progress.state {
            ProgressState::InProgress => {
                eprintln!("{}: {}", progress.title, progress.message.unwrap_or_default());
            }
            ProgressState::Complete => tracing::debug!(title = %progress.title, "progress complete"),
        }
    }

    async fn get_mfa_code(&self, mfa_serial: &str, profile_name: &str) -> Result<Option<String>> {
        eprint!("MFA code for {mfa_serial} (profile {profile_name}): ");
        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await.map_err(|e| {
            IdentityError::new(ErrorCode::MfaRequired, "Cannot read MFA code.").with_source(e)
        })?;
        let code = line.trim();
        Ok((!code.is_empty()).then(|| code.to_owned()))
    }
}
