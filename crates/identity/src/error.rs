// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable error codes surfaced to hosts and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidProfile,
    InvalidSsoSession,
    InvalidSsoClient,
    InvalidSsoToken,
    ProfileNotFound,
    CannotCreateCache,
    CannotReadCache,
    CannotWriteCache,
    CannotRegisterClient,
    CannotRefreshSsoToken,
    CannotCreateSsoToken,
    SsoTokenExpired,
    StsCredentialExpired,
    InvalidStsCredential,
    CannotCreateStsCredential,
    CannotRefreshStsCredential,
    MfaRequired,
    Timeout,
    Cancelled,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidProfile => "E_INVALID_PROFILE",
            Self::InvalidSsoSession => "E_INVALID_SSO_SESSION",
            Self::InvalidSsoClient => "E_INVALID_SSO_CLIENT",
            Self::InvalidSsoToken => "E_INVALID_SSO_TOKEN",
            Self::ProfileNotFound => "E_PROFILE_NOT_FOUND",
            Self::CannotCreateCache => "E_CANNOT_CREATE_CACHE",
            Self::CannotReadCache => "E_CANNOT_READ_CACHE",
            Self::CannotWriteCache => "E_CANNOT_WRITE_CACHE",
            Self::CannotRegisterClient => "E_CANNOT_REGISTER_CLIENT",
            Self::CannotRefreshSsoToken => "E_CANNOT_REFRESH_SSO_TOKEN",
            Self::CannotCreateSsoToken => "E_CANNOT_CREATE_SSO_TOKEN",
            Self::SsoTokenExpired => "E_SSO_TOKEN_EXPIRED",
            Self::StsCredentialExpired => "E_STS_CREDENTIAL_EXPIRED",
            Self::InvalidStsCredential => "E_INVALID_STS_CREDENTIAL",
            Self::CannotCreateStsCredential => "E_CANNOT_CREATE_STS_CREDENTIAL",
            Self::CannotRefreshStsCredential => "E_CANNOT_REFRESH_STS_CREDENTIAL",
            Self::MfaRequired => "E_MFA_REQUIRED",
            Self::Timeout => "E_TIMEOUT",
            Self::Cancelled => "E_CANCELLED",
            Self::Unknown => "E_UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An error with a stable [`ErrorCode`] and the original cause attached.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct IdentityError {
    code: ErrorCode,
    message: String,
    http_status: Option<u16>,
    #[source]
    source: Option<Cause>,
}

impl IdentityError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), http_status: None, source: None }
    }

    pub fn with_source(mut self, source: impl Into<Cause>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Replace the code, keeping message, status and cause.
    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = code;
        self
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    /// Attach `code` to `err` unless it already carries one.
    ///
    /// A nested [`IdentityError`] is returned untouched so the innermost,
    /// most specific code survives.
    pub fn wrap(err: impl Into<Cause>, code: ErrorCode, message: impl Into<String>) -> Self {
        match err.into().downcast::<IdentityError>() {
            Ok(inner) => *inner,
            Err(other) => Self::new(code, message).with_source(other),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status of the failed service call, if one was recorded.
    pub fn http_status(&self) -> Option<u16> {
        self.http_status
    }

    /// Shorthand for `Err(IdentityError::new(code, message))`.
    pub fn fail<T>(code: ErrorCode, message: impl Into<String>) -> Result<T, Self> {
        Err(Self::new(code, message))
    }
}

pub type Result<T, E = IdentityError> = std::result::Result<T, E>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
