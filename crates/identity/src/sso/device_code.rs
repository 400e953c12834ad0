// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth 2.0 Device Authorization Grant (RFC 8628) against SSO OIDC.

use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use super::{check_cancelled, SsoFlowParams};
use crate::cache::SsoToken;
use crate::error::{ErrorCode, IdentityError, Result};
use crate::host::{MessageRequest, ProgressGuard};
use crate::oidc::{
    CreateTokenRequest, CreateTokenResponse, OidcErrorKind, StartDeviceAuthorizationRequest,
    StartDeviceAuthorizationResponse, GRANT_DEVICE_CODE,
};

const DEFAULT_EXPIRES_IN: Duration = Duration::from_secs(10 * 60);
const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);
const SLOW_DOWN_INCREMENT: Duration = Duration::from_secs(5);

pub const PROCEED_ACTION: &str = "Proceed to Browser";

/// Run the device-code login for `params.session`.
pub async fn device_code_flow(params: &SsoFlowParams<'_>) -> Result<SsoToken> {
    params.validate()?;
    check_cancelled(params.cancel)?;

    let region = params.session.settings.sso_region.as_str();
    let request = StartDeviceAuthorizationRequest {
        client_id: params.registration.client_id.clone(),
        client_secret: params.registration.client_secret.clone(),
        start_url: params.session.settings.sso_start_url.clone(),
    };
    let authorization =
        params.oidc.start_device_authorization(region, &request).await.map_err(|e| {
            e.into_identity(ErrorCode::CannotCreateSsoToken, "Cannot start device authorization.")
        })?;

    let expires_in =
        authorization.expires_in.filter(|s| *s > 0).map(Duration::from_secs).unwrap_or(DEFAULT_EXPIRES_IN);
    let deadline = Instant::now() + expires_in;

    confirm_user_code(params, &authorization, expires_in).await?;
    let url = authorization
        .verification_uri_complete
        .as_deref()
        .unwrap_or(&authorization.verification_uri);
    params.host.show_url(url).await?;

    let _progress = ProgressGuard::begin(
        params.host,
        "Signing in",
        format!("Waiting for code {} to be confirmed", authorization.user_code),
    );
    let response = poll_for_token(params, &authorization, deadline).await?;
    tracing::info!(session = %params.session.name, "device authorization complete");
    SsoToken::from_create_token(&response, params.registration, params.session, Utc::now())
}

/// Show the user code and wait for the user to acknowledge it.
async fn confirm_user_code(
    params: &SsoFlowParams<'_>,
    authorization: &StartDeviceAuthorizationResponse,
    timeout: Duration,
) -> Result<()> {
    let request = MessageRequest {
        message: format!(
            "Confirm code \"{}\" in the login page opened in your web browser.",
            authorization.user_code
        ),
        actions: vec![PROCEED_ACTION.to_owned()],
    };
    let choice = tokio::select! {
        r = tokio::time::timeout(timeout, params.host.show_message_request(&request)) => match r {
            Ok(choice) => choice?,
            Err(_) => {
                return IdentityError::fail(ErrorCode::Timeout, "User code was not confirmed in time.")
            }
        },
        _ = params.cancel.cancelled() => {
            return IdentityError::fail(ErrorCode::Cancelled, "Login was cancelled.");
        }
    };
    if choice.is_none() {
        return IdentityError::fail(ErrorCode::Cancelled, "Login was cancelled.");
    }
    Ok(())
}

/// Poll the token endpoint until the user approves, the code expires, or
/// the caller cancels.
async fn poll_for_token(
    params: &SsoFlowParams<'_>,
    authorization: &StartDeviceAuthorizationResponse,
    deadline: Instant,
) -> Result<CreateTokenResponse> {
    let region = params.session.settings.sso_region.as_str();
    let mut interval =
        authorization.interval.filter(|s| *s > 0).map(Duration::from_secs).unwrap_or(DEFAULT_INTERVAL);
    let request = CreateTokenRequest {
        client_id: params.registration.client_id.clone(),
        client_secret: params.registration.client_secret.clone(),
        grant_type: GRANT_DEVICE_CODE.to_owned(),
        device_code: Some(authorization.device_code.clone()),
        ..Default::default()
    };

    loop {
        if deadline.saturating_duration_since(Instant::now()) < interval {
            return IdentityError::fail(ErrorCode::Timeout, "Device authorization expired.");
        }
        check_cancelled(params.cancel)?;

        match params.oidc.create_token(region, &request).await {
            Ok(response) => return Ok(response),
            Err(e) => match e.kind {
                OidcErrorKind::AuthorizationPending => {}
                OidcErrorKind::SlowDown => {
                    interval += SLOW_DOWN_INCREMENT;
                    tracing::debug!(interval_secs = interval.as_secs(), "device poll slowed down");
                }
                _ => {
                    return Err(
                        e.into_identity(ErrorCode::CannotCreateSsoToken, "Device authorization failed.")
                    )
                }
            },
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = params.cancel.cancelled() => {}
        }
    }
}

#[cfg(test)]
#[path = "device_code_tests.rs"]
mod tests;
