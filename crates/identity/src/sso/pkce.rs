// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OAuth authorization code + PKCE (RFC 7636) with a loopback callback
//! listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse, Redirect};
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::{check_cancelled, SsoFlowParams};
use crate::cache::SsoToken;
use crate::error::{ErrorCode, IdentityError, Result};
use crate::oidc::{CreateTokenRequest, GRANT_AUTHORIZATION_CODE};

pub const CALLBACK_PATH: &str = "/oauth/callback";
pub const COMPLETE_PATH: &str = "/complete";

/// How long the user has to finish the browser round trip.
pub const BROWSER_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Generate a PKCE code verifier: 32 random bytes, base64url.
pub fn generate_code_verifier() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compute code_challenge = base64url_nopad(sha256(verifier)).
pub fn compute_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Random CSRF state for one authorization request.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Build the authorize URL with PKCE parameters. Scopes are comma-joined.
pub fn build_authorize_url(
    endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    scopes: &[String],
    code_challenge: &str,
    state: &str,
) -> String {
    format!(
        "{endpoint}?response_type=code\
         &client_id={client_id}\
         &redirect_uri={redirect_uri}\
         &scopes={scopes}\
         &state={state}\
         &code_challenge={code_challenge}\
         &code_challenge_method=S256",
        client_id = urlencoding(client_id),
        redirect_uri = urlencoding(redirect_uri),
        scopes = urlencoding(&scopes.join(",")),
        state = urlencoding(state),
        code_challenge = urlencoding(code_challenge),
    )
}

#[derive(Debug, Default, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

struct CallbackState {
    expected_state: String,
    tx: parking_lot::Mutex<Option<oneshot::Sender<Result<String>>>>,
}

fn check_callback(expected_state: &str, params: CallbackParams) -> Result<String> {
    if let Some(error) = params.error {
        let reason = params.error_description.unwrap_or(error);
        return IdentityError::fail(ErrorCode::CannotCreateSsoToken, reason);
    }
    let (Some(code), Some(state)) = (params.code, params.state) else {
        return IdentityError::fail(
            ErrorCode::CannotCreateSsoToken,
            "Authorization callback is missing code or state.",
        );
    };
    if state != expected_state {
        return IdentityError::fail(
            ErrorCode::CannotCreateSsoToken,
            "Authorization callback state does not match.",
        );
    }
    Ok(code)
}

async fn handle_callback(
    State(s): State<Arc<CallbackState>>,
    Query(params): Query<CallbackParams>,
) -> impl IntoResponse {
    let outcome = check_callback(&s.expected_state, params);
    let target = match &outcome {
        Ok(_) => COMPLETE_PATH.to_owned(),
        Err(e) => format!("{COMPLETE_PATH}?error={}", urlencoding(e.message())),
    };
    let tx = s.tx.lock().take();
    match tx {
        Some(tx) => {
            let _ = tx.send(outcome);
        }
        None => tracing::debug!("ignoring repeated authorization callback"),
    }
    Redirect::to(&target)
}

#[derive(Debug, Default, Deserialize)]
struct CompleteParams {
    error: Option<String>,
}

async fn complete_page(Query(params): Query<CompleteParams>) -> Html<String> {
    let body = match params.error {
        Some(error) => format!("<h1>Sign-in failed</h1><p>{}</p>", escape_html(&error)),
        None => "<h1>Signed in</h1><p>You can close this window.</p>".to_owned(),
    };
    Html(format!("<!doctype html><html><body>{body}</body></html>"))
}

/// Loopback HTTP listener for the redirect. Dropping it stops accepting and
/// releases the socket.
struct CallbackListener {
    addr: SocketAddr,
    shutdown: CancellationToken,
}

impl CallbackListener {
    async fn bind(state: Arc<CallbackState>) -> Result<Self> {
        let bind_err = |e: std::io::Error| {
            IdentityError::new(ErrorCode::CannotCreateSsoToken, "Cannot start callback listener.")
                .with_source(e)
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.map_err(bind_err)?;
        let addr = listener.local_addr().map_err(bind_err)?;

        let app = Router::new()
            .route(CALLBACK_PATH, get(handle_callback))
            .route(COMPLETE_PATH, get(complete_page))
            .with_state(state);
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await;
            if let Err(e) = result {
                tracing::debug!(err = %e, "callback listener stopped");
            }
        });
        tracing::debug!(%addr, "callback listener bound");
        Ok(Self { addr, shutdown })
    }

    fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}{CALLBACK_PATH}", self.addr.port())
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Run the authorization-code login for `params.session`.
pub async fn authorization_code_pkce_flow(params: &SsoFlowParams<'_>) -> Result<SsoToken> {
    params.validate()?;
    check_cancelled(params.cancel)?;

    let region = params.session.settings.sso_region.as_str();
    let verifier = generate_code_verifier();
    let challenge = compute_code_challenge(&verifier);
    let state = generate_state();

    let (tx, rx) = oneshot::channel();
    let listener = CallbackListener::bind(Arc::new(CallbackState {
        expected_state: state.clone(),
        tx: parking_lot::Mutex::new(Some(tx)),
    }))
    .await?;
    let redirect_uri = listener.redirect_uri();

    let url = build_authorize_url(
        &params.oidc.authorize_endpoint(region),
        &params.registration.client_id,
        &redirect_uri,
        &params.registration.scopes,
        &challenge,
        &state,
    );
    params.host.show_url(&url).await?;

    let code = tokio::select! {
        r = tokio::time::timeout(BROWSER_TIMEOUT, rx) => match r {
            Ok(Ok(outcome)) => outcome?,
            Ok(Err(_)) => {
                return IdentityError::fail(ErrorCode::CannotCreateSsoToken, "Callback listener closed.")
            }
            Err(_) => {
                return IdentityError::fail(ErrorCode::Timeout, "Browser login was not completed in time.")
            }
        },
        _ = params.cancel.cancelled() => {
            return IdentityError::fail(ErrorCode::Cancelled, "Login was cancelled.");
        }
    };

    let request = CreateTokenRequest {
        client_id: params.registration.client_id.clone(),
        client_secret: params.registration.client_secret.clone(),
        grant_type: GRANT_AUTHORIZATION_CODE.to_owned(),
        code: Some(code),
        code_verifier: Some(verifier),
        redirect_uri: Some(redirect_uri),
        ..Default::default()
    };
    let response = params
        .oidc
        .create_token(region, &request)
        .await
        .map_err(|e| e.into_identity(ErrorCode::CannotCreateSsoToken, "Cannot exchange authorization code."))?;
    drop(listener);

    tracing::info!(session = %params.session.name, "authorization code login complete");
    SsoToken::from_create_token(&response, params.registration, params.session, Utc::now())
}

/// Percent-encoding for URL query parameters.
fn urlencoding(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            _ => {
                out.push('%');
                out.push(char::from(HEX[(b >> 4) as usize]));
                out.push(char::from(HEX[(b & 0xf) as usize]));
            }
        }
    }
    out
}

const HEX: &[u8; 16] = b"0123456789ABCDEF";

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

#[cfg(test)]
#[path = "pkce_tests.rs"]
mod tests;
