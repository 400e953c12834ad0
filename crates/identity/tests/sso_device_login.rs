// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device-code login over HTTP against a mock OIDC service, persisted to the
//! on-disk SSO cache.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use aws_identity::cache::file::FileSsoCache;
use aws_identity::cache::SsoCache;
use aws_identity::oidc::HttpOidcClient;
use aws_identity::profile::shared_config::SharedConfigProfileStore;
use aws_identity::service::{Collaborators, IdentityService, SsoTokenOptions, SsoTokenSource};
use aws_identity::sso::AuthorizationFlowKind;
use aws_identity::test_support::{http_client, sso_session, FakeHost, FakeSts, MemoryStsCache};

const CONFIG: &str = "\
[profile dev-sso]
sso_session = corp

[sso-session corp]
sso_region = us-east-1
sso_start_url = https://d-123.awsapps.com/start
sso_registration_scopes = sso:account:access
";

/// Mock OIDC: registration and device authorization succeed; the token
/// endpoint reports one pending poll before issuing a token.
async fn mock_oidc() -> anyhow::Result<(String, Arc<AtomicU32>)> {
    let token_calls = Arc::new(AtomicU32::new(0));
    let calls = Arc::clone(&token_calls);
    let app = Router::new()
        .route(
            "/client/register",
            post(|| async {
                let now = chrono::Utc::now().timestamp();
                Json(json!({
                    "clientId": "mock-client",
                    "clientSecret": "mock-secret",
                    "clientIdIssuedAt": now,
                    "clientSecretExpiresAt": now + 90 * 24 * 3600,
                }))
            }),
        )
        .route(
            "/device_authorization",
            post(|| async {
                Json(json!({
                    "deviceCode": "dev-code",
                    "userCode": "WXYZ-1234",
                    "verificationUri": "https://device.example.test/",
                    "expiresIn": 60,
                    "interval": 1,
                }))
            }),
        )
        .route(
            "/token",
            post(move |Json(body): Json<Value>| {
                let calls = Arc::clone(&calls);
                async move {
                    assert_eq!(body["deviceCode"], "dev-code");
                    if calls.fetch_add(1, Ordering::Relaxed) == 0 {
                        return (
                            StatusCode::BAD_REQUEST,
                            Json(json!({ "error": "authorization_pending" })),
                        );
                    }
                    (
                        StatusCode::OK,
                        Json(json!({
                            "accessToken": "http-access",
                            "refreshToken": "http-refresh",
                            "expiresIn": 3600,
                            "tokenType": "Bearer",
                        })),
                    )
                }
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    Ok((format!("http://{addr}"), token_calls))
}

#[tokio::test]
async fn device_code_login_is_cached_on_disk() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("config"), CONFIG)?;
    let (endpoint, token_calls) = mock_oidc().await?;
    let host = Arc::new(FakeHost::default());

    let service = IdentityService::new(
        "aws-identity",
        Collaborators {
            profiles: Arc::new(SharedConfigProfileStore::new(
                dir.path().join("config"),
                dir.path().join("credentials"),
            )),
            sso_cache: Arc::new(FileSsoCache::new(dir.path().join("sso/cache"))),
            sts_cache: Arc::new(MemoryStsCache::default()),
            oidc: Arc::new(HttpOidcClient::new(http_client()).with_endpoint(endpoint)),
            sts: Arc::new(FakeSts::default()),
            host: host.clone(),
        },
    );

    let source = SsoTokenSource::IamIdentityCenter { profile_name: "dev-sso".to_owned() };
    let options = SsoTokenOptions { authorization_flow: AuthorizationFlowKind::DeviceCode, ..Default::default() };
    let token = service.get_sso_token(&source, options, &CancellationToken::new()).await?;

    assert_eq!(token.id, "corp");
    assert_eq!(token.access_token, "http-access");
    assert_eq!(token_calls.load(Ordering::Relaxed), 2);
    assert_eq!(host.urls.lock().clone(), vec!["https://device.example.test/".to_owned()]);

    let on_disk = FileSsoCache::new(dir.path().join("sso/cache"));
    let session = sso_session("corp");
    let cached = on_disk.get_sso_token("aws-identity", &session).await?.expect("cached token");
    assert_eq!(cached.refresh_token.as_deref(), Some("http-refresh"));
    let registration = on_disk.get_sso_client_registration("aws-identity", &session).await?;
    assert_eq!(registration.map(|r| r.client_id), Some("mock-client".to_owned()));

    // A second call is served from disk without another login.
    let again = service.get_sso_token(&source, options, &CancellationToken::new()).await?;
    assert_eq!(again.access_token, "http-access");
    assert_eq!(token_calls.load(Ordering::Relaxed), 2);
    Ok(())
}
