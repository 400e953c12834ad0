// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;

use super::{
    CreateTokenRequest, HttpOidcClient, OidcClient, OidcErrorKind, RegisterClientRequest,
    StartDeviceAuthorizationRequest, GRANT_REFRESH_TOKEN,
};
use crate::error::ErrorCode;
use crate::test_support::http_client;

/// Mock OIDC endpoint replaying `responses` in order; records request bodies.
async fn mock_oidc_server(
    path: &'static str,
    responses: Vec<(u16, String)>,
) -> (SocketAddr, Arc<AtomicU32>, Arc<parking_lot::Mutex<Vec<String>>>) {
    let call_count = Arc::new(AtomicU32::new(0));
    let bodies = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let responses = Arc::new(responses);

    let count = Arc::clone(&call_count);
    let seen = Arc::clone(&bodies);
    let app = Router::new().route(
        path,
        post(move |body: String| {
            let count = Arc::clone(&count);
            let seen = Arc::clone(&seen);
            let resps = Arc::clone(&responses);
            async move {
                seen.lock().push(body);
                let idx = count.fetch_add(1, Ordering::Relaxed) as usize;
                let (status, body) = resps
                    .get(idx)
                    .or(resps.last())
                    .cloned()
                    .unwrap_or((500, "{}".to_owned()));
                (
                    axum::http::StatusCode::from_u16(status)
                        .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR),
                    body,
                )
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    (addr, call_count, bodies)
}

fn client_for(addr: SocketAddr) -> HttpOidcClient {
    HttpOidcClient::new(http_client()).with_endpoint(format!("http://{addr}"))
}

#[tokio::test]
async fn register_client_sends_camel_case_body() -> anyhow::Result<()> {
    let response = serde_json::json!({
        "clientId": "cid",
        "clientSecret": "csecret",
        "clientIdIssuedAt": 1_800_000_000,
        "clientSecretExpiresAt": 1_807_776_000
    })
    .to_string();
    let (addr, count, bodies) = mock_oidc_server("/client/register", vec![(200, response)]).await;

    let request = RegisterClientRequest {
        client_name: "aws-identity".into(),
        client_type: "public".into(),
        scopes: vec!["sso:account:access".into()],
        grant_types: vec!["authorization_code".into(), "refresh_token".into()],
        redirect_uris: vec!["http://127.0.0.1/oauth/callback".into()],
        issuer_url: "https://d-123.awsapps.com/start".into(),
    };
    let resp = client_for(addr).register_client("us-east-1", &request).await?;
    assert_eq!(resp.client_id, "cid");
    assert_eq!(resp.client_secret_expires_at, Some(1_807_776_000));
    assert_eq!(count.load(Ordering::Relaxed), 1);

    let body: serde_json::Value = serde_json::from_str(&bodies.lock()[0])?;
    assert_eq!(body["clientType"], "public");
    assert_eq!(body["issuerUrl"], "https://d-123.awsapps.com/start");
    assert_eq!(body["grantTypes"][1], "refresh_token");
    Ok(())
}

#[tokio::test]
async fn device_authorization_defaults_optional_fields() -> anyhow::Result<()> {
    let response = serde_json::json!({
        "deviceCode": "dc",
        "userCode": "ABCD-EFGH",
        "verificationUri": "https://device.sso.us-east-1.amazonaws.com/"
    })
    .to_string();
    let (addr, _, _) = mock_oidc_server("/device_authorization", vec![(200, response)]).await;

    let request = StartDeviceAuthorizationRequest {
        client_id: "cid".into(),
        client_secret: "cs".into(),
        start_url: "https://d-123.awsapps.com/start".into(),
    };
    let resp = client_for(addr).start_device_authorization("us-east-1", &request).await?;
    assert_eq!(resp.user_code, "ABCD-EFGH");
    assert_eq!(resp.interval, None);
    assert_eq!(resp.verification_uri_complete, None);
    Ok(())
}

#[yare::parameterized(
    pending = { r#"{"error":"authorization_pending"}"#, OidcErrorKind::AuthorizationPending },
    slow_down = { r#"{"error":"slow_down","error_description":"back off"}"#, OidcErrorKind::SlowDown },
    invalid_grant = {
        r#"{"__type":"InvalidGrantException","message":"Invalid refresh token provided"}"#,
        OidcErrorKind::InvalidGrant
    },
    unknown = { r#"{"error":"server_error"}"#, OidcErrorKind::Service("server_error".into()) },
    not_json = { "bad gateway", OidcErrorKind::Service(String::new()) },
)]
fn error_bodies_decode(body: &str, expected: OidcErrorKind) {
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().expect("runtime");
    rt.block_on(async {
        let (addr, _, _) = mock_oidc_server("/token", vec![(400, body.to_owned())]).await;
        let request = CreateTokenRequest {
            client_id: "cid".into(),
            client_secret: "cs".into(),
            grant_type: GRANT_REFRESH_TOKEN.into(),
            refresh_token: Some("rt".into()),
            ..Default::default()
        };
        let err = client_for(addr).create_token("us-east-1", &request).await.err().expect("error");
        assert_eq!(err.kind, expected);
        assert_eq!(err.status, Some(400));
    });
}

#[test]
fn exception_names_and_oauth_codes_agree() {
    assert_eq!(
        OidcErrorKind::from_type_name("SlowDownException:http://internal.amazon.com/"),
        OidcErrorKind::SlowDown
    );
    assert_eq!(OidcErrorKind::from_type_name("expired_token"), OidcErrorKind::ExpiredToken);
    assert_eq!(OidcErrorKind::from_type_name("AccessDeniedException"), OidcErrorKind::AccessDenied);
}

#[tokio::test]
async fn into_identity_keeps_status() -> anyhow::Result<()> {
    let (addr, _, _) = mock_oidc_server("/token", vec![(503, "{}".into())]).await;
    let request = CreateTokenRequest::default();
    let err = client_for(addr).create_token("us-east-1", &request).await.err().expect("error");
    let err = err.into_identity(ErrorCode::CannotRefreshSsoToken, "refresh failed");
    assert_eq!(err.code(), ErrorCode::CannotRefreshSsoToken);
    assert_eq!(err.http_status(), Some(503));
    Ok(())
}

#[test]
fn authorize_endpoint_is_regional() {
    let client = HttpOidcClient::new(http_client());
    assert_eq!(client.authorize_endpoint("eu-west-1"), "https://oidc.eu-west-1.amazonaws.com/authorize");
}
