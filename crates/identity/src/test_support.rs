// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: fixtures and in-memory fakes for every
//! collaborator the engine talks to.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Once;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::cache::{
    AssumedRoleUser, IamCredentials, SsoCache, SsoClientRegistration, SsoToken, StsCache,
    StsCredential,
};
use crate::error::{ErrorCode, IdentityError, Result};
use crate::host::{HostUi, MessageRequest, Progress};
use crate::oidc::{
    CreateTokenRequest, CreateTokenResponse, OidcClient, OidcError, OidcErrorKind,
    RegisterClientRequest, RegisterClientResponse, StartDeviceAuthorizationRequest,
    StartDeviceAuthorizationResponse,
};
use crate::profile::{Profile, ProfileData, ProfileStore, SsoSession, SsoSessionSettings};
use crate::sso::SsoFlowParams;
use crate::sts::{AssumeRoleRequest, EvaluationResult, StsService, MFA_CONTEXT_KEY};

static INIT: Once = Once::new();

/// Install the rustls crypto provider (needed for reqwest even on plain HTTP).
pub fn ensure_crypto_provider() {
    INIT.call_once(crate::install_crypto_provider);
}

pub fn http_client() -> reqwest::Client {
    ensure_crypto_provider();
    reqwest::Client::new()
}

// -- Fixtures -----------------------------------------------------------------

pub fn sso_session(name: &str) -> SsoSession {
    SsoSession {
        name: name.to_owned(),
        settings: SsoSessionSettings {
            sso_region: "us-east-1".to_owned(),
            sso_start_url: "https://d-123.awsapps.com/start".to_owned(),
            sso_registration_scopes: vec!["sso:account:access".to_owned()],
        },
    }
}

pub fn registration(expires_at: DateTime<Utc>) -> SsoClientRegistration {
    SsoClientRegistration {
        client_id: "client-id".to_owned(),
        client_secret: "client-secret".to_owned(),
        issued_at: None,
        expires_at,
        scopes: vec!["sso:account:access".to_owned()],
    }
}

pub fn sso_token(expires_at: DateTime<Utc>) -> SsoToken {
    SsoToken {
        access_token: "access".to_owned(),
        refresh_token: Some("refresh".to_owned()),
        client_id: Some("client-id".to_owned()),
        client_secret: Some("client-secret".to_owned()),
        expires_at,
        registration_expires_at: Some(expires_at + Duration::days(90)),
        region: Some("us-east-1".to_owned()),
        start_url: Some("https://d-123.awsapps.com/start".to_owned()),
    }
}

pub fn static_keys(access_key_id: &str) -> IamCredentials {
    IamCredentials {
        access_key_id: access_key_id.to_owned(),
        secret_access_key: format!("{access_key_id}-secret"),
        session_token: None,
        expiration: None,
    }
}

pub fn sts_credential(expiration: DateTime<Utc>) -> StsCredential {
    StsCredential {
        credentials: IamCredentials {
            access_key_id: "ASIACACHED".to_owned(),
            secret_access_key: "cached-secret".to_owned(),
            session_token: Some("cached-token".to_owned()),
            expiration: Some(expiration),
        },
        assumed_role_user: Some(AssumedRoleUser {
            arn: "arn:aws:sts::123456789012:assumed-role/Dev/session-1".to_owned(),
            assumed_role_id: "AROAEXAMPLE:session-1".to_owned(),
        }),
    }
}

pub fn profile(name: &str, settings: &[(&str, &str)]) -> Profile {
    Profile::new(name, settings.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
}

/// A successful token exchange expiring in `expires_in` seconds.
pub fn token_response(access_token: &str, expires_in: i64) -> CreateTokenResponse {
    CreateTokenResponse {
        access_token: Some(access_token.to_owned()),
        expires_in: Some(expires_in),
        refresh_token: Some(format!("{access_token}-refresh")),
        token_type: Some("Bearer".to_owned()),
    }
}

pub fn oidc_error(kind: OidcErrorKind) -> OidcError {
    OidcError::new(kind, "scripted failure").with_status(400)
}

// -- Caches -------------------------------------------------------------------

#[derive(Default)]
pub struct MemorySsoCache {
    pub registrations: Mutex<HashMap<String, SsoClientRegistration>>,
    pub tokens: Mutex<HashMap<String, SsoToken>>,
    pub token_writes: AtomicU32,
    pub fail_writes: AtomicBool,
}

impl MemorySsoCache {
    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return IdentityError::fail(ErrorCode::CannotWriteCache, "disk full");
        }
        Ok(())
    }

    pub fn token(&self, session: &str) -> Option<SsoToken> {
        self.tokens.lock().get(session).cloned()
    }

    pub fn insert_token(&self, session: &str, token: SsoToken) {
        self.tokens.lock().insert(session.to_owned(), token);
    }
}

#[async_trait]
impl SsoCache for MemorySsoCache {
    async fn get_sso_client_registration(
        &self,
        client_name: &str,
        session: &SsoSession,
    ) -> Result<Option<SsoClientRegistration>> {
        let key = crate::cache::file::registration_key(client_name, session);
        Ok(self.registrations.lock().get(&key).cloned())
    }

    async fn set_sso_client_registration(
        &self,
        client_name: &str,
        session: &SsoSession,
        registration: &SsoClientRegistration,
    ) -> Result<()> {
        self.check_writable()?;
        let key = crate::cache::file::registration_key(client_name, session);
        self.registrations.lock().insert(key, registration.clone());
        Ok(())
    }

    async fn get_sso_token(&self, _client_name: &str, session: &SsoSession) -> Result<Option<SsoToken>> {
        Ok(self.token(&session.name))
    }

    async fn set_sso_token(&self, _client_name: &str, session: &SsoSession, token: &SsoToken) -> Result<()> {
        self.check_writable()?;
        self.token_writes.fetch_add(1, Ordering::Relaxed);
        self.insert_token(&session.name, token.clone());
        Ok(())
    }

    async fn remove_sso_token(&self, session_name: &str) -> Result<()> {
        self.tokens.lock().remove(session_name);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStsCache {
    pub credentials: Mutex<HashMap<String, StsCredential>>,
    pub writes: AtomicU32,
}

impl MemoryStsCache {
    pub fn credential(&self, id: &str) -> Option<StsCredential> {
        self.credentials.lock().get(id).cloned()
    }
}

#[async_trait]
impl StsCache for MemoryStsCache {
    async fn get_sts_credential(&self, id: &str) -> Result<Option<StsCredential>> {
        Ok(self.credential(id))
    }

    async fn set_sts_credential(&self, id: &str, credential: &StsCredential) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.credentials.lock().insert(id.to_owned(), credential.clone());
        Ok(())
    }

    async fn remove_sts_credential(&self, id: &str) -> Result<()> {
        self.credentials.lock().remove(id);
        Ok(())
    }
}

pub struct MemoryProfileStore(pub ProfileData);

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn load(&self) -> Result<ProfileData> {
        Ok(self.0.clone())
    }
}

// -- OIDC ---------------------------------------------------------------------

/// Scripted OIDC service. Token calls pop `token_responses` in order.
#[derive(Default)]
pub struct FakeOidc {
    pub register_calls: AtomicU32,
    pub device_calls: AtomicU32,
    pub token_calls: AtomicU32,
    pub token_requests: Mutex<Vec<CreateTokenRequest>>,
    pub token_responses: Mutex<VecDeque<std::result::Result<CreateTokenResponse, OidcError>>>,
    pub device_authorization: Mutex<StartDeviceAuthorizationResponse>,
    pub fail_register: AtomicBool,
}

impl FakeOidc {
    pub fn new() -> Self {
        let fake = Self::default();
        *fake.device_authorization.lock() = StartDeviceAuthorizationResponse {
            device_code: "device-code".to_owned(),
            user_code: "ABCD-EFGH".to_owned(),
            verification_uri: "https://device.sso.us-east-1.amazonaws.com/".to_owned(),
            verification_uri_complete: Some(
                "https://device.sso.us-east-1.amazonaws.com/?user_code=ABCD-EFGH".to_owned(),
            ),
            expires_in: Some(600),
            interval: Some(5),
        };
        fake
    }

    pub fn push_token(&self, response: std::result::Result<CreateTokenResponse, OidcError>) {
        self.token_responses.lock().push_back(response);
    }

    pub fn token_calls(&self) -> u32 {
        self.token_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl OidcClient for FakeOidc {
    async fn register_client(
        &self,
        _region: &str,
        request: &RegisterClientRequest,
    ) -> std::result::Result<RegisterClientResponse, OidcError> {
        let n = self.register_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_register.load(Ordering::Relaxed) {
            return Err(oidc_error(OidcErrorKind::Service("InvalidScopeException".into())));
        }
        let now = Utc::now().timestamp();
        Ok(RegisterClientResponse {
            client_id: format!("{}-client-{n}", request.client_name),
            client_secret: "registered-secret".to_owned(),
            client_id_issued_at: Some(now),
            client_secret_expires_at: Some(now + 90 * 24 * 3600),
        })
    }

    async fn start_device_authorization(
        &self,
        _region: &str,
        _request: &StartDeviceAuthorizationRequest,
    ) -> std::result::Result<StartDeviceAuthorizationResponse, OidcError> {
        self.device_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.device_authorization.lock().clone())
    }

    async fn create_token(
        &self,
        _region: &str,
        request: &CreateTokenRequest,
    ) -> std::result::Result<CreateTokenResponse, OidcError> {
        self.token_calls.fetch_add(1, Ordering::Relaxed);
        self.token_requests.lock().push(request.clone());
        self.token_responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(oidc_error(OidcErrorKind::Service("exhausted".into()))))
    }

    fn authorize_endpoint(&self, _region: &str) -> String {
        "https://oidc.example.test/authorize".to_owned()
    }
}

// -- Host ---------------------------------------------------------------------

/// How the fake host answers a prompt.
#[derive(Debug, Clone)]
pub enum HostReply {
    Respond(Option<String>),
    /// Never answer.
    Hang,
}

type UrlHook = Box<dyn Fn(&str) + Send + Sync>;

pub struct FakeHost {
    pub urls: Mutex<Vec<String>>,
    pub messages: Mutex<Vec<MessageRequest>>,
    pub progress: Mutex<Vec<Progress>>,
    pub mfa_requests: AtomicU32,
    pub message_reply: Mutex<HostReply>,
    pub mfa_reply: Mutex<HostReply>,
    on_url: Mutex<Option<UrlHook>>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            urls: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            progress: Mutex::new(Vec::new()),
            mfa_requests: AtomicU32::new(0),
            message_reply: Mutex::new(HostReply::Respond(Some("Proceed to Browser".to_owned()))),
            mfa_reply: Mutex::new(HostReply::Respond(Some("123456".to_owned()))),
            on_url: Mutex::new(None),
        }
    }
}

impl FakeHost {
    /// Run `hook` with every URL shown to the user.
    pub fn on_url(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *self.on_url.lock() = Some(Box::new(hook));
    }
}

async fn reply(reply: HostReply) -> Option<String> {
    match reply {
        HostReply::Respond(r) => r,
        HostReply::Hang => std::future::pending().await,
    }
}

#[async_trait]
impl HostUi for FakeHost {
    async fn show_url(&self, url: &str) -> Result<()> {
        self.urls.lock().push(url.to_owned());
        if let Some(hook) = self.on_url.lock().as_ref() {
            hook(url);
        }
        Ok(())
    }

    async fn show_message_request(&self, request: &MessageRequest) -> Result<Option<String>> {
        self.messages.lock().push(request.clone());
        let r = self.message_reply.lock().clone();
        Ok(reply(r).await)
    }

    fn show_progress(&self, progress: Progress) {
        self.progress.lock().push(progress);
    }

    async fn get_mfa_code(&self, _mfa_serial: &str, _profile_name: &str) -> Result<Option<String>> {
        self.mfa_requests.fetch_add(1, Ordering::Relaxed);
        let r = self.mfa_reply.lock().clone();
        Ok(reply(r).await)
    }
}

// -- Flows --------------------------------------------------------------------

/// Owns everything an [`SsoFlowParams`] borrows.
pub struct FlowFixture {
    pub registration: SsoClientRegistration,
    pub session: SsoSession,
    pub oidc: FakeOidc,
    pub host: FakeHost,
    pub cancel: CancellationToken,
}

impl FlowFixture {
    pub fn new() -> Self {
        Self {
            registration: registration(Utc::now() + Duration::days(90)),
            session: sso_session("corp"),
            oidc: FakeOidc::new(),
            host: FakeHost::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn params(&self) -> SsoFlowParams<'_> {
        SsoFlowParams {
            client_name: "tool",
            registration: &self.registration,
            session: &self.session,
            oidc: &self.oidc,
            host: &self.host,
            cancel: &self.cancel,
        }
    }
}

// -- STS ----------------------------------------------------------------------

/// Recorded AssumeRole call: parent access key, region, request.
#[derive(Debug, Clone)]
pub struct AssumeRoleCall {
    pub parent_access_key_id: String,
    pub region: String,
    pub request: AssumeRoleRequest,
}

/// Fake STS issuing `ASIA<n>` keys that expire in one hour.
#[derive(Default)]
pub struct FakeSts {
    pub assume_calls: Mutex<Vec<AssumeRoleCall>>,
    pub simulate_calls: AtomicU32,
    pub mfa_required: AtomicBool,
    pub fail_assume: AtomicBool,
}

impl FakeSts {
    pub fn assume_calls(&self) -> Vec<AssumeRoleCall> {
        self.assume_calls.lock().clone()
    }
}

#[async_trait]
impl StsService for FakeSts {
    async fn assume_role(
        &self,
        credentials: &IamCredentials,
        region: &str,
        request: &AssumeRoleRequest,
    ) -> Result<StsCredential> {
        if self.fail_assume.load(Ordering::Relaxed) {
            return Err(IdentityError::new(ErrorCode::CannotCreateStsCredential, "AccessDenied")
                .with_http_status(403));
        }
        let n = {
            let mut calls = self.assume_calls.lock();
            calls.push(AssumeRoleCall {
                parent_access_key_id: credentials.access_key_id.clone(),
                region: region.to_owned(),
                request: request.clone(),
            });
            calls.len()
        };
        let role = request.role_arn.rsplit('/').next().unwrap_or_default().to_owned();
        Ok(StsCredential {
            credentials: IamCredentials {
                access_key_id: format!("ASIA{n}"),
                secret_access_key: format!("secret-{n}"),
                session_token: Some(format!("token-{n}")),
                expiration: Some(Utc::now() + Duration::hours(1)),
            },
            assumed_role_user: Some(AssumedRoleUser {
                arn: format!("arn:aws:sts::123456789012:assumed-role/{role}/{}", request.role_session_name),
                assumed_role_id: format!("AROA{n}:{}", request.role_session_name),
            }),
        })
    }

    async fn get_caller_identity_arn(&self, credentials: &IamCredentials, _region: &str) -> Result<String> {
        Ok(format!("arn:aws:iam::123456789012:user/{}", credentials.access_key_id))
    }

    async fn simulate_principal_policy(
        &self,
        _credentials: &IamCredentials,
        _region: &str,
        _policy_source_arn: &str,
        actions: &[&str],
    ) -> Result<Vec<EvaluationResult>> {
        self.simulate_calls.fetch_add(1, Ordering::Relaxed);
        let missing = if self.mfa_required.load(Ordering::Relaxed) {
            vec![MFA_CONTEXT_KEY.to_owned()]
        } else {
            vec![]
        };
        Ok(actions
            .iter()
            .map(|a| EvaluationResult {
                action_name: (*a).to_owned(),
                decision: "allowed".to_owned(),
                missing_context_values: missing.clone(),
            })
            .collect())
    }
}
