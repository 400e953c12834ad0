// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! STS and IAM calls needed for role assumption.

use std::time::SystemTime;

use async_trait::async_trait;
use aws_sdk_sts::config::http::HttpResponse;
use aws_sdk_sts::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use chrono::{DateTime, Utc};

use crate::cache::{AssumedRoleUser, IamCredentials, StsCredential};
use crate::error::{ErrorCode, IdentityError, Result};

pub const DEFAULT_REGION: &str = "us-east-1";
/// Role-chained sessions are capped at one hour.
pub const SESSION_DURATION_SECONDS: i32 = 3600;
/// Context key reported missing when a policy requires MFA.
pub const MFA_CONTEXT_KEY: &str = "aws:MultiFactorAuthPresent";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfaToken {
    pub serial_number: String,
    pub token_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumeRoleRequest {
    pub role_arn: String,
    pub role_session_name: String,
    pub duration_seconds: i32,
    pub mfa: Option<MfaToken>,
}

impl AssumeRoleRequest {
    /// A request with a timestamped session name and the default duration.
    pub fn new(role_arn: impl Into<String>) -> Self {
        Self {
            role_arn: role_arn.into(),
            role_session_name: format!("session-{}", Utc::now().timestamp_millis()),
            duration_seconds: SESSION_DURATION_SECONDS,
            mfa: None,
        }
    }
}

/// One entry of a SimulatePrincipalPolicy response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationResult {
    pub action_name: String,
    pub decision: String,
    pub missing_context_values: Vec<String>,
}

#[async_trait]
pub trait StsService: Send + Sync {
    async fn assume_role(
        &self,
        credentials: &IamCredentials,
        region: &str,
        request: &AssumeRoleRequest,
    ) -> Result<StsCredential>;

    async fn get_caller_identity_arn(&self, credentials: &IamCredentials, region: &str)
        -> Result<String>;

    async fn simulate_principal_policy(
        &self,
        credentials: &IamCredentials,
        region: &str,
        policy_source_arn: &str,
        actions: &[&str],
    ) -> Result<Vec<EvaluationResult>>;
}

/// Convert an STS assumed-role ARN into the ARN of the role itself; other
/// ARNs are returned unchanged.
///
/// `arn:aws:sts::123456789012:assumed-role/Dev/session` becomes
/// `arn:aws:iam::123456789012:role/Dev`.
pub fn to_iam_arn(arn: &str) -> String {
    let parts: Vec<&str> = arn.splitn(6, ':').collect();
    if let [_, partition, "sts", _, account, resource] = parts.as_slice() {
        if let Some(role) = resource.strip_prefix("assumed-role/").and_then(|r| r.split('/').next()) {
            return format!("arn:{partition}:iam::{account}:role/{role}");
        }
    }
    arn.to_owned()
}

fn to_chrono(dt: &aws_sdk_sts::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

fn sdk_error<E>(err: SdkError<E, HttpResponse>, code: ErrorCode, context: &str) -> IdentityError
where
    E: std::error::Error + ProvideErrorMetadata + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let message = format!("{context} failed: {}", DisplayErrorContext(&err));
    let identity = IdentityError::new(code, message).with_source(err);
    match status {
        Some(s) => identity.with_http_status(s),
        None => identity,
    }
}

/// [`StsService`] backed by the AWS SDK.
#[derive(Debug, Default, Clone)]
pub struct AwsStsService;

impl AwsStsService {
    async fn sdk_config(credentials: &IamCredentials, region: &str) -> aws_config::SdkConfig {
        let provider = aws_sdk_sts::config::Credentials::new(
            &credentials.access_key_id,
            &credentials.secret_access_key,
            credentials.session_token.clone(),
            credentials.expiration.map(SystemTime::from),
            "aws-identity",
        );
        aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_owned()))
            .identity_cache(aws_config::identity::IdentityCache::no_cache())
            .credentials_provider(aws_sdk_sts::config::SharedCredentialsProvider::new(provider))
            .load()
            .await
    }
}

#[async_trait]
impl StsService for AwsStsService {
    async fn assume_role(
        &self,
        credentials: &IamCredentials,
        region: &str,
        request: &AssumeRoleRequest,
    ) -> Result<StsCredential> {
        let config = Self::sdk_config(credentials, region).await;
        let sts = aws_sdk_sts::Client::new(&config);

        tracing::debug!(
            region,
            role_arn = %request.role_arn,
            session_name = %request.role_session_name,
            mfa = request.mfa.is_some(),
            "calling AssumeRole"
        );
        let mut call = sts
            .assume_role()
            .role_arn(&request.role_arn)
            .role_session_name(&request.role_session_name)
            .duration_seconds(request.duration_seconds);
        if let Some(mfa) = &request.mfa {
            call = call.serial_number(&mfa.serial_number).token_code(&mfa.token_code);
        }
        let resp = call
            .send()
            .await
            .map_err(|e| sdk_error(e, ErrorCode::CannotCreateStsCredential, "AssumeRole"))?;

        let creds = resp.credentials().ok_or_else(|| {
            IdentityError::new(
                ErrorCode::InvalidStsCredential,
                "Failed to assume role: no credentials returned.",
            )
        })?;
        Ok(StsCredential {
            credentials: IamCredentials {
                access_key_id: creds.access_key_id().to_owned(),
                secret_access_key: creds.secret_access_key().to_owned(),
                session_token: Some(creds.session_token().to_owned()),
                expiration: to_chrono(creds.expiration()),
            },
            assumed_role_user: resp.assumed_role_user().map(|u| AssumedRoleUser {
                arn: u.arn().to_owned(),
                assumed_role_id: u.assumed_role_id().to_owned(),
            }),
        })
    }

    async fn get_caller_identity_arn(
        &self,
        credentials: &IamCredentials,
        region: &str,
    ) -> Result<String> {
        let config = Self::sdk_config(credentials, region).await;
        let resp = aws_sdk_sts::Client::new(&config)
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| sdk_error(e, ErrorCode::InvalidProfile, "GetCallerIdentity"))?;
        resp.arn().map(String::from).ok_or_else(|| {
            IdentityError::new(ErrorCode::InvalidProfile, "Caller identity has no ARN.")
        })
    }

    async fn simulate_principal_policy(
        &self,
        credentials: &IamCredentials,
        region: &str,
        policy_source_arn: &str,
        actions: &[&str],
    ) -> Result<Vec<EvaluationResult>> {
        let config = Self::sdk_config(credentials, region).await;
        let mut call = aws_sdk_iam::Client::new(&config)
            .simulate_principal_policy()
            .policy_source_arn(policy_source_arn);
        for action in actions {
            call = call.action_names(*action);
        }
        let resp = call
            .send()
            .await
            .map_err(|e| sdk_error(e, ErrorCode::InvalidProfile, "SimulatePrincipalPolicy"))?;
        Ok(resp
            .evaluation_results()
            .iter()
            .map(|r| EvaluationResult {
                action_name: r.eval_action_name().to_owned(),
                decision: r.eval_decision().as_str().to_owned(),
                missing_context_values: r.missing_context_values().to_vec(),
            })
            .collect())
    }
}

#[cfg(test)]
#[path = "sts_tests.rs"]
mod tests;
