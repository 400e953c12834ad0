// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Change notifications and metrics, fanned out over a broadcast channel.
//!
//! Sends never block; with no subscribers the event is dropped.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::IdentityError;

pub type EventSender = broadcast::Sender<IdentityEvent>;

/// Create an event channel with room for `capacity` unread events.
pub fn channel(capacity: usize) -> (EventSender, broadcast::Receiver<IdentityEvent>) {
    broadcast::channel(capacity)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Refreshed,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    SsoToken,
    StsCredential,
}

impl ResourceKind {
    pub fn changed(self, kind: ChangeKind, id: impl Into<String>) -> IdentityEvent {
        let id = id.into();
        match self {
            Self::SsoToken => IdentityEvent::SsoTokenChanged { kind, id },
            Self::StsCredential => IdentityEvent::StsCredentialChanged { kind, id },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IdentityEvent {
    SsoTokenChanged { kind: ChangeKind, id: String },
    StsCredentialChanged { kind: ChangeKind, id: String },
    Metric(MetricEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricResult {
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorData {
    pub error_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status_code: Option<u16>,
    pub reason: String,
}

impl From<&IdentityError> for ErrorData {
    fn from(err: &IdentityError) -> Self {
        Self {
            error_code: err.code().as_str().to_owned(),
            http_status_code: err.http_status(),
            reason: err.message().to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricEvent {
    pub name: String,
    pub result: MetricResult,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_data: Option<ErrorData>,
}

impl MetricEvent {
    pub fn new(name: impl Into<String>, result: MetricResult, duration: Duration) -> Self {
        Self {
            name: name.into(),
            result,
            duration_ms: duration.as_millis() as u64,
            data: BTreeMap::new(),
            error_data: None,
        }
    }

    pub fn with_data(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.to_owned(), value.into());
        self
    }

    pub fn with_error(mut self, err: &IdentityError) -> Self {
        self.error_data = Some(err.into());
        self
    }
}
