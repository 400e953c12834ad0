// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod iam;
pub mod oidc;
pub mod profile;
pub mod refresher;
pub mod schedule;
pub mod service;
pub mod shape;
pub mod sso;
pub mod sts;
pub mod test_support;

/// Install the process-wide rustls crypto provider. Later calls are no-ops.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}
