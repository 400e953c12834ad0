// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use super::RefreshScheduler;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_800_000_000 + secs, 0).single().unwrap_or_default()
}

#[test]
fn outside_window_lands_before_window_lead() {
    let scheduler = RefreshScheduler::default();
    // Expires in 1 hour: 3600 - 285 = 3315 seconds, no jitter.
    let delay = scheduler.delay_with(at(3600), at(0), |_| Duration::ZERO);
    assert_eq!(delay, Some(Duration::from_secs(3315)));
}

#[test]
fn inside_window_uses_retry_cooldown() {
    let scheduler = RefreshScheduler::default();
    let delay = scheduler.delay_with(at(240), at(0), |_| Duration::ZERO);
    assert_eq!(delay, Some(Duration::from_millis(31_500)));
}

#[test]
fn retry_is_clamped_to_expiry() {
    let scheduler = RefreshScheduler::default();
    let delay = scheduler.delay_with(at(10), at(0), |max| max);
    assert_eq!(delay, Some(Duration::from_secs(10)));
}

#[test]
fn expired_is_invalid() {
    let scheduler = RefreshScheduler::default();
    assert_eq!(scheduler.delay(at(0), at(0)), None);
    assert_eq!(scheduler.delay(at(0), at(1)), None);
}

#[test]
fn refresh_window_boundary() {
    let scheduler = RefreshScheduler::default();
    assert!(!scheduler.in_refresh_window(at(360), at(0)));
    assert!(scheduler.in_refresh_window(at(300), at(0)));
    assert!(scheduler.in_refresh_window(at(240), at(0)));
}

proptest! {
    #[test]
    fn delay_invalid_iff_expired(expiry in -10_000i64..100_000, now in -10_000i64..100_000) {
        let scheduler = RefreshScheduler::default();
        let delay = scheduler.delay(at(expiry), at(now));
        prop_assert_eq!(delay.is_none(), now >= expiry);
    }

    #[test]
    fn delay_lands_at_or_before_expiry(expiry_ms in 1i64..10_000_000, jitter in 0.0f64..1.0) {
        let scheduler = RefreshScheduler::default();
        let now = at(0);
        let expires_at = now + chrono::Duration::milliseconds(expiry_ms);
        let delay = scheduler.delay_with(expires_at, now, |max| max.mul_f64(jitter));
        let Some(delay) = delay else {
            return Err(TestCaseError::fail("unexpired resource must be schedulable"));
        };
        let fire_at = now + chrono::Duration::from_std(delay).unwrap_or_default();
        prop_assert!(fire_at <= expires_at);
    }
}
