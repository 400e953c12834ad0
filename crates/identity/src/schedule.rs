// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

/// Interval before expiry during which proactive renewal is attempted.
pub const REFRESH_WINDOW: Duration = Duration::from_secs(5 * 60);
/// Minimum spacing between renewal attempts.
pub const RETRY_COOLDOWN: Duration = Duration::from_secs(30);

const REFRESH_JITTER: Duration = Duration::from_secs(10);
const RETRY_JITTER: Duration = Duration::from_secs(3);

/// Jittered delay computation for proactive refresh timers.
#[derive(Debug, Clone, Copy)]
pub struct RefreshScheduler {
    pub refresh_window: Duration,
    pub retry_cooldown: Duration,
}

impl Default for RefreshScheduler {
    fn default() -> Self {
        Self { refresh_window: REFRESH_WINDOW, retry_cooldown: RETRY_COOLDOWN }
    }
}

impl RefreshScheduler {
    /// Delay before a resource expiring at `expires_at` should be renewed.
    ///
    /// Returns `None` once `now >= expires_at`; an expired resource must be
    /// re-authenticated, not auto-refreshed.
    pub fn delay(&self, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
        self.delay_with(expires_at, now, |max| {
            let max_ms = max.as_millis() as u64;
            if max_ms == 0 {
                return Duration::ZERO;
            }
            Duration::from_millis(rand::rng().random_range(0..max_ms))
        })
    }

    /// [`delay`](Self::delay) with a caller-supplied jitter source that maps
    /// the jitter bound to a value in `[0, bound)`.
    pub fn delay_with(
        &self,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
        jitter: impl FnOnce(Duration) -> Duration,
    ) -> Option<Duration> {
        let remaining = (expires_at - now).to_std().ok().filter(|d| !d.is_zero())?;

        let delay = if remaining > self.refresh_window {
            // Aim 95% of the window before expiry.
            let lead = self.refresh_window * 19 / 20;
            remaining - lead + jitter(REFRESH_JITTER)
        } else {
            self.retry_cooldown * 21 / 20 + jitter(RETRY_JITTER)
        };
        Some(delay.min(remaining))
    }

    /// True when `now` falls inside the refresh window of `expires_at`.
    pub fn in_refresh_window(&self, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.refresh_window) {
            Ok(window) => now >= expires_at - window,
            Err(_) => true,
        }
    }
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;
