// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background timers that renew cached resources ahead of expiry.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cache::{SsoToken, StsCredential};
use crate::error::Result;
use crate::events::{ChangeKind, EventSender, IdentityEvent, MetricEvent, MetricResult, ResourceKind};
use crate::schedule::RefreshScheduler;

/// A value whose expiry drives refresh scheduling.
pub trait Expiring {
    fn expires_at(&self) -> Option<DateTime<Utc>>;
}

impl Expiring for SsoToken {
    fn expires_at(&self) -> Option<DateTime<Utc>> {
        Some(self.expires_at)
    }
}

impl Expiring for StsCredential {
    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.credentials.expiration
    }
}

/// How to read, renew and store one watched resource.
#[async_trait]
pub trait Renewal<T>: Send + Sync {
    /// The currently cached value, if any.
    async fn current(&self) -> Result<Option<T>>;

    async fn renew(&self) -> Result<T>;

    async fn persist(&self, value: &T) -> Result<()>;
}

struct WatchEntry {
    cancel: CancellationToken,
    generation: u64,
    /// Monotonic, so the cooldown is immune to wall-clock jumps.
    last_refresh_attempt_at: Option<Instant>,
}

/// One timer per watched resource id. Dropping the refresher, or calling
/// [`dispose`](Self::dispose), cancels every timer it owns.
pub struct AutoRefresher<T> {
    me: Weak<AutoRefresher<T>>,
    kind: ResourceKind,
    scheduler: RefreshScheduler,
    events: EventSender,
    entries: parking_lot::Mutex<HashMap<String, WatchEntry>>,
    generation: AtomicU64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AutoRefresher<T>
where
    T: Expiring + Send + Sync + 'static,
{
    pub fn new(kind: ResourceKind, scheduler: RefreshScheduler, events: EventSender) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            kind,
            scheduler,
            events,
            entries: parking_lot::Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            _marker: PhantomData,
        })
    }

    /// Arm (or re-arm) the refresh timer for `id`.
    ///
    /// Any existing timer for `id` is cancelled first. Nothing is armed when
    /// no value is cached, the cached value has expired, or `id` was
    /// unwatched while the cached value was being read.
    pub async fn watch(&self, id: &str, renewal: Arc<dyn Renewal<T>>) -> Result<()> {
        let (generation, cancel) = self.reserve(id);

        let value = match renewal.current().await {
            Ok(Some(value)) => value,
            Ok(None) => {
                tracing::debug!(kind = ?self.kind, %id, "nothing cached; not watching");
                self.release(id, generation);
                return Ok(());
            }
            Err(e) => {
                self.release(id, generation);
                return Err(e);
            }
        };
        let Some(expires_at) = value.expires_at() else {
            tracing::debug!(kind = ?self.kind, %id, "no expiry; not watching");
            self.release(id, generation);
            return Ok(());
        };
        let Some(delay) = self.scheduler.delay(expires_at, Utc::now()) else {
            self.expire(id, generation);
            return Ok(());
        };

        if self.arm(id, generation, cancel, renewal, delay) {
            tracing::debug!(kind = ?self.kind, %id, delay_ms = delay.as_millis() as u64, "refresh armed");
        } else {
            tracing::debug!(kind = ?self.kind, %id, "unwatched while reading; not arming");
        }
        Ok(())
    }

    /// Cancel and forget the timer for `id`. No-op when not watched.
    pub fn unwatch(&self, id: &str) {
        self.cancel_entry(id);
    }

    /// Cancel every timer.
    pub fn dispose(&self) {
        let drained: Vec<WatchEntry> = self.entries.lock().drain().map(|(_, e)| e).collect();
        for entry in drained {
            entry.cancel.cancel();
        }
    }

    pub fn is_watching(&self, id: &str) -> bool {
        self.entries.lock().contains_key(id)
    }

    pub fn last_refresh_attempt(&self, id: &str) -> Option<Instant> {
        self.entries.lock().get(id).and_then(|e| e.last_refresh_attempt_at)
    }

    /// Cancel any entry for `id` and hold its slot with a fresh generation,
    /// carrying the last attempt time over.
    fn reserve(&self, id: &str) -> (u64, CancellationToken) {
        let cancel = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.lock();
        let last_refresh_attempt_at = entries.get(id).and_then(|e| e.last_refresh_attempt_at);
        let entry = WatchEntry { cancel: cancel.clone(), generation, last_refresh_attempt_at };
        if let Some(old) = entries.insert(id.to_owned(), entry) {
            old.cancel.cancel();
        }
        (generation, cancel)
    }

    /// Drop the entry for `id` if it still belongs to `generation`.
    fn release(&self, id: &str, generation: u64) -> bool {
        let mut entries = self.entries.lock();
        if entries.get(id).is_some_and(|e| e.generation == generation) {
            entries.remove(id);
            true
        } else {
            false
        }
    }

    fn expire(&self, id: &str, generation: u64) {
        if self.release(id, generation) {
            tracing::info!(kind = ?self.kind, %id, "expired; re-authentication required");
            let _ = self.events.send(self.kind.changed(ChangeKind::Expired, id));
        }
    }

    fn cancel_entry(&self, id: &str) {
        if let Some(entry) = self.entries.lock().remove(id) {
            entry.cancel.cancel();
        }
    }

    /// Spawn the timer for a reserved entry. Returns false when the
    /// reservation was dropped or superseded in the meantime.
    fn arm(
        &self,
        id: &str,
        generation: u64,
        cancel: CancellationToken,
        renewal: Arc<dyn Renewal<T>>,
        delay: std::time::Duration,
    ) -> bool {
        if !self.entries.lock().get(id).is_some_and(|e| e.generation == generation) {
            return false;
        }

        let me = self.me.clone();
        let id = id.to_owned();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return,
            }
            let Some(this) = me.upgrade() else {
                return;
            };
            this.fire(&id, generation, renewal, cancel).await;
        });
        true
    }

    async fn fire(
        &self,
        id: &str,
        generation: u64,
        renewal: Arc<dyn Renewal<T>>,
        cancel: CancellationToken,
    ) {
        match renewal.current().await {
            Ok(Some(value)) if value.expires_at().is_some_and(|at| at > Utc::now()) => {}
            Ok(Some(_)) => {
                self.expire(id, generation);
                return;
            }
            Ok(None) => {
                tracing::debug!(kind = ?self.kind, %id, "no longer cached; not renewing");
                self.release(id, generation);
                return;
            }
            Err(e) => tracing::debug!(kind = ?self.kind, %id, err = %e, "cannot read cached value"),
        }
        if cancel.is_cancelled() {
            return;
        }

        let now = Instant::now();
        let proceed = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(id).filter(|e| e.generation == generation) else {
                return;
            };
            let cooling = entry
                .last_refresh_attempt_at
                .is_some_and(|at| now.duration_since(at) < self.scheduler.retry_cooldown);
            if !cooling {
                entry.last_refresh_attempt_at = Some(now);
            }
            !cooling
        };

        if proceed {
            self.renew(id, &*renewal, &cancel).await;
        }
        if cancel.is_cancelled() {
            return;
        }
        if let Err(e) = self.watch(id, renewal).await {
            tracing::warn!(kind = ?self.kind, %id, err = %e, "cannot re-arm refresh");
        }
    }

    async fn renew(&self, id: &str, renewal: &dyn Renewal<T>, cancel: &CancellationToken) {
        let started = Instant::now();
        let result = renew_and_persist(renewal, cancel).await;

        let metric_name = match self.kind {
            ResourceKind::SsoToken => "aws_identity_autoRefreshSsoToken",
            ResourceKind::StsCredential => "aws_identity_autoRefreshStsCredential",
        };
        match result {
            Ok(true) => {
                tracing::info!(kind = ?self.kind, %id, "refreshed");
                let _ = self.events.send(self.kind.changed(ChangeKind::Refreshed, id));
                let metric = MetricEvent::new(metric_name, MetricResult::Succeeded, started.elapsed());
                let _ = self.events.send(IdentityEvent::Metric(metric));
            }
            Ok(false) => tracing::debug!(kind = ?self.kind, %id, "watch cancelled; discarding renewal"),
            Err(e) => {
                tracing::warn!(kind = ?self.kind, %id, code = %e.code(), err = %e, "refresh failed");
                let metric = MetricEvent::new(metric_name, MetricResult::Failed, started.elapsed())
                    .with_error(&e);
                let _ = self.events.send(IdentityEvent::Metric(metric));
            }
        }
    }
}

/// Returns `Ok(false)` when the watch was cancelled mid-renewal; a logout
/// must not be undone by a late refresh.
async fn renew_and_persist<T>(renewal: &dyn Renewal<T>, cancel: &CancellationToken) -> Result<bool> {
    let value = renewal.renew().await?;
    if cancel.is_cancelled() {
        return Ok(false);
    }
    renewal.persist(&value).await?;
    Ok(true)
}

impl<T> Drop for AutoRefresher<T> {
    fn drop(&mut self) {
        for entry in self.entries.get_mut().values() {
            entry.cancel.cancel();
        }
    }
}

#[cfg(test)]
#[path = "refresher_tests.rs"]
mod tests;
