//! Dispatch deduplicator.
//!
//! CI platforms deliver at least once: a reusable-workflow call that is
//! retried, or two runners picking up the same merge, must not post twice.
//! The [`Deduplicator`] owns the [`DeliveryRecord`] store and is the only
//! thing that mutates it.
//!
//! ## Concurrency
//!
//! Each [`DispatchKey`] has its own async lock. [`Deduplicator::should_dispatch`]
//! returns a [`DispatchPermit`] that holds the key's lock until it is either
//! consumed by [`DispatchPermit::record_delivered`] or dropped. A concurrent
//! attempt for the same key waits for the lock and then re-checks the store,
//! so it is suppressed when the holder delivered and proceeds when the holder
//! failed. The index of locks and records sits behind a plain mutex that is
//! never held across an `.await`, so distinct keys never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as KeyLock, OwnedMutexGuard};

use crate::clock::{Clock, SystemClock};
use crate::event::{DispatchKey, Event};
use crate::{MessageId, Timestamp};

/// Default retention of delivery records.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Immutable record of one accepted delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// Identity of the delivered notification.
    pub key: DispatchKey,
    /// When the backend confirmed delivery.
    pub delivered_at: Timestamp,
    /// Backend-assigned message identifier.
    pub message_id: MessageId,
}

/// Answer of [`Deduplicator::should_dispatch`].
#[derive(Debug)]
pub enum DispatchDecision {
    /// No delivery within the window: send, then call
    /// [`DispatchPermit::record_delivered`] on success.
    Dispatch(DispatchPermit),
    /// Already delivered within the window.
    Suppress(DeliveryRecord),
}

#[derive(Default)]
struct Store {
    records: HashMap<DispatchKey, DeliveryRecord>,
    locks: HashMap<DispatchKey, Arc<KeyLock<()>>>,
}

struct Inner {
    window: Duration,
    clock: Arc<dyn Clock>,
    store: Mutex<Store>,
}

impl Inner {
    fn store(&self) -> MutexGuard<'_, Store> {
        // The store holds no invariants a panicking holder could break halfway.
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_fresh(&self, record: &DeliveryRecord, now: Timestamp) -> bool {
        now.saturating_since(record.delivered_at) < self.window
    }

    fn fresh_record(&self, store: &Store, key: &DispatchKey) -> Option<DeliveryRecord> {
        let now = self.clock.now();
        store
            .records
            .get(key)
            .filter(|r| self.is_fresh(r, now))
            .cloned()
    }
}

/// Suppresses repeated notifications for the same logical event.
///
/// Cheap to clone; clones share one store.
#[derive(Clone)]
pub struct Deduplicator {
    inner: Arc<Inner>,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW, Arc::new(SystemClock))
    }
}

impl std::fmt::Debug for Deduplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deduplicator")
            .field("window", &self.inner.window)
            .field("records", &self.inner.store().records.len())
            .finish()
    }
}

impl Deduplicator {
    /// Creates a deduplicator retaining records for `window`.
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                window,
                clock,
                store: Mutex::new(Store::default()),
            }),
        }
    }

    /// Oldest delivery time still inside the dedup window.
    pub fn window_start(&self) -> Timestamp {
        self.inner.clock.now().minus(self.inner.window)
    }

    /// Decides whether `event` should be dispatched.
    pub async fn should_dispatch(&self, event: &Event) -> DispatchDecision {
        self.should_dispatch_key(event.dispatch_key()).await
    }

    /// Decides whether the notification identified by `key` should be dispatched.
    ///
    /// Waits while another permit for the same key is outstanding.
    pub async fn should_dispatch_key(&self, key: DispatchKey) -> DispatchDecision {
        let lock = {
            let mut store = self.inner.store();
            if let Some(record) = self.inner.fresh_record(&store, &key) {
                return DispatchDecision::Suppress(record);
            }
            Arc::clone(store.locks.entry(key.clone()).or_default())
        };

        let guard = Arc::clone(&lock).lock_owned().await;

        // The previous holder may have delivered while we waited.
        if let Some(record) = self.inner.fresh_record(&self.inner.store(), &key) {
            drop(guard);
            return DispatchDecision::Suppress(record);
        }

        DispatchDecision::Dispatch(DispatchPermit {
            key,
            inner: Arc::clone(&self.inner),
            lock: Some(lock),
            guard: Some(guard),
        })
    }

    /// Returns the live record for `key`, if any.
    pub fn lookup(&self, key: &DispatchKey) -> Option<DeliveryRecord> {
        self.inner.fresh_record(&self.inner.store(), key)
    }

    /// Number of records currently retained (including expired ones not yet pruned).
    pub fn len(&self) -> usize {
        self.inner.store().records.len()
    }

    /// `true` when no records are retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evicts records older than the window and locks nobody holds.
    ///
    /// Returns the number of records evicted.
    pub fn prune_expired(&self) -> usize {
        let now = self.inner.clock.now();
        let mut store = self.inner.store();
        let before = store.records.len();
        store.records.retain(|_, r| self.inner.is_fresh(r, now));
        store.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - store.records.len()
    }
}

/// Exclusive right to deliver one dispatch key.
///
/// Dropping the permit without calling [`record_delivered`](Self::record_delivered)
/// releases the key so a later attempt may deliver.
pub struct DispatchPermit {
    key: DispatchKey,
    inner: Arc<Inner>,
    lock: Option<Arc<KeyLock<()>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl std::fmt::Debug for DispatchPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchPermit").field("key", &self.key).finish()
    }
}

impl DispatchPermit {
    /// The key this permit covers.
    pub fn key(&self) -> &DispatchKey {
        &self.key
    }

    /// Records a confirmed delivery and releases the key.
    ///
    /// Call only after the backend has accepted the message.
    pub fn record_delivered(self, message_id: MessageId) -> DeliveryRecord {
        let record = DeliveryRecord {
            key: self.key.clone(),
            delivered_at: self.inner.clock.now(),
            message_id,
        };
        self.inner
            .store()
            .records
            .insert(self.key.clone(), record.clone());
        record
    }
}

impl Drop for DispatchPermit {
    fn drop(&mut self) {
        drop(self.guard.take());
        let Some(lock) = self.lock.take() else {
            return;
        };
        let mut store = self.inner.store();
        // One reference in the index plus ours means nobody is waiting.
        if Arc::strong_count(&lock) == 2 {
            store.locks.remove(&self.key);
        }
    }
}
