//! Per-fingerprint mutual exclusion.
//!
//! [`CachingCreator`](crate::CachingCreator) holds a [`FingerprintGuard`]
//! across lookup → remote create → insert, so two tasks in one process never
//! both miss the index for the same request. Different fingerprints proceed
//! in parallel.
//!
//! Mutexes are created on demand and dropped from the table when the last
//! holder or waiter releases them, so the table only ever holds in-flight
//! fingerprints.

use std::sync::Arc;

use dashmap::DashMap;
use doarama_core::Fingerprint;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = DashMap<Fingerprint, Arc<Mutex<()>>>;

/// Table of async mutexes keyed by fingerprint. Cheap to clone; clones
/// share the table.
#[derive(Debug, Clone, Default)]
pub struct FingerprintLocks {
    table: Arc<LockTable>,
}

impl FingerprintLocks {
    /// An empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `fingerprint`.
    ///
    /// Cancel-safe: dropping the returned future while waiting does not
    /// strand an entry in the table.
    pub async fn lock(&self, fingerprint: Fingerprint) -> FingerprintGuard {
        // The shard lock is released at the end of this statement, before
        // the await below.
        let mutex = self.table.entry(fingerprint).or_default().value().clone();
        let mut waiting = Waiting {
            table: &self.table,
            fingerprint: &fingerprint,
            armed: true,
        };
        let guard = mutex.lock_owned().await;
        waiting.armed = false;
        FingerprintGuard {
            table: Arc::clone(&self.table),
            fingerprint,
            guard: Some(guard),
        }
    }

    /// Number of fingerprints currently held or waited on.
    pub fn in_flight(&self) -> usize {
        self.table.len()
    }
}

/// Exclusive access to one fingerprint. Released on drop.
pub struct FingerprintGuard {
    table: Arc<LockTable>,
    fingerprint: Fingerprint,
    guard: Option<OwnedMutexGuard<()>>,
}

impl FingerprintGuard {
    /// The fingerprint this guard protects.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

impl std::fmt::Debug for FingerprintGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintGuard")
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

impl Drop for FingerprintGuard {
    fn drop(&mut self) {
        // Release the mutex first so its Arc no longer counts as a holder.
        drop(self.guard.take());
        release(&self.table, &self.fingerprint);
    }
}

/// Cleans up after a `lock` future dropped before it acquired the mutex.
///
/// Declared before the `lock_owned` future, so that future (and its `Arc`)
/// is dropped first and `release` sees the true count.
struct Waiting<'a> {
    table: &'a LockTable,
    fingerprint: &'a Fingerprint,
    armed: bool,
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        if self.armed {
            release(self.table, self.fingerprint);
        }
    }
}

/// Remove the table entry if nobody else holds or awaits it.
fn release(table: &LockTable, fingerprint: &Fingerprint) {
    table.remove_if(fingerprint, |_, mutex| Arc::strong_count(mutex) == 1);
}
