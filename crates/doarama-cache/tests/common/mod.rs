//! Shared fakes for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use doarama_cache::{ActivityIndex, IndexEntry, IndexError, MemoryIndex, RemoteCreator, RemoteError};
use doarama_core::{ActivityId, ActivityInfo, Fingerprint};
use parking_lot::Mutex;

/// Remote creator that counts calls and hands out sequential ids from 101.
#[derive(Debug)]
pub struct FakeCreator {
    calls: AtomicUsize,
    next_id: AtomicI64,
    delay_ms: AtomicU64,
    fail_create: AtomicBool,
    fail_delete: AtomicBool,
    deleted: Mutex<Vec<ActivityId>>,
}

impl Default for FakeCreator {
    fn default() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            next_id: AtomicI64::new(101),
            delay_ms: AtomicU64::new(0),
            fail_create: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            deleted: Mutex::new(Vec::new()),
        }
    }
}

impl FakeCreator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start ids at `first` instead of 101.
    pub fn starting_at(first: i64) -> Self {
        let fake = Self::default();
        fake.next_id.store(first, Ordering::SeqCst);
        fake
    }

    /// Make every create call sleep for `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(u64::try_from(delay.as_millis()).unwrap(), Ordering::SeqCst);
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    /// Number of create calls that reached the service, successful or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> Vec<ActivityId> {
        self.deleted.lock().clone()
    }
}

#[async_trait]
impl RemoteCreator for FakeCreator {
    async fn create_activity(
        &self,
        _name: &str,
        _content: &[u8],
        _info: &ActivityInfo,
    ) -> Result<ActivityId, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(RemoteError::Rejected {
                status: 500,
                message: "upload failed".into(),
            });
        }
        Ok(ActivityId::new(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn delete_activity(&self, id: ActivityId) -> Result<(), RemoteError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("connection reset".into()));
        }
        self.deleted.lock().push(id);
        Ok(())
    }
}

/// Index whose reads or writes can be made to fail on demand.
#[derive(Debug, Default)]
pub struct FlakyIndex {
    pub inner: MemoryIndex,
    pub fail_lookup: AtomicBool,
    pub fail_insert: AtomicBool,
}

fn disk_full() -> IndexError {
    IndexError::Io(std::io::Error::other("disk full"))
}

#[async_trait]
impl ActivityIndex for FlakyIndex {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<ActivityId>, IndexError> {
        if self.fail_lookup.load(Ordering::SeqCst) {
            return Err(disk_full());
        }
        self.inner.lookup(fingerprint).await
    }

    async fn insert(
        &self,
        fingerprint: &Fingerprint,
        activity_id: ActivityId,
    ) -> Result<(), IndexError> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(disk_full());
        }
        self.inner.insert(fingerprint, activity_id).await
    }

    async fn remove(&self, fingerprint: &Fingerprint) -> Result<bool, IndexError> {
        self.inner.remove(fingerprint).await
    }

    async fn remove_activity(&self, activity_id: ActivityId) -> Result<u64, IndexError> {
        self.inner.remove_activity(activity_id).await
    }

    async fn entries(&self) -> Result<Vec<IndexEntry>, IndexError> {
        self.inner.entries().await
    }

    async fn count(&self) -> Result<u64, IndexError> {
        self.inner.count().await
    }

    async fn close(&self) {
        self.inner.close().await
    }
}

/// Index that lets "another process" record a winner just before our
/// insert, reproducing a lost cross-process race deterministically.
#[derive(Debug, Default)]
pub struct RacingIndex {
    pub inner: MemoryIndex,
    winner: Mutex<Option<ActivityId>>,
}

impl RacingIndex {
    pub fn with_winner(winner: ActivityId) -> Self {
        Self {
            inner: MemoryIndex::new(),
            winner: Mutex::new(Some(winner)),
        }
    }
}

#[async_trait]
impl ActivityIndex for RacingIndex {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<ActivityId>, IndexError> {
        self.inner.lookup(fingerprint).await
    }

    async fn insert(
        &self,
        fingerprint: &Fingerprint,
        activity_id: ActivityId,
    ) -> Result<(), IndexError> {
        let winner = self.winner.lock().take();
        if let Some(winner) = winner {
            self.inner.insert(fingerprint, winner).await?;
        }
        self.inner.insert(fingerprint, activity_id).await
    }

    async fn remove(&self, fingerprint: &Fingerprint) -> Result<bool, IndexError> {
        self.inner.remove(fingerprint).await
    }

    async fn remove_activity(&self, activity_id: ActivityId) -> Result<u64, IndexError> {
        self.inner.remove_activity(activity_id).await
    }

    async fn entries(&self) -> Result<Vec<IndexEntry>, IndexError> {
        self.inner.entries().await
    }

    async fn count(&self) -> Result<u64, IndexError> {
        self.inner.count().await
    }

    async fn close(&self) {
        self.inner.close().await
    }
}

pub fn info(type_id: u32) -> ActivityInfo {
    ActivityInfo::with_type(type_id)
}
