//! # Activity Index
//!
//! The durable mapping from [`Fingerprint`] to the [`ActivityId`] created
//! for it. It is the only persistent state the cache owns.
//!
//! ## Invariants
//!
//! - At most one entry per fingerprint. Uniqueness is enforced on the
//!   (track digest, info digest) pair as a whole, never on either digest
//!   alone: different tracks routinely share metadata.
//! - Entries are written once, after a remote creation succeeded, and are
//!   never updated. They are removed only when the remote activity is
//!   deleted.
//! - `insert` is the final arbiter between racing writers. It fails with
//!   [`IndexError::DuplicateKey`] rather than overwriting.
//!
//! ## Backends
//!
//! - [`SqliteIndex`]: file-backed, survives restarts, safe to share across
//!   processes.
//! - [`MemoryIndex`]: process-local, for tests and throwaway runs.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryIndex;
pub use sqlite::SqliteIndex;

use std::sync::Arc;

use async_trait::async_trait;
use doarama_core::{ActivityId, Fingerprint};
use serde::Serialize;

use crate::error::IndexError;

/// One recorded creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    /// The request that was created.
    pub fingerprint: Fingerprint,
    /// The activity the remote service allocated for it.
    pub activity_id: ActivityId,
}

/// Storage backend for the fingerprint → activity mapping.
#[async_trait]
pub trait ActivityIndex: Send + Sync {
    /// The activity recorded for `fingerprint`, if any.
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<ActivityId>, IndexError>;

    /// Durably record `activity_id` for `fingerprint`.
    ///
    /// # Errors
    ///
    /// [`IndexError::DuplicateKey`] if an entry already exists; the existing
    /// entry is left untouched.
    async fn insert(&self, fingerprint: &Fingerprint, activity_id: ActivityId)
        -> Result<(), IndexError>;

    /// Remove the entry for `fingerprint`. Returns whether one existed.
    async fn remove(&self, fingerprint: &Fingerprint) -> Result<bool, IndexError>;

    /// Remove every entry pointing at `activity_id`. Returns how many were
    /// removed.
    async fn remove_activity(&self, activity_id: ActivityId) -> Result<u64, IndexError>;

    /// All entries, ordered by activity id.
    async fn entries(&self) -> Result<Vec<IndexEntry>, IndexError>;

    /// Number of entries.
    async fn count(&self) -> Result<u64, IndexError>;

    /// Release storage handles. Operations after `close` fail.
    async fn close(&self);
}

#[async_trait]
impl<T: ActivityIndex + ?Sized> ActivityIndex for Arc<T> {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<ActivityId>, IndexError> {
        (**self).lookup(fingerprint).await
    }

    async fn insert(
        &self,
        fingerprint: &Fingerprint,
        activity_id: ActivityId,
    ) -> Result<(), IndexError> {
        (**self).insert(fingerprint, activity_id).await
    }

    async fn remove(&self, fingerprint: &Fingerprint) -> Result<bool, IndexError> {
        (**self).remove(fingerprint).await
    }

    async fn remove_activity(&self, activity_id: ActivityId) -> Result<u64, IndexError> {
        (**self).remove_activity(activity_id).await
    }

    async fn entries(&self) -> Result<Vec<IndexEntry>, IndexError> {
        (**self).entries().await
    }

    async fn count(&self) -> Result<u64, IndexError> {
        (**self).count().await
    }

    async fn close(&self) {
        (**self).close().await
    }
}
