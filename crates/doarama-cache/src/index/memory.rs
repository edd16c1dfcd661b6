//! In-memory index.
//!
//! Same contract as [`SqliteIndex`](super::SqliteIndex) without the
//! durability: entries vanish with the process. Useful for tests and for
//! runs that only need deduplication within one invocation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use doarama_core::{ActivityId, Fingerprint};
use parking_lot::Mutex;

use super::{ActivityIndex, IndexEntry};
use crate::error::IndexError;

/// Process-local [`ActivityIndex`].
#[derive(Debug, Default)]
pub struct MemoryIndex {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<Fingerprint, ActivityId>,
    closed: bool,
}

impl State {
    fn open(&mut self) -> Result<&mut BTreeMap<Fingerprint, ActivityId>, IndexError> {
        if self.closed {
            return Err(IndexError::Closed);
        }
        Ok(&mut self.entries)
    }
}

impl MemoryIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActivityIndex for MemoryIndex {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<ActivityId>, IndexError> {
        let mut state = self.state.lock();
        Ok(state.open()?.get(fingerprint).copied())
    }

    async fn insert(
        &self,
        fingerprint: &Fingerprint,
        activity_id: ActivityId,
    ) -> Result<(), IndexError> {
        let mut state = self.state.lock();
        let entries = state.open()?;
        if entries.contains_key(fingerprint) {
            return Err(IndexError::DuplicateKey {
                fingerprint: *fingerprint,
            });
        }
        entries.insert(*fingerprint, activity_id);
        Ok(())
    }

    async fn remove(&self, fingerprint: &Fingerprint) -> Result<bool, IndexError> {
        let mut state = self.state.lock();
        Ok(state.open()?.remove(fingerprint).is_some())
    }

    async fn remove_activity(&self, activity_id: ActivityId) -> Result<u64, IndexError> {
        let mut state = self.state.lock();
        let entries = state.open()?;
        let before = entries.len();
        entries.retain(|_, id| *id != activity_id);
        Ok((before - entries.len()) as u64)
    }

    async fn entries(&self) -> Result<Vec<IndexEntry>, IndexError> {
        let mut state = self.state.lock();
        let mut entries: Vec<IndexEntry> = state
            .open()?
            .iter()
            .map(|(fingerprint, activity_id)| IndexEntry {
                fingerprint: *fingerprint,
                activity_id: *activity_id,
            })
            .collect();
        entries.sort_by_key(|e| (e.activity_id, e.fingerprint));
        Ok(entries)
    }

    async fn count(&self) -> Result<u64, IndexError> {
        let mut state = self.state.lock();
        Ok(state.open()?.len() as u64)
    }

    async fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.entries.clear();
    }
}
