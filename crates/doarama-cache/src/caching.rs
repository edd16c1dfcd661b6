//! # Caching Creator
//!
//! Wraps a [`RemoteCreator`] so that identical `(content, info)` requests
//! create at most one remote activity.
//!
//! ## Algorithm
//!
//! 1. Buffer the content and compute its [`Fingerprint`].
//! 2. Take the per-fingerprint lock. Identical requests in this process queue
//!    here; different requests proceed in parallel.
//! 3. Look the fingerprint up. A hit returns the recorded id and the remote
//!    service is never called.
//! 4. On a miss, call the remote service. A failure returns with nothing
//!    recorded, so a retry starts from scratch.
//! 5. Record the new id. If another process recorded the same fingerprint
//!    first, delete the activity just created and return the winner's id.
//!    Any other failure is reported with the new id attached.
//!
//! The lock is released when the call returns or its future is dropped.
//! A configurable timeout bounds the remote call so a hung request cannot
//! hold the lock forever.

use std::time::Duration;

use doarama_core::{ActivityId, ActivityInfo, Fingerprint};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::CacheConfig;
use crate::creator::{RemoteCreator, RemoteError};
use crate::error::{CreateError, ForgetError, IndexError};
use crate::index::ActivityIndex;
use crate::locks::FingerprintLocks;

/// How a successful [`CachingCreator::create`] call obtained its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationOutcome {
    /// Served from the index; no remote call was made.
    Cached,
    /// Created remotely and recorded.
    Created,
    /// Created remotely, but a concurrent writer recorded the same
    /// fingerprint first. The recorded id is returned, and our activity is
    /// deleted unless the service gave both writers the same id.
    Adopted,
}

/// Result of a successful [`CachingCreator::create`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Creation {
    /// The activity recorded for the request.
    pub activity_id: ActivityId,
    /// The request's fingerprint.
    pub fingerprint: Fingerprint,
    /// How the id was obtained.
    pub outcome: CreationOutcome,
}

impl Creation {
    /// True if this call made a remote creation that is now recorded.
    pub fn is_new(&self) -> bool {
        self.outcome == CreationOutcome::Created
    }
}

/// Idempotent front end to a [`RemoteCreator`].
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
#[derive(Debug)]
pub struct CachingCreator<C, I> {
    remote: C,
    index: I,
    locks: FingerprintLocks,
    remote_timeout: Option<Duration>,
}

impl<C, I> CachingCreator<C, I>
where
    C: RemoteCreator,
    I: ActivityIndex,
{
    /// Wrap `remote` with `index`, using the default remote timeout.
    pub fn new(remote: C, index: I) -> Self {
        Self {
            remote,
            index,
            locks: FingerprintLocks::new(),
            remote_timeout: CacheConfig::default().remote_timeout,
        }
    }

    /// Wrap `remote` with `index`, taking the remote timeout from `config`.
    pub fn with_config(remote: C, index: I, config: &CacheConfig) -> Self {
        Self::new(remote, index).with_remote_timeout(config.remote_timeout)
    }

    /// Override the remote timeout. `None` waits indefinitely.
    pub fn with_remote_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.remote_timeout = timeout;
        self
    }

    /// The underlying index.
    pub fn index(&self) -> &I {
        &self.index
    }

    /// The underlying remote creator.
    pub fn remote(&self) -> &C {
        &self.remote
    }

    /// Create an activity for `content` and `info`, or return the one
    /// already created for them.
    ///
    /// `content` is read to the end exactly once; the buffered bytes are both
    /// digested and sent to the remote service.
    pub async fn create<R>(
        &self,
        name: &str,
        mut content: R,
        info: &ActivityInfo,
    ) -> Result<Creation, CreateError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut buf = Vec::new();
        content
            .read_to_end(&mut buf)
            .await
            .map_err(CreateError::Read)?;
        self.create_from_bytes(name, &buf, info).await
    }

    /// [`create`](Self::create) for content that is already in memory.
    pub async fn create_from_bytes(
        &self,
        name: &str,
        content: &[u8],
        info: &ActivityInfo,
    ) -> Result<Creation, CreateError> {
        let fingerprint = Fingerprint::compute(content, info)?;
        let _guard = self.locks.lock(fingerprint).await;

        if let Some(activity_id) = self
            .index
            .lookup(&fingerprint)
            .await
            .map_err(CreateError::Lookup)?
        {
            tracing::debug!(%fingerprint, %activity_id, name, "activity cache hit");
            return Ok(Creation {
                activity_id,
                fingerprint,
                outcome: CreationOutcome::Cached,
            });
        }
        tracing::debug!(%fingerprint, name, "activity cache miss");

        let activity_id = self
            .remote_create(name, content, info)
            .await
            .map_err(CreateError::Remote)?;

        match self.index.insert(&fingerprint, activity_id).await {
            Ok(()) => {
                tracing::info!(%fingerprint, %activity_id, name, "created activity");
                Ok(Creation {
                    activity_id,
                    fingerprint,
                    outcome: CreationOutcome::Created,
                })
            }
            Err(IndexError::DuplicateKey { .. }) => {
                self.resolve_lost_race(fingerprint, activity_id).await
            }
            Err(source) => {
                tracing::warn!(
                    %fingerprint,
                    %activity_id,
                    error = %source,
                    "activity created but not recorded; a retry will create it again"
                );
                Err(CreateError::Persistence {
                    activity_id,
                    fingerprint,
                    source,
                })
            }
        }
    }

    /// Delete `activity_id` remotely, then drop every index entry that
    /// points at it. Returns how many entries were removed.
    pub async fn forget_activity(&self, activity_id: ActivityId) -> Result<u64, ForgetError> {
        self.remote
            .delete_activity(activity_id)
            .await
            .map_err(|source| ForgetError::Remote {
                activity_id,
                source,
            })?;
        let removed = self
            .index
            .remove_activity(activity_id)
            .await
            .map_err(|source| ForgetError::Index {
                activity_id,
                source,
            })?;
        tracing::info!(%activity_id, removed, "forgot activity");
        Ok(removed)
    }

    /// Release the index's storage handles.
    pub async fn close(self) {
        self.index.close().await;
    }

    async fn remote_create(
        &self,
        name: &str,
        content: &[u8],
        info: &ActivityInfo,
    ) -> Result<ActivityId, RemoteError> {
        let call = self.remote.create_activity(name, content, info);
        match self.remote_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| RemoteError::Timeout {
                    elapsed_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                })?,
            None => call.await,
        }
    }

    /// Another writer recorded `fingerprint` between our lookup and insert.
    async fn resolve_lost_race(
        &self,
        fingerprint: Fingerprint,
        activity_id: ActivityId,
    ) -> Result<Creation, CreateError> {
        let winner = match self.index.lookup(&fingerprint).await {
            Ok(Some(winner)) => winner,
            Ok(None) => {
                // The winning entry vanished again; ours is still unrecorded.
                return Err(CreateError::Persistence {
                    activity_id,
                    fingerprint,
                    source: IndexError::DuplicateKey { fingerprint },
                });
            }
            Err(source) => {
                return Err(CreateError::Persistence {
                    activity_id,
                    fingerprint,
                    source,
                })
            }
        };

        // The service handed the other writer the same id, so there is no
        // duplicate to delete. Our insert still lost, hence Adopted.
        if winner == activity_id {
            tracing::debug!(%fingerprint, %winner, "concurrent writer recorded the same activity");
            return Ok(Creation {
                activity_id,
                fingerprint,
                outcome: CreationOutcome::Adopted,
            });
        }

        match self.remote.delete_activity(activity_id).await {
            Ok(()) => {
                tracing::warn!(
                    %fingerprint,
                    duplicate = %activity_id,
                    %winner,
                    "lost creation race; deleted duplicate activity"
                );
                Ok(Creation {
                    activity_id: winner,
                    fingerprint,
                    outcome: CreationOutcome::Adopted,
                })
            }
            Err(cleanup) => {
                tracing::error!(
                    %fingerprint,
                    duplicate = %activity_id,
                    %winner,
                    error = %cleanup,
                    "lost creation race and failed to delete duplicate activity"
                );
                Err(CreateError::Duplicate {
                    activity_id,
                    winner,
                    fingerprint,
                    cleanup,
                })
            }
        }
    }
}
