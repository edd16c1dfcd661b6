//! # Error Types
//!
//! Two layers of errors:
//!
//! - [`IndexError`]: failures of the durable index itself.
//! - [`CreateError`]: the outcome of a [`CachingCreator::create`] call that
//!   did not succeed cleanly.
//!
//! [`ForgetError`] covers the maintenance path that deletes an activity.
//!
//! `CreateError` separates failures that left nothing behind (`Read`,
//! `Fingerprint`, `Lookup`, `Remote`) from failures that happened after the
//! remote service already allocated an activity (`Persistence`,
//! `Duplicate`). The latter always carry that activity's id, so a caller is
//! never left guessing what remote side effect occurred.
//!
//! [`CachingCreator::create`]: crate::CachingCreator::create

use doarama_core::{ActivityId, CanonicalizationError, Fingerprint};

use crate::creator::RemoteError;

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Errors from an [`ActivityIndex`](crate::ActivityIndex) backend.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// An entry for this fingerprint already exists.
    #[error("index already holds an entry for fingerprint {fingerprint}")]
    DuplicateKey {
        /// The fingerprint that collided.
        fingerprint: Fingerprint,
    },

    /// The underlying database failed.
    #[error("storage error: {0}")]
    Storage(#[source] sqlx::Error),

    /// Filesystem failure while preparing the database location.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The index was written under a different fingerprint scheme.
    #[error("index uses fingerprint scheme {found:?}, expected {expected:?}")]
    SchemeMismatch {
        /// Scheme compiled into this build.
        expected: String,
        /// Scheme recorded in the database.
        found: String,
    },

    /// The database holds an `activities` table this build cannot use.
    #[error("incompatible index schema: {0}")]
    IncompatibleSchema(String),

    /// The index has been closed.
    #[error("index is closed")]
    Closed,

    /// A stored row could not be decoded.
    #[error("corrupt index row: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for IndexError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolClosed => Self::Closed,
            other => Self::Storage(other),
        }
    }
}

impl IndexError {
    /// True for [`IndexError::DuplicateKey`].
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }

    /// True when SQLite reported the database busy or locked.
    pub fn is_busy(&self) -> bool {
        match self {
            // Extended result codes keep the primary code in the low byte.
            Self::Storage(sqlx::Error::Database(db)) => db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED)),
            _ => false,
        }
    }
}

/// Why a [`CachingCreator::create`](crate::CachingCreator::create) call failed.
#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    /// The track content could not be read. Nothing was created.
    #[error("failed to read track content: {0}")]
    Read(#[source] std::io::Error),

    /// The activity info could not be canonicalized. Nothing was created.
    #[error("failed to fingerprint activity info: {0}")]
    Fingerprint(#[from] CanonicalizationError),

    /// The index could not be consulted. Nothing was created.
    #[error("index lookup failed: {0}")]
    Lookup(#[source] IndexError),

    /// The remote service failed to create the activity. Nothing was
    /// recorded.
    #[error("remote activity creation failed: {0}")]
    Remote(#[source] RemoteError),

    /// The activity exists remotely but could not be recorded. A later call
    /// with the same input will create it again.
    #[error("activity {activity_id} was created but not recorded in the index: {source}")]
    Persistence {
        /// The freshly created remote activity.
        activity_id: ActivityId,
        /// Fingerprint the entry should have been stored under.
        fingerprint: Fingerprint,
        /// The index failure.
        source: IndexError,
    },

    /// A concurrent writer recorded `winner` first, and the activity this
    /// call created could not be deleted. Both activities now exist
    /// remotely; only `winner` is in the index.
    #[error("activity {activity_id} duplicates indexed activity {winner} and could not be deleted: {cleanup}")]
    Duplicate {
        /// The activity this call created.
        activity_id: ActivityId,
        /// The activity already recorded for the fingerprint.
        winner: ActivityId,
        /// Fingerprint both activities were created for.
        fingerprint: Fingerprint,
        /// Why deleting `activity_id` failed.
        #[source]
        cleanup: RemoteError,
    },
}

impl CreateError {
    /// The remote activity this call created, if it got that far.
    pub fn activity_id(&self) -> Option<ActivityId> {
        match self {
            Self::Persistence { activity_id, .. } | Self::Duplicate { activity_id, .. } => {
                Some(*activity_id)
            }
            Self::Read(_) | Self::Fingerprint(_) | Self::Lookup(_) | Self::Remote(_) => None,
        }
    }

    /// True when the failed call left no remote side effect, so repeating
    /// it from scratch cannot leak a duplicate.
    pub fn is_side_effect_free(&self) -> bool {
        self.activity_id().is_none()
    }
}

/// Why [`CachingCreator::forget_activity`](crate::CachingCreator::forget_activity)
/// failed.
#[derive(Debug, thiserror::Error)]
pub enum ForgetError {
    /// The remote delete failed. The index was left untouched.
    #[error("failed to delete activity {activity_id}: {source}")]
    Remote {
        /// The activity that should have been deleted.
        activity_id: ActivityId,
        /// The remote failure.
        source: RemoteError,
    },

    /// The activity was deleted remotely but its index entries remain.
    #[error("activity {activity_id} was deleted but its index entries remain: {source}")]
    Index {
        /// The deleted activity.
        activity_id: ActivityId,
        /// The index failure.
        source: IndexError,
    },
}
