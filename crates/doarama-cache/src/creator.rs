//! # Remote Creator Interface
//!
//! Abstracts the remote "upload a track and create an activity" operation.
//! Production code implements it against the visualisation service's HTTP
//! API; tests use counting fakes.
//!
//! `create_activity` is NOT idempotent: every call allocates a new activity,
//! even for identical arguments. That is the expense the cache exists to
//! avoid. `delete_activity` removes an activity and is used to discard the
//! duplicate created by the loser of a cross-process race.

use async_trait::async_trait;
use doarama_core::{ActivityId, ActivityInfo};

/// Errors reported by a [`RemoteCreator`].
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The request never produced a response (connection, TLS, DNS).
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("service returned {status}: {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Message reported by the service.
        message: String,
    },

    /// The call did not complete within the configured timeout.
    #[error("remote call timed out after {elapsed_ms}ms")]
    Timeout {
        /// Elapsed time in milliseconds before the timeout fired.
        elapsed_ms: u64,
    },

    /// Any other failure.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// The external, non-idempotent activity creation operation.
///
/// Implementations must be `Send + Sync` so one instance can serve many
/// concurrent `create` calls.
#[async_trait]
pub trait RemoteCreator: Send + Sync {
    /// Upload `content` as `name` and create an activity carrying `info`.
    ///
    /// Returns the id of a newly allocated activity.
    async fn create_activity(
        &self,
        name: &str,
        content: &[u8],
        info: &ActivityInfo,
    ) -> Result<ActivityId, RemoteError>;

    /// Delete an activity previously returned by `create_activity`.
    async fn delete_activity(&self, id: ActivityId) -> Result<(), RemoteError>;
}

#[async_trait]
impl<T: RemoteCreator + ?Sized> RemoteCreator for std::sync::Arc<T> {
    async fn create_activity(
        &self,
        name: &str,
        content: &[u8],
        info: &ActivityInfo,
    ) -> Result<ActivityId, RemoteError> {
        (**self).create_activity(name, content, info).await
    }

    async fn delete_activity(&self, id: ActivityId) -> Result<(), RemoteError> {
        (**self).delete_activity(id).await
    }
}
