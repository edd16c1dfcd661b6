//! # doarama-cache: Idempotent Activity Creation
//!
//! Creating an activity on the visualisation service uploads a track and
//! allocates a new remote resource on every call. This crate puts a durable,
//! content-addressed index in front of that call so that re-running an
//! upload (after a crash, a timeout, or by accident) returns the activity
//! that already exists instead of creating another.
//!
//! ## Components
//!
//! - [`RemoteCreator`]: the non-idempotent remote operation, supplied by
//!   the caller.
//! - [`ActivityIndex`]: the durable fingerprint → activity mapping, with
//!   [`SqliteIndex`] and [`MemoryIndex`] backends.
//! - [`FingerprintLocks`]: in-process mutual exclusion per fingerprint.
//! - [`CachingCreator`]: ties them together.
//!
//! ## Concurrency
//!
//! Identical requests in one process are serialized by [`FingerprintLocks`]
//! and never both reach the remote service. Across processes sharing one
//! SQLite file, the composite primary key decides; the loser deletes its
//! own duplicate and returns the winner's id.
//!
//! ## Example
//!
//! ```no_run
//! use doarama_cache::{CachingCreator, RemoteCreator, SqliteIndex};
//! use doarama_core::ActivityInfo;
//!
//! # async fn run(remote: impl RemoteCreator) -> Result<(), Box<dyn std::error::Error>> {
//! let index = SqliteIndex::open("activities.db").await?;
//! let cache = CachingCreator::new(remote, index);
//! let track = tokio::fs::File::open("flight.igc").await?;
//! let created = cache
//!     .create("flight.igc", track, &ActivityInfo::with_type(23u32))
//!     .await?;
//! println!("activity {}", created.activity_id);
//! cache.close().await;
//! # Ok(())
//! # }
//! ```

pub mod caching;
pub mod config;
pub mod creator;
pub mod error;
pub mod index;
pub mod locks;

pub use caching::{CachingCreator, Creation, CreationOutcome};
pub use config::{CacheConfig, ConfigError};
pub use creator::{RemoteCreator, RemoteError};
pub use error::{CreateError, ForgetError, IndexError};
pub use index::{ActivityIndex, IndexEntry, MemoryIndex, SqliteIndex};
pub use locks::{FingerprintGuard, FingerprintLocks};
