//! # doarama-core: Foundational Types for the Activity Cache
//!
//! This crate defines the value types shared by every other crate in the
//! workspace. It depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **`CanonicalBytes` newtype.** Activity metadata is digested only
//!    after passing through `CanonicalBytes::new()`. Two logically equal
//!    `ActivityInfo` values always produce the same bytes, so they always
//!    produce the same [`InfoDigest`].
//!
//! 2. **Distinct digest types.** [`TrackDigest`] covers raw uploaded bytes,
//!    [`InfoDigest`] covers canonical metadata. They are separate types so a
//!    track digest cannot be bound where an info digest is expected.
//!
//! 3. **One fingerprint scheme.** [`FINGERPRINT_SCHEME`] names the digest
//!    algorithm and canonicalization in use. Persisted indexes record it and
//!    refuse to open under a different scheme.
//!
//! 4. **Plain identifiers.** [`ActivityId`] is a copyable value owned by the
//!    caller. No handle to a remote client is carried around.
//!
//! ## Crate Policy
//!
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod activity;
pub mod canonical;
pub mod digest;
pub mod error;

// Re-export primary types for ergonomic imports.
pub use activity::{ActivityId, ActivityInfo, ActivityTypeId};
pub use canonical::CanonicalBytes;
pub use digest::{Fingerprint, InfoDigest, TrackDigest, DIGEST_LEN, FINGERPRINT_SCHEME};
pub use error::{CanonicalizationError, DigestParseError};
