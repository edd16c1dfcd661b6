//! # Digests and Fingerprints
//!
//! A [`Fingerprint`] identifies one creation request: the exact bytes of an
//! uploaded track plus the metadata attached to it.
//!
//! - [`TrackDigest`] is SHA-256 over the raw track bytes, unmodified.
//! - [`InfoDigest`] is SHA-256 over the canonical bytes of an
//!   [`ActivityInfo`], and can only be computed from [`CanonicalBytes`].
//!
//! Identical requests always produce identical fingerprints. Two requests
//! may share one half of a fingerprint (the same metadata for different
//! tracks is the common case), so only the pair identifies a request.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::activity::ActivityInfo;
use crate::canonical::CanonicalBytes;
use crate::error::{CanonicalizationError, DigestParseError};

/// Width of each digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// Tag naming the digest algorithm and metadata canonicalization.
///
/// Persisted alongside every index. Bump the version suffix whenever either
/// the algorithm or the canonical encoding changes.
pub const FINGERPRINT_SCHEME: &str = "sha256/jcs-rfc8785/v1";

/// Defines a fixed-width SHA-256 digest newtype with hex rendering and
/// parsing. Serde uses the hex form.
macro_rules! sha256_newtype {
    ($(#[$meta:meta])* $ty:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $ty([u8; DIGEST_LEN]);

        impl $ty {
            /// Wrap raw digest bytes.
            pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
                Self(bytes)
            }

            /// Wrap a digest read back from storage.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, DigestParseError> {
                let array: [u8; DIGEST_LEN] =
                    bytes
                        .try_into()
                        .map_err(|_| DigestParseError::InvalidLength {
                            expected: DIGEST_LEN,
                            actual: bytes.len(),
                        })?;
                Ok(Self(array))
            }

            /// Parse a 64-character hex string (either case).
            pub fn from_hex(s: &str) -> Result<Self, DigestParseError> {
                decode_hex(s).map(Self)
            }

            /// Access the raw digest bytes.
            pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
                &self.0
            }

            /// Render the digest as a lowercase hex string.
            pub fn to_hex(&self) -> String {
                self.0.iter().map(|b| format!("{b:02x}")).collect()
            }
        }

        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($ty), self.to_hex())
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = DigestParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::from_hex(&raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

sha256_newtype!(
    /// SHA-256 over the exact bytes of an uploaded track.
    TrackDigest
);

sha256_newtype!(
    /// SHA-256 over the canonical serialization of activity metadata.
    InfoDigest
);

impl TrackDigest {
    /// Digest raw track content.
    pub fn of(content: &[u8]) -> Self {
        Self(sha256(content))
    }
}

impl InfoDigest {
    /// Digest canonical metadata bytes.
    ///
    /// Accepts only `&CanonicalBytes`, so every info digest has passed
    /// through the canonicalization pipeline.
    pub fn of(canonical: &CanonicalBytes) -> Self {
        Self(sha256(canonical.as_bytes()))
    }
}

/// Composite key identifying one creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Digest of the raw track bytes.
    pub track: TrackDigest,
    /// Digest of the canonical metadata.
    pub info: InfoDigest,
}

impl Fingerprint {
    /// Assemble a fingerprint from its two halves.
    pub fn new(track: TrackDigest, info: InfoDigest) -> Self {
        Self { track, info }
    }

    /// Fingerprint a creation request.
    ///
    /// `content` is only borrowed; the caller keeps it for the upload.
    ///
    /// # Errors
    ///
    /// Fails only if `info` cannot be canonicalized.
    pub fn compute(content: &[u8], info: &ActivityInfo) -> Result<Self, CanonicalizationError> {
        let canonical = info.canonical_bytes()?;
        Ok(Self {
            track: TrackDigest::of(content),
            info: InfoDigest::of(&canonical),
        })
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.track, self.info)
    }
}

fn sha256(data: &[u8]) -> [u8; DIGEST_LEN] {
    let hash = Sha256::digest(data);
    let mut bytes = [0u8; DIGEST_LEN];
    bytes.copy_from_slice(&hash);
    bytes
}

fn decode_hex(s: &str) -> Result<[u8; DIGEST_LEN], DigestParseError> {
    if s.len() != DIGEST_LEN * 2 {
        return Err(DigestParseError::InvalidLength {
            expected: DIGEST_LEN,
            actual: s.len() / 2,
        });
    }
    let mut out = [0u8; DIGEST_LEN];
    for (offset, c) in s.char_indices() {
        let nibble = c
            .to_digit(16)
            .ok_or(DigestParseError::InvalidHex {
                character: c,
                offset,
            })? as u8;
        let byte = &mut out[offset / 2];
        *byte = (*byte << 4) | nibble;
    }
    Ok(out)
}
