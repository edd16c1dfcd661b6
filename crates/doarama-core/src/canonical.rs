//! # Canonical Serialization: JCS Byte Production
//!
//! Activity metadata is hashed as RFC 8785 (JSON Canonicalization Scheme)
//! bytes: object keys sorted by code unit, no insignificant whitespace,
//! strings emitted as UTF-8. Two `ActivityInfo` values that compare equal
//! therefore always hash equal, whatever order their fields were set in.
//!
//! Floats are refused outright. Nothing in activity metadata needs one, and
//! their rendering is the one part of JCS that implementations disagree on.
//!
//! Changing this pipeline changes every info digest ever computed. Any
//! change must come with a new [`FINGERPRINT_SCHEME`](crate::FINGERPRINT_SCHEME)
//! tag so existing indexes are refused instead of silently missing.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// JCS bytes of a value, ready for hashing.
///
/// Only [`CanonicalBytes::new`] builds one, so an
/// [`InfoDigest`](crate::InfoDigest) can never be taken over ad hoc JSON.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Canonicalize `value`.
    ///
    /// # Errors
    ///
    /// [`CanonicalizationError::FloatRejected`] if any number in the value is
    /// not an integer, [`CanonicalizationError::SerializationFailed`] if it
    /// has no JSON form (for example a map with non-string keys).
    pub fn new(value: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let tree = serde_json::to_value(value)?;
        ensure_integral(&tree)?;
        Ok(Self(serde_jcs::to_vec(&tree)?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// Walk `tree` and fail on the first non-integral number.
fn ensure_integral(tree: &Value) -> Result<(), CanonicalizationError> {
    let mut pending = vec![tree];
    while let Some(node) = pending.pop() {
        match node {
            Value::Number(n) if n.as_i64().is_none() && n.as_u64().is_none() => {
                return Err(CanonicalizationError::FloatRejected(
                    n.as_f64().unwrap_or(f64::NAN),
                ));
            }
            Value::Array(items) => pending.extend(items),
            Value::Object(fields) => pending.extend(fields.values()),
            _ => {}
        }
    }
    Ok(())
}
