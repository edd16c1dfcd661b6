//! # Activity Types
//!
//! Identifiers and metadata for activities on the visualisation service.
//!
//! [`ActivityId`] is allocated by the remote service and only referenced
//! here. [`ActivityInfo`] is the metadata attached to an activity at
//! creation time: it is forwarded to the service unchanged and also
//! digested into the [`InfoDigest`](crate::InfoDigest) half of a
//! fingerprint.

use serde::{Deserialize, Serialize};

use crate::canonical::CanonicalBytes;
use crate::error::CanonicalizationError;

/// Identifier of an activity, allocated by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityId(i64);

impl ActivityId {
    /// Wrap an identifier returned by the remote service.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Access the raw identifier.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for ActivityId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ActivityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ActivityId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Identifier of an activity type (paraglider, hike, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityTypeId(u32);

impl ActivityTypeId {
    /// Wrap a raw activity type identifier.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Access the raw identifier.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for ActivityTypeId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ActivityTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata attached to an activity.
///
/// The JSON form matches the service's wire names. Absent fields and empty
/// strings are both omitted, so `user_name: Some("")` and `user_name: None`
/// describe the same activity and digest identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityInfo {
    /// Activity type.
    #[serde(
        rename = "activityTypeId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub type_id: Option<ActivityTypeId>,
    /// Display name of the user who recorded the track.
    #[serde(default, skip_serializing_if = "is_blank")]
    pub user_name: Option<String>,
    /// URL of the user's avatar image.
    #[serde(default, skip_serializing_if = "is_blank")]
    pub user_avatar_url: Option<String>,
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, str::is_empty)
}

impl ActivityInfo {
    /// Metadata carrying only an activity type.
    pub fn with_type(type_id: impl Into<ActivityTypeId>) -> Self {
        Self {
            type_id: Some(type_id.into()),
            ..Self::default()
        }
    }

    /// Set the user display name.
    pub fn user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    /// Set the user avatar URL.
    pub fn user_avatar_url(mut self, url: impl Into<String>) -> Self {
        self.user_avatar_url = Some(url.into());
        self
    }

    /// Canonical serialization used for digesting.
    pub fn canonical_bytes(&self) -> Result<CanonicalBytes, CanonicalizationError> {
        CanonicalBytes::new(self)
    }
}
