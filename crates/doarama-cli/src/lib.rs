//! # doarama-cli: Activity Cache Command-Line Interface
//!
//! Inspects and maintains the local activity index that deduplicates
//! uploads. It never talks to the remote service; uploading lives in the
//! client that embeds [`doarama_cache::CachingCreator`].
//!
//! ## Subcommands
//!
//! - `fingerprint`: print the fingerprint of a track and its metadata
//! - `lookup`: report the activity cached for a track, if any
//! - `list`: dump every index entry
//! - `forget`: drop entries for an activity deleted elsewhere
//! - `stats`: index location, scheme and size
//!
//! Every subcommand accepts `--json` for machine-readable output.

pub mod fingerprint;
pub mod index;

use clap::Args;
use doarama_core::ActivityInfo;

/// Activity metadata flags for commands that fingerprint a track.
///
/// These must match the metadata the upload used, or the fingerprint will
/// differ.
#[derive(Args, Debug, Clone, Default)]
pub struct InfoArgs {
    /// Activity type identifier.
    #[arg(long)]
    pub type_id: Option<u32>,

    /// User display name attached to the activity.
    #[arg(long)]
    pub user_name: Option<String>,

    /// User avatar URL attached to the activity.
    #[arg(long)]
    pub user_avatar_url: Option<String>,
}

impl InfoArgs {
    /// The [`ActivityInfo`] these flags describe.
    pub fn to_info(&self) -> ActivityInfo {
        let mut info = ActivityInfo::default();
        if let Some(type_id) = self.type_id {
            info = ActivityInfo::with_type(type_id);
        }
        if let Some(name) = &self.user_name {
            info = info.user_name(name.clone());
        }
        if let Some(url) = &self.user_avatar_url {
            info = info.user_avatar_url(url.clone());
        }
        info
    }
}

/// Write `value` as pretty JSON followed by a newline.
pub(crate) fn write_json<T: serde::Serialize>(
    out: &mut dyn std::io::Write,
    value: &T,
) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
