//! # Index Subcommands
//!
//! `lookup`, `list`, `forget` and `stats` over an opened [`SqliteIndex`].
//!
//! `forget` only edits the local index. Use it after deleting an activity
//! through the service's own tools, so the next upload of the same track
//! creates a fresh activity instead of returning a dead id.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgGroup, Args};
use doarama_cache::{ActivityIndex, IndexEntry, SqliteIndex};
use doarama_core::{ActivityId, Fingerprint, InfoDigest, TrackDigest, FINGERPRINT_SCHEME};
use serde::Serialize;

use crate::fingerprint::fingerprint_file;
use crate::{write_json, InfoArgs};

/// Exit code for a lookup that found nothing.
pub const EXIT_NOT_CACHED: u8 = 2;

/// Arguments for the lookup subcommand.
#[derive(Args, Debug)]
pub struct LookupArgs {
    /// Track file exactly as it was uploaded.
    pub file: PathBuf,

    #[command(flatten)]
    pub info: InfoArgs,
}

/// Arguments for the forget subcommand.
#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("target")
        .required(true)
        .args(["activity_id", "track_digest"]),
))]
pub struct ForgetArgs {
    /// Remove every entry pointing at this activity.
    #[arg(long)]
    pub activity_id: Option<ActivityId>,

    /// Hex track digest of the entry to remove.
    #[arg(long, requires = "info_digest")]
    pub track_digest: Option<TrackDigest>,

    /// Hex info digest of the entry to remove.
    #[arg(long, requires = "track_digest")]
    pub info_digest: Option<InfoDigest>,
}

#[derive(Serialize)]
struct LookupReport {
    fingerprint: Fingerprint,
    activity_id: Option<ActivityId>,
}

#[derive(Serialize)]
struct ForgetReport {
    removed: u64,
}

#[derive(Serialize)]
struct StatsReport<'a> {
    path: &'a Path,
    scheme: Option<String>,
    expected_scheme: &'static str,
    entries: u64,
    size_bytes: Option<u64>,
}

/// Execute the lookup subcommand. Exits with [`EXIT_NOT_CACHED`] on a miss.
pub async fn run_lookup(
    index: &SqliteIndex,
    args: &LookupArgs,
    json: bool,
    out: &mut dyn Write,
) -> Result<u8> {
    let fingerprint = fingerprint_file(&args.file, &args.info.to_info()).await?;
    let activity_id = index
        .lookup(&fingerprint)
        .await
        .context("index lookup failed")?;

    if json {
        write_json(
            out,
            &LookupReport {
                fingerprint,
                activity_id,
            },
        )?;
    } else {
        match activity_id {
            Some(id) => writeln!(out, "{id}")?,
            None => writeln!(out, "not cached: {fingerprint}")?,
        }
    }

    Ok(if activity_id.is_some() { 0 } else { EXIT_NOT_CACHED })
}

/// Execute the list subcommand.
pub async fn run_list(index: &SqliteIndex, json: bool, out: &mut dyn Write) -> Result<u8> {
    let entries: Vec<IndexEntry> = index.entries().await.context("failed to list index")?;

    if json {
        write_json(out, &entries)?;
        return Ok(0);
    }

    for entry in &entries {
        writeln!(
            out,
            "{:>12}  {}  {}",
            entry.activity_id, entry.fingerprint.track, entry.fingerprint.info
        )?;
    }
    writeln!(out)?;
    writeln!(out, "Total: {} entries", entries.len())?;
    Ok(0)
}

/// Execute the forget subcommand.
pub async fn run_forget(
    index: &SqliteIndex,
    args: &ForgetArgs,
    json: bool,
    out: &mut dyn Write,
) -> Result<u8> {
    let removed = match (args.activity_id, args.track_digest, args.info_digest) {
        (Some(id), _, _) => index
            .remove_activity(id)
            .await
            .with_context(|| format!("failed to forget activity {id}"))?,
        (None, Some(track), Some(info)) => {
            let fingerprint = Fingerprint::new(track, info);
            let existed = index
                .remove(&fingerprint)
                .await
                .with_context(|| format!("failed to forget {fingerprint}"))?;
            u64::from(existed)
        }
        _ => anyhow::bail!("pass --activity-id, or both --track-digest and --info-digest"),
    };

    tracing::info!(removed, "forgot index entries");
    if json {
        write_json(out, &ForgetReport { removed })?;
    } else {
        writeln!(out, "removed {removed} entries")?;
    }
    Ok(0)
}

/// Execute the stats subcommand.
pub async fn run_stats(index: &SqliteIndex, json: bool, out: &mut dyn Write) -> Result<u8> {
    let entries = index.count().await.context("failed to count entries")?;
    let scheme = index.scheme().await.context("failed to read scheme")?;
    let size_bytes = tokio::fs::metadata(index.path())
        .await
        .ok()
        .map(|m| m.len());

    let report = StatsReport {
        path: index.path(),
        scheme,
        expected_scheme: FINGERPRINT_SCHEME,
        entries,
        size_bytes,
    };

    if json {
        write_json(out, &report)?;
    } else {
        writeln!(out, "  path:    {}", report.path.display())?;
        writeln!(
            out,
            "  scheme:  {}",
            report.scheme.as_deref().unwrap_or("(none)")
        )?;
        writeln!(out, "  entries: {}", report.entries)?;
        if let Some(size) = report.size_bytes {
            writeln!(out, "  size:    {size} bytes")?;
        }
    }
    Ok(0)
}
