//! # Fingerprint Subcommand
//!
//! Computes the index key for a track file and its metadata without
//! touching the index.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use doarama_core::{ActivityInfo, Fingerprint, FINGERPRINT_SCHEME};
use serde::Serialize;

use crate::{write_json, InfoArgs};

/// Arguments for the fingerprint subcommand.
#[derive(Args, Debug)]
pub struct FingerprintArgs {
    /// Track file exactly as it would be uploaded.
    pub file: PathBuf,

    #[command(flatten)]
    pub info: InfoArgs,
}

#[derive(Serialize)]
struct FingerprintReport<'a> {
    file: &'a Path,
    scheme: &'static str,
    fingerprint: Fingerprint,
}

/// Read `path` and fingerprint it together with `info`.
pub async fn fingerprint_file(path: &Path, info: &ActivityInfo) -> Result<Fingerprint> {
    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read track file: {}", path.display()))?;
    Fingerprint::compute(&content, info).context("failed to canonicalize activity info")
}

/// Execute the fingerprint subcommand.
pub async fn run_fingerprint(
    args: &FingerprintArgs,
    json: bool,
    out: &mut dyn Write,
) -> Result<u8> {
    let fingerprint = fingerprint_file(&args.file, &args.info.to_info()).await?;

    if json {
        write_json(
            out,
            &FingerprintReport {
                file: &args.file,
                scheme: FINGERPRINT_SCHEME,
                fingerprint,
            },
        )?;
    } else {
        writeln!(out, "  file:   {}", args.file.display())?;
        writeln!(out, "  track:  {}", fingerprint.track)?;
        writeln!(out, "  info:   {}", fingerprint.info)?;
        writeln!(out, "  scheme: {FINGERPRINT_SCHEME}")?;
    }
    Ok(0)
}
