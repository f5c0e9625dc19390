pub mod build_aft;
pub mod convert;
pub mod gendata;
pub mod info;
pub mod point;
pub mod reftest;

use anyhow::{bail, Context, Result};
use gkslo::{Engine, EngineBuilder};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

use crate::EngineArgs;

/// Highest numbered suffix tried for `<input>.out.N`.
const MAX_OUTPUT_SUFFIX: usize = 15;

/// Build the engine from the global options.
///
/// Without a data directory the engine runs without geoid grids and
/// affine tables.
pub fn build_engine(args: &EngineArgs) -> Result<Engine> {
    let builder = match &args.data_dir {
        Some(dir) => EngineBuilder::new(dir),
        None => {
            tracing::warn!(
                "no data directory, running without geoid and affine tables. \
                 Use --data-dir or set GKSLO_DATA_DIR"
            );
            EngineBuilder::default()
        }
    };

    builder
        .geoid_model(args.geoid)
        .height_mode(args.height)
        .build()
        .context("Failed to load conversion data")
}

pub fn progress_bar(len: u64, hidden: bool) -> Result<ProgressBar> {
    if hidden {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// First free name among `<input>.out`, `<input>.out.1` ... `<input>.out.15`.
pub fn output_path(input: &Path) -> Result<PathBuf> {
    let base = format!("{}.out", input.display());
    let free = std::iter::once(PathBuf::from(&base))
        .chain((1..=MAX_OUTPUT_SUFFIX).map(|n| PathBuf::from(format!("{base}.{n}"))))
        .find(|p| !p.exists());

    match free {
        Some(path) => Ok(path),
        None => bail!(
            "No free output name for {} (tried up to {base}.{MAX_OUTPUT_SUFFIX})",
            input.display()
        ),
    }
}
