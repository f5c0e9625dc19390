use anyhow::{Context, Result};
use gkslo::gendata::{write_grid, GridKind};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

pub fn run(kind: GridKind, output: Option<PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            let file = File::create(&path)
                .with_context(|| format!("Failed to create output file {}", path.display()))?;
            let count = write_grid(kind, BufWriter::new(file))?;
            tracing::info!("{count} {kind} points written to {}", path.display());
        }
        None => {
            let count = write_grid(kind, BufWriter::new(std::io::stdout().lock()))?;
            tracing::debug!("{count} {kind} points written");
        }
    }
    Ok(())
}
