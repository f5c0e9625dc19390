use anyhow::{Context, Result};
use gkslo::aft::{build_tables, build_tables_strict, read_nodes, read_triangles, NodeOrder};
use std::path::PathBuf;

use crate::EngineArgs;

pub fn run(
    engine_args: &EngineArgs,
    gk_nodes: PathBuf,
    tm_nodes: PathBuf,
    triangles: PathBuf,
    output: Option<PathBuf>,
    easting_first: bool,
    strict: bool,
) -> Result<()> {
    let out_dir = output
        .or_else(|| engine_args.data_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    let order = if easting_first {
        NodeOrder::EastingFirst
    } else {
        NodeOrder::NorthingFirst
    };

    let gk = read_nodes(&gk_nodes, order)
        .with_context(|| format!("Failed to read nodes {}", gk_nodes.display()))?;
    let tm = read_nodes(&tm_nodes, order)
        .with_context(|| format!("Failed to read nodes {}", tm_nodes.display()))?;
    let triangles = read_triangles(&triangles)
        .with_context(|| format!("Failed to read triangles {}", triangles.display()))?;

    let built = if strict {
        build_tables_strict(&gk, &tm, &triangles)
    } else {
        build_tables(&gk, &tm, &triangles)
    };
    let (gk_tm, tm_gk) = built.context("Failed to build affine tables")?;

    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    for table in [&gk_tm, &tm_gk] {
        let path = out_dir.join(table.direction().file_name());
        table
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!(
            "{}: {} triangles written to {}",
            table.direction(),
            table.len(),
            path.display()
        );
    }

    Ok(())
}
