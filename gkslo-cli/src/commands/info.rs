use anyhow::Result;
use gkslo::{AffineDirection, Conversion, GeoidModel};

use crate::EngineArgs;

pub fn run(engine_args: &EngineArgs) -> Result<()> {
    let engine = super::build_engine(engine_args)?;

    match &engine_args.data_dir {
        Some(dir) => println!("Data directory: {}", dir.display()),
        None => println!("Data directory: (none)"),
    }
    println!();

    println!("Geoid grids:");
    for model in [GeoidModel::Slo2000, GeoidModel::Egm2008] {
        let selected = if model == engine.geoid_model() { "*" } else { " " };
        let name = model.to_string();
        match engine.geoids().iter().find(|g| g.model() == model) {
            Some(grid) => {
                let total = grid.rows() * grid.cols();
                println!(
                    " {selected} {name:<8} {}x{} samples, {} valid ({:.1}%)",
                    grid.rows(),
                    grid.cols(),
                    grid.valid_count(),
                    grid.valid_count() as f64 / total as f64 * 100.0
                );
            }
            None => println!(" {selected} {name:<8} not loaded"),
        }
    }
    println!();

    println!("Affine tables:");
    for direction in [AffineDirection::GkToTm, AffineDirection::TmToGk] {
        match engine.table(direction) {
            Some(table) => println!("   {direction}  {} triangles", table.len()),
            None => println!("   {direction}  not loaded"),
        }
    }
    println!();

    println!("Height policy (--height {}):", engine.height_mode());
    for conversion in Conversion::ALL {
        let mode = match engine.height_mode() {
            gkslo::HeightMode::Default => conversion.default_height_mode(),
            mode => mode,
        };
        println!(
            "  {:>2} {:<11} {}",
            conversion.number(),
            conversion.label(),
            mode
        );
    }

    Ok(())
}
