use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use gkslo::gendata::GridKind;
use gkslo::{Conversion, GeoidModel, HeightMode};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

/// Coordinate conversion between D48/GK, D96/TM and ETRS89
#[derive(Parser)]
#[command(name = "gk-slo")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    engine: EngineArgs,

    /// Increase log verbosity (-d, -dd)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    debug: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that builds an engine.
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// Directory containing geoid grids and affine tables
    #[arg(long, env = "GKSLO_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Geoid model on WGS84 (slo, egm)
    #[arg(short, long, env = "GKSLO_GEOID", default_value = "slo", global = true)]
    pub geoid: GeoidModel,

    /// Output height policy (default, transformed, copied, geoid)
    #[arg(long, env = "GKSLO_HEIGHT", default_value = "default", global = true)]
    pub height: HeightMode,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert coordinate files (xyz text, CSV or GeoJSON)
    Convert {
        /// Conversion number (1-10) or name (e.g. gk-tm, tm-gk-aft)
        #[arg(short = 't', long = "type")]
        conversion: Conversion,

        /// Input files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file for all inputs, "-" for stdout
        /// (default: <input>.out next to each input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Swap the first two values of every record
        #[arg(short, long)]
        reverse: bool,

        /// Append degrees, minutes and seconds to geographic output
        #[arg(long)]
        dms: bool,

        /// Use the full conversion for points outside the affine table
        #[arg(long)]
        fallback: bool,

        /// Number of files converted in parallel (default: all cores)
        #[arg(short, long, env = "GKSLO_JOBS")]
        jobs: Option<usize>,

        #[command(flatten)]
        columns: commands::convert::Columns,
    },

    /// Convert a single point
    Point {
        /// Conversion number (1-10) or name
        #[arg(short = 't', long = "type")]
        conversion: Conversion,

        /// Latitude, or easting for projected input
        #[arg(allow_hyphen_values = true)]
        first: f64,

        /// Longitude, or northing for projected input
        #[arg(allow_hyphen_values = true)]
        second: f64,

        /// Height
        #[arg(default_value_t = 0.0, allow_hyphen_values = true)]
        height: f64,

        /// Use the full conversion if the point is outside the affine table
        #[arg(long)]
        fallback: bool,

        /// Output result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Build affine tables from node and triangle files
    BuildAft {
        /// D48/GK node file
        gk_nodes: PathBuf,

        /// D96/TM node file
        tm_nodes: PathBuf,

        /// Triangle file
        triangles: PathBuf,

        /// Output directory (default: the data directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Node lines are <label> <easting> <northing>
        #[arg(long)]
        easting_first: bool,

        /// Fail if the node files differ in length instead of using the
        /// shorter one
        #[arg(long)]
        strict: bool,
    },

    /// Convert the reference point through every full conversion
    Reftest,

    /// Generate a regular test grid inside Slovenia
    Gendata {
        /// Grid coordinates (tm, gk, wgs)
        kind: GridKind,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show loaded data files and height policies
    Info,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.debug, cli.quiet);

    match cli.command {
        Commands::Convert {
            conversion,
            inputs,
            output,
            reverse,
            dms,
            fallback,
            jobs,
            columns,
        } => commands::convert::run(
            &cli.engine,
            conversion,
            inputs,
            output,
            gkslo::BatchOptions {
                height_mode: cli.engine.height,
                reverse,
                dms,
                fallback,
            },
            jobs,
            columns,
            cli.quiet,
        ),
        Commands::Point {
            conversion,
            first,
            second,
            height,
            fallback,
            json,
        } => commands::point::run(
            &cli.engine,
            conversion,
            (first, second, height),
            fallback,
            json,
        ),
        Commands::BuildAft {
            gk_nodes,
            tm_nodes,
            triangles,
            output,
            easting_first,
            strict,
        } => commands::build_aft::run(
            &cli.engine,
            gk_nodes,
            tm_nodes,
            triangles,
            output,
            easting_first,
            strict,
        ),
        Commands::Reftest => commands::reftest::run(&cli.engine),
        Commands::Gendata { kind, output } => commands::gendata::run(kind, output),
        Commands::Info => commands::info::run(&cli.engine),
    }
}

fn init_logging(debug: u8, quiet: bool) {
    let level = match (quiet, debug) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    // RUST_LOG takes precedence over -d/-q
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gkslo={level},gk_slo={level}")));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
