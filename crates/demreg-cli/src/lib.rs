//! # demreg-cli
//!
//! The `demreg` command: align a DEM to a reference, replay a saved
//! transformation, inspect it, or export the stable-terrain mask.
//!
//! ```text
//! demreg align --reference ref.tif --tba dem.tif --out aligned.tif --save-transform fit.json
//! demreg apply --transform fit.json --dem other.tif --out other_aligned.tif
//! demreg info --transform fit.json
//! demreg mask --reference ref.tif --tba dem.tif --out mask.tif
//! ```

pub mod commands;
mod error;

pub use error::CliError;

use clap::{Parser, Subcommand};

/// Result type for CLI commands.
pub type Result<T> = std::result::Result<T, CliError>;

/// DEM coregistration tool.
#[derive(Debug, Parser)]
#[command(name = "demreg")]
#[command(version, about = "Coregister digital elevation models", long_about = None)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence.
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fit a coregistration and write the aligned DEM
    Align(commands::align::AlignArgs),
    /// Apply a saved transformation to a DEM
    Apply(commands::apply::ApplyArgs),
    /// Show a saved transformation
    Info(commands::info::InfoArgs),
    /// Write the inlier mask used for alignment
    Mask(commands::mask::MaskArgs),
}

/// Execute a parsed command line.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Align(args) => commands::align::execute(args),
        Commands::Apply(args) => commands::apply::execute(args),
        Commands::Info(args) => commands::info::execute(args),
        Commands::Mask(args) => commands::mask::execute(args),
    }
}
