//! `demreg info`

use super::read_text;
use crate::Result;
use clap::Args;
use demreg_coreg::FittedTransformation;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Transformation saved by `align --save-transform`
    #[arg(long)]
    pub transform: PathBuf,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: InfoArgs) -> Result<()> {
    let fitted = FittedTransformation::from_json(&read_text(&args.transform)?)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&fitted)?);
    } else {
        println!(
            "Method: {} ({})",
            fitted.method,
            if fitted.transform.is_affine() { "affine" } else { "non-affine" }
        );
        println!("{}", fitted);
    }
    Ok(())
}
