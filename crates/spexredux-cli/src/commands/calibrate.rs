use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use spexredux_core::io::image_io::{load_frame, load_stack};
use spexredux_core::pipeline::{build_calibration, NoOpReporter};

use super::night::{load_config, resolve_all};
use crate::summary::print_profile;

#[derive(Args)]
pub struct CalibrateArgs {
    /// Bias frames
    #[arg(long, required = true, num_args = 1..)]
    pub bias: Vec<PathBuf>,

    /// Flat-field frames
    #[arg(long = "flat", required = true, num_args = 1..)]
    pub flats: Vec<PathBuf>,

    /// Dark frames, grouped by exposure time
    #[arg(long = "dark", num_args = 1..)]
    pub darks: Vec<PathBuf>,

    /// Directory that relative frame paths are resolved against
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Reduction config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory for the master frames
    #[arg(short, long, default_value = "masters")]
    pub output: PathBuf,
}

/// Build master frames and print the detector profile without reducing sources.
pub fn run(args: &CalibrateArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    config.masters_dir = Some(args.output.clone());

    let dir = args.data_dir.as_deref();
    let bias = load_stack(&resolve_all(dir, &args.bias)).context("Failed to load bias frames")?;
    let flats = load_stack(&resolve_all(dir, &args.flats)).context("Failed to load flat frames")?;
    let darks = resolve_all(dir, &args.darks)
        .iter()
        .map(|p| load_frame(p))
        .collect::<spexredux_core::error::Result<Vec<_>>>()
        .context("Failed to load dark frames")?;

    let calibration = build_calibration(&bias, &flats, darks, &config, &NoOpReporter)?;

    print_profile(&calibration.profile);
    println!(
        "Master frames saved to {} ({} dark exposure(s))",
        args.output.display(),
        calibration.master_darks.len()
    );
    Ok(())
}
