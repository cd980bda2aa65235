use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use spexredux_core::consts::DEFAULT_CONTINUUM_WINDOW;
use spexredux_core::io::spectrum_io::{read_spectrum, write_spectrum};
use spexredux_core::rectify::rectify;

use super::wavecal::output_path;

#[derive(Args)]
pub struct RectifyArgs {
    /// Wavelength-calibrated spectrum files
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Continuum wavelength (repeat for each anchor, at least two)
    #[arg(short, long = "anchor", required = true)]
    pub anchors: Vec<f64>,

    /// Width of the window around each anchor, in wavelength units
    #[arg(long, default_value_t = DEFAULT_CONTINUUM_WINDOW)]
    pub window: f64,

    /// Output directory (files are updated in place when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: &RectifyArgs) -> Result<()> {
    if args.anchors.len() < 2 {
        bail!("At least two continuum anchors are needed");
    }

    for file in &args.files {
        let mut spectrum =
            read_spectrum(file).with_context(|| format!("Failed to read {}", file.display()))?;
        rectify(&mut spectrum, &args.anchors, args.window)
            .with_context(|| format!("Rectification failed for {}", spectrum.name))?;

        let path = output_path(args.output.as_deref(), file)?;
        write_spectrum(&spectrum, &path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("  {:<20} {}", spectrum.name, path.display());
    }
    println!("{} spectra rectified", args.files.len());
    Ok(())
}
