use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use spexredux_core::io::image_io::{load_frame, save_image};
use spexredux_core::io::spectrum_io::read_spectrum;
use spexredux_core::stats::{nan_mean, nan_median, nan_std};

#[derive(Args)]
pub struct InfoArgs {
    /// Input FITS frame or spectrum text file
    pub file: PathBuf,

    /// Save a stretched preview of a frame (.png or .tiff)
    #[arg(long)]
    pub preview: Option<PathBuf>,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let is_spectrum = args
        .file
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
    if is_spectrum {
        spectrum_info(&args.file)
    } else {
        frame_info(&args.file, args.preview.as_deref())
    }
}

fn frame_info(path: &Path, preview: Option<&Path>) -> Result<()> {
    let frame = load_frame(path)?;
    let pixels: Vec<f64> = frame.data.iter().copied().collect();
    let mut sorted = pixels.clone();

    println!("File:        {}", path.display());
    println!("Dimensions:  {}x{}", frame.cols(), frame.rows());
    match frame.exptime() {
        Some(t) => println!("Exposure:    {t} s"),
        None => println!("Exposure:    (no EXPTIME)"),
    }
    println!("Mean:        {:.3}", nan_mean(&pixels));
    println!("Median:      {:.3}", nan_median(&mut sorted));
    println!("Std dev:     {:.3}", nan_std(&pixels));

    let header = &frame.metadata.header;
    if !header.is_empty() {
        println!("Header:");
        for (key, value) in header.iter() {
            println!("  {:<10}{}", key, value);
        }
    }

    if let Some(out) = preview {
        save_image(&frame, out)
            .with_context(|| format!("Failed to write preview {}", out.display()))?;
        println!("Preview saved to {}", out.display());
    }
    Ok(())
}

fn spectrum_info(path: &Path) -> Result<()> {
    let spectrum = read_spectrum(path)?;

    println!("File:        {}", path.display());
    println!("Name:        {}", spectrum.name);
    println!("Bins:        {}", spectrum.len());
    if spectrum.has_wavelengths() {
        let first = spectrum.wv.first().copied().unwrap_or(f64::NAN);
        let last = spectrum.wv.last().copied().unwrap_or(f64::NAN);
        println!("Wavelength:  {first:.2} .. {last:.2}");
    } else {
        println!("Wavelength:  uncalibrated");
    }
    println!("Mean SNR:    {:.1}", spectrum.mean_snr());
    let rectified = spectrum.rectified.iter().any(|&v| v != 0.0);
    println!("Rectified:   {}", if rectified { "yes" } else { "no" });
    Ok(())
}
