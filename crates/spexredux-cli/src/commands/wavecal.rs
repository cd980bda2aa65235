use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::Args;
use spexredux_core::io::spectrum_io::{read_spectrum, write_spectrum};
use spexredux_core::spectrum::Spectrum;
use spexredux_core::wavecal::{require_solved, snap_to_line, LineKeys, ReferencePoint};

/// A `PIXEL:WAVELENGTH` pair given on the command line.
#[derive(Clone, Copy, Debug)]
pub struct PointArg {
    pub pixel: f64,
    pub wavelength: f64,
}

impl FromStr for PointArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (pixel, wavelength) = s
            .split_once(':')
            .ok_or_else(|| format!("expected PIXEL:WAVELENGTH, got '{s}'"))?;
        let pixel: f64 = pixel
            .trim()
            .parse()
            .map_err(|e| format!("bad pixel '{pixel}': {e}"))?;
        let wavelength: f64 = wavelength
            .trim()
            .parse()
            .map_err(|e| format!("bad wavelength '{wavelength}': {e}"))?;
        if pixel < 0.0 {
            return Err(format!("pixel must be >= 0, got {pixel}"));
        }
        Ok(Self { pixel, wavelength })
    }
}

#[derive(Args)]
pub struct WavecalArgs {
    /// Spectrum files written by `reduce`
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Reference line as PIXEL:WAVELENGTH (at least two)
    #[arg(short, long = "point", required = true)]
    pub points: Vec<PointArg>,

    /// Move each pixel to the deepest lamp value within 5 px
    #[arg(long)]
    pub snap: bool,

    /// Keep the line spacing of the given points and re-anchor it on each
    /// spectrum at the line nearest the first point
    #[arg(long)]
    pub keyed: bool,

    /// Output directory (files are updated in place when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: &WavecalArgs) -> Result<()> {
    if args.points.len() < 2 {
        bail!("At least two reference points are needed");
    }
    let keys = if args.keyed {
        let pixels: Vec<usize> = args.points.iter().map(|p| p.pixel.round() as usize).collect();
        LineKeys::from_pixels(&pixels)
    } else {
        None
    };
    let mut wavelengths: Vec<PointArg> = args.points.clone();
    wavelengths.sort_by(|a, b| a.pixel.total_cmp(&b.pixel));

    let mut spectra = args
        .files
        .iter()
        .map(|p| read_spectrum(p).with_context(|| format!("Failed to read {}", p.display())))
        .collect::<Result<Vec<Spectrum>>>()?;

    for spectrum in &mut spectra {
        let points = match &keys {
            Some(keys) => keyed_points(spectrum, keys, &wavelengths)?,
            None => args
                .points
                .iter()
                .map(|p| {
                    let pixel = if args.snap {
                        snapped(spectrum, p.pixel)
                    } else {
                        p.pixel
                    };
                    ReferencePoint::new(pixel, p.wavelength)
                })
                .collect(),
        };
        spectrum.reset_wavelengths(false);
        spectrum
            .select_reference_points(points)
            .with_context(|| format!("Invalid reference points for {}", spectrum.name))?;
        spectrum
            .solve_wavelengths()
            .with_context(|| format!("Wavelength solution failed for {}", spectrum.name))?;
        if let Some(fit) = spectrum.wavecal.fit() {
            println!(
                "  {:<20} degree {}  {:.2} .. {:.2}",
                spectrum.name,
                fit.degree(),
                spectrum.wv.first().copied().unwrap_or(f64::NAN),
                spectrum.wv.last().copied().unwrap_or(f64::NAN)
            );
        }
    }
    require_solved(&spectra)?;

    for (spectrum, source) in spectra.iter().zip(&args.files) {
        let path = output_path(args.output.as_deref(), source)?;
        write_spectrum(spectrum, &path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    println!("{} spectra calibrated", spectra.len());
    Ok(())
}

fn snapped(spectrum: &Spectrum, pixel: f64) -> f64 {
    snap_to_line(&spectrum.waves, pixel.round() as usize).map_or(pixel, |i| i as f64)
}

/// Snap the first line on this spectrum, then walk the learned spacing,
/// snapping each placed line in turn.
fn keyed_points(
    spectrum: &Spectrum,
    keys: &LineKeys,
    wavelengths: &[PointArg],
) -> Result<Vec<ReferencePoint>> {
    let anchor = snapped(spectrum, wavelengths[0].pixel).round() as usize;
    let placed = keys.place(anchor, spectrum.len());
    if placed.len() < wavelengths.len() {
        bail!(
            "Only {} of {} lines fit on {}",
            placed.len(),
            wavelengths.len(),
            spectrum.name
        );
    }
    Ok(placed
        .iter()
        .zip(wavelengths)
        .map(|(&pixel, p)| ReferencePoint::new(snapped(spectrum, pixel as f64), p.wavelength))
        .collect())
}

pub fn output_path(output: Option<&Path>, source: &Path) -> Result<PathBuf> {
    match output {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            let name = source
                .file_name()
                .with_context(|| format!("{} has no file name", source.display()))?;
            Ok(dir.join(name))
        }
        None => Ok(source.to_path_buf()),
    }
}
