mod commands;
mod progress;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spexredux", about = "CCD spectrograph reduction tool")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show FITS image or spectrum file details
    Info(commands::info::InfoArgs),
    /// Build master frames and measure the detector
    Calibrate(commands::calibrate::CalibrateArgs),
    /// Reduce a night of source frames into spectra
    Reduce(commands::reduce::ReduceArgs),
    /// Wavelength-calibrate extracted spectra
    Wavecal(commands::wavecal::WavecalArgs),
    /// Continuum-rectify calibrated spectra
    Rectify(commands::rectify::RectifyArgs),
    /// Print or save the default reduction config
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Info(args) => commands::info::run(args),
        Commands::Calibrate(args) => commands::calibrate::run(args),
        Commands::Reduce(args) => commands::reduce::run(args),
        Commands::Wavecal(args) => commands::wavecal::run(args),
        Commands::Rectify(args) => commands::rectify::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
