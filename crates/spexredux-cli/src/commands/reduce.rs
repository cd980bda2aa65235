use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use spexredux_core::io::spectrum_io::write_spectra;
use spexredux_core::pipeline::{
    reduce_night_reported, CancelToken, ProgressReporter, ReductionStage,
};

use super::night::NightArgs;
use crate::progress::IndicatifReporter;
use crate::summary::print_reduction_summary;

#[derive(Args)]
pub struct ReduceArgs {
    #[command(flatten)]
    pub night: NightArgs,

    /// Directory for the extracted spectra
    #[arg(short, long, default_value = "spectra")]
    pub output: PathBuf,

    /// Export master bias, flat and darks to this directory
    #[arg(long)]
    pub masters: Option<PathBuf>,
}

pub fn run(args: &ReduceArgs) -> Result<()> {
    let mut config = args.night.load_config()?;
    if let Some(ref dir) = args.masters {
        config.masters_dir = Some(dir.clone());
    }
    let inputs = args.night.inputs();

    let reporter = Arc::new(IndicatifReporter::new()?);
    let reduction = reduce_night_reported(&inputs, &config, reporter.clone(), &CancelToken::new())
        .context("Reduction failed")?;

    let count = reduction.spectra.len();
    reporter.begin_stage(ReductionStage::Writing, Some(count));
    let written = write_spectra(&reduction.spectra, &args.output)
        .with_context(|| format!("Failed to write spectra to {}", args.output.display()))?;
    reporter.advance(count);
    reporter.finish_stage();
    reporter.finish();

    print_reduction_summary(
        &reduction.profile,
        &reduction.spectra,
        &reduction.skipped,
        &written,
    );
    println!(
        "{} spectra saved to {}",
        written.len(),
        args.output.display()
    );
    Ok(())
}
