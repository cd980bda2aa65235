use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use spexredux_core::pipeline::config::ReductionConfig;
use spexredux_core::pipeline::NightInputs;

/// Frame sets shared by the commands that reduce a night.
#[derive(Args)]
pub struct NightArgs {
    /// Source (science) FITS frames
    #[arg(long = "source", required = true, num_args = 1..)]
    pub sources: Vec<PathBuf>,

    /// Bias frames
    #[arg(long, required = true, num_args = 1..)]
    pub bias: Vec<PathBuf>,

    /// Flat-field frames
    #[arg(long = "flat", required = true, num_args = 1..)]
    pub flats: Vec<PathBuf>,

    /// Dark frames, grouped by exposure time
    #[arg(long = "dark", num_args = 1..)]
    pub darks: Vec<PathBuf>,

    /// Arc-lamp frames: one shared, or one per source
    #[arg(long = "lamp", num_args = 1..)]
    pub lamps: Vec<PathBuf>,

    /// Object names file, one name per line
    #[arg(long)]
    pub names: Option<PathBuf>,

    /// Directory that relative frame paths are resolved against
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Reduction config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl NightArgs {
    pub fn inputs(&self) -> NightInputs {
        let dir = self.data_dir.as_deref();
        NightInputs {
            sources: resolve_all(dir, &self.sources),
            names: self.names.as_deref().map(|p| resolve(dir, p)),
            bias: resolve_all(dir, &self.bias),
            flats: resolve_all(dir, &self.flats),
            darks: resolve_all(dir, &self.darks),
            lamps: resolve_all(dir, &self.lamps),
        }
    }

    pub fn load_config(&self) -> Result<ReductionConfig> {
        load_config(self.config.as_deref())
    }
}

/// Join relative paths onto `data_dir` when one is given.
pub fn resolve(data_dir: Option<&Path>, path: &Path) -> PathBuf {
    match data_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}

pub fn resolve_all(data_dir: Option<&Path>, paths: &[PathBuf]) -> Vec<PathBuf> {
    paths.iter().map(|p| resolve(data_dir, p)).collect()
}

pub fn load_config(path: Option<&Path>) -> Result<ReductionConfig> {
    let Some(path) = path else {
        return Ok(ReductionConfig::default());
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: ReductionConfig = toml::from_str(&contents).context("Invalid reduction config")?;
    config.validate()?;
    Ok(config)
}
