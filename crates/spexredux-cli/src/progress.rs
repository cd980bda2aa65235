use std::sync::atomic::{AtomicU64, Ordering};

use indicatif::{ProgressBar, ProgressStyle};
use spexredux_core::pipeline::{ProgressReporter, ReductionStage};

/// Drives one terminal progress bar through the reduction stages.
pub struct IndicatifReporter {
    pb: ProgressBar,
    position: AtomicU64,
}

impl IndicatifReporter {
    pub fn new() -> anyhow::Result<Self> {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg:26} [{bar:40}] {pos}/{len}")?
                .progress_chars("=> "),
        );
        Ok(Self {
            pb,
            position: AtomicU64::new(0),
        })
    }

    pub fn finish(&self) {
        self.pb.finish_with_message("Done");
    }
}

impl ProgressReporter for IndicatifReporter {
    fn begin_stage(&self, stage: ReductionStage, total_items: Option<usize>) {
        self.position.store(0, Ordering::Relaxed);
        self.pb.set_message(stage.to_string());
        // Stages of unknown size show as a single step.
        self.pb.set_length(total_items.unwrap_or(1) as u64);
        self.pb.set_position(0);
    }

    fn advance(&self, items_done: usize) {
        // Workers may report out of order; only move forward.
        let done = items_done as u64;
        let previous = self.position.fetch_max(done, Ordering::Relaxed);
        if done > previous {
            self.pb.set_position(done);
        }
    }

    fn finish_stage(&self) {
        if let Some(len) = self.pb.length() {
            self.pb.set_position(len);
        }
    }
}
