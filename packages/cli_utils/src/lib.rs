#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing shared by the safety map binaries.
//!
//! [`IndicatifProgress`] renders the scoring crate's [`ProgressCallback`]
//! as an `indicatif` bar, and [`init_logger`] routes `log` output through
//! the same [`MultiProgress`] so log lines print above the bars.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use safety_map_scoring::progress::ProgressCallback;

pub use indicatif::MultiProgress;

const POPULATIONS_TEMPLATE: &str = "{msg} {wide_bar:.green/dim} {pos}/{len} [{elapsed_precise}]";
const ROWS_TEMPLATE: &str = "  {msg} {wide_bar:.cyan/dim} {pos}/{len} {percent}% [{eta}]";
const WAITING_TEMPLATE: &str = "{spinner:.cyan} {msg}";

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

/// [`ProgressCallback`] backed by one `indicatif` bar.
pub struct IndicatifProgress {
    bar: ProgressBar,
    /// Applied when the total arrives.
    sized: ProgressStyle,
}

impl IndicatifProgress {
    /// Counts finished populations during a recompute, e.g. `3/8`.
    #[must_use]
    pub fn populations_bar(
        multi: &MultiProgress,
        message: &str,
        total: u64,
    ) -> Arc<dyn ProgressCallback> {
        let sized = bar_style(POPULATIONS_TEMPLATE);
        let bar = multi.add(ProgressBar::new(total).with_style(sized.clone()));
        bar.set_message(message.to_string());
        Arc::new(Self { bar, sized })
    }

    /// Spins until the export learns its row count, then shows percentage
    /// and ETA.
    #[must_use]
    pub fn rows_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        let waiting = ProgressStyle::with_template(WAITING_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let bar = multi.add(ProgressBar::new_spinner().with_style(waiting));
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_message(message.to_string());
        Arc::new(Self {
            bar,
            sized: bar_style(ROWS_TEMPLATE),
        })
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_style(self.sized.clone());
        self.bar.set_length(total);
        self.bar.reset();
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Installs `pretty_env_logger` (filtered by `RUST_LOG`) behind
/// `indicatif-log-bridge`.
///
/// Every progress bar must be added to the returned [`MultiProgress`].
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let max_level = logger.filter();

    // Already installed when several tests share a process.
    if indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .is_ok()
    {
        log::set_max_level(max_level);
    }

    multi
}
