//! Progress seam for recomputes and exports.
//!
//! The engine reports how many populations (or exported rows) are done
//! through [`ProgressCallback`]; the CLI renders that as `indicatif` bars
//! while the server and tests pass [`null_progress`].

use std::sync::Arc;

/// Receives progress updates from a long-running batch.
///
/// Populations are computed concurrently and share one reporter, hence
/// `Send + Sync`.
pub trait ProgressCallback: Send + Sync {
    /// Number of work items the batch will complete.
    fn set_total(&self, total: u64);

    /// `delta` more items are done.
    fn inc(&self, delta: u64);

    /// Replaces the status line.
    fn set_message(&self, msg: String);

    /// The batch is over.
    fn finish(&self, msg: String);
}

struct Silent;

impl ProgressCallback for Silent {
    fn set_total(&self, _: u64) {}

    fn inc(&self, _: u64) {}

    fn set_message(&self, _: String) {}

    fn finish(&self, _: String) {}
}

/// A reporter that discards every update.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(Silent)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    #[derive(Default)]
    struct Counter(AtomicU64);

    impl ProgressCallback for Counter {
        fn set_total(&self, _: u64) {}

        fn inc(&self, delta: u64) {
            self.0.fetch_add(delta, Ordering::Relaxed);
        }

        fn set_message(&self, _: String) {}

        fn finish(&self, _: String) {}
    }

    #[test]
    fn shared_reporter_sums_increments_across_threads() {
        let counter = Arc::new(Counter::default());
        std::thread::scope(|scope| {
            for _ in 0..4 {
                let counter = Arc::clone(&counter);
                scope.spawn(move || counter.inc(2));
            }
        });
        assert_eq!(counter.0.load(Ordering::Relaxed), 8);
    }

    #[test]
    fn null_progress_accepts_everything() {
        let progress = null_progress();
        progress.set_total(3);
        progress.inc(3);
        progress.set_message("scoring".to_string());
        progress.finish("done".to_string());
    }
}
