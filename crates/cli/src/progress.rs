//! Progress bar driven by the scheduler's progress events.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};
use pipeline::{DimensionName, ItemStatus, ProgressObserver, WorkItem};

const TEMPLATE: &str = "{msg:20} [{bar:40.cyan/blue}] {pos}/{len} ({eta})";

/// One bar per dimension batch. Hidden automatically when stderr is not a
/// terminal.
#[derive(Default)]
pub struct BarProgress {
    bar: Mutex<Option<ProgressBar>>,
    failed: AtomicUsize,
}

impl BarProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        let guard = self.bar.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(bar) = guard.as_ref() {
            f(bar);
        }
    }
}

impl ProgressObserver for BarProgress {
    fn batch_started(&self, dimension: &DimensionName, total: usize) {
        let style = ProgressStyle::default_bar()
            .template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        let bar = ProgressBar::new(total as u64).with_style(style);
        bar.set_message(dimension.to_string());
        self.failed.store(0, Ordering::Relaxed);

        let mut guard = self.bar.lock().unwrap_or_else(|p| p.into_inner());
        *guard = Some(bar);
    }

    fn item_finished(&self, item: &WorkItem, status: ItemStatus) {
        let failed = match status {
            ItemStatus::Succeeded => self.failed.load(Ordering::Relaxed),
            ItemStatus::Failed | ItemStatus::Cancelled | ItemStatus::Lost => {
                self.failed.fetch_add(1, Ordering::Relaxed) + 1
            }
        };
        self.with_bar(|bar| {
            if failed > 0 {
                bar.set_message(format!("{} ({failed} failed)", item.dimension));
            }
            bar.inc(1);
        });
    }

    fn batch_finished(&self, _dimension: &DimensionName) {
        let mut guard = self.bar.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(bar) = guard.take() {
            bar.finish();
        }
    }
}
