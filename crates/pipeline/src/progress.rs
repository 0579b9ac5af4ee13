//! Progress reporting port.
//!
//! The scheduler reports every finished work item here, whatever its outcome.
//! The CLI drives a progress bar from it; tests count calls.

use crate::{DimensionName, WorkItem};

/// How a single work item ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    /// A record was produced.
    Succeeded,
    /// Every attempt failed; the item stays missing.
    Failed,
    /// The run was cancelled before the item finished.
    Cancelled,
    /// The task generating the item panicked; the item stays missing.
    Lost,
}

/// Receives progress events from a running batch.
///
/// Called from the scheduler's collection loop, never concurrently.
pub trait ProgressObserver: Send + Sync {
    /// A dimension batch with `total` items is about to start.
    fn batch_started(&self, dimension: &DimensionName, total: usize);

    /// One item finished.
    fn item_finished(&self, item: &WorkItem, status: ItemStatus);

    /// The batch for `dimension` drained.
    fn batch_finished(&self, dimension: &DimensionName);
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn batch_started(&self, _dimension: &DimensionName, _total: usize) {}

    fn item_finished(&self, _item: &WorkItem, _status: ItemStatus) {}

    fn batch_finished(&self, _dimension: &DimensionName) {}
}
