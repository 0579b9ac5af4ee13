//! Bounded fan-out of one dimension's missing cards.

use std::collections::HashMap;
use std::sync::Arc;

use pipeline::{
    Card, Dimension, GenerationRecord, ItemFailure, ItemStatus, NoProgress, ProgressObserver,
    WorkItem,
};
use tokio::task::{Id, JoinSet};
use tracing::{error, info, instrument};

use crate::{GenerationWorker, ItemOutcome};

/// Results of one dimension batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    /// Records produced, in completion order.
    pub records: Vec<GenerationRecord>,
    /// Items that exhausted their attempts.
    pub failures: Vec<ItemFailure>,
    /// Items stopped by cancellation, including those never admitted.
    pub cancelled: Vec<WorkItem>,
    /// Tasks that panicked. Their items stay missing.
    pub lost: usize,
}

impl BatchOutcome {
    /// Returns `true` if any item of the batch was cancelled.
    pub fn was_cancelled(&self) -> bool {
        !self.cancelled.is_empty()
    }
}

/// Runs work items with at most `batch_size` in flight.
///
/// A new item is admitted as soon as any in-flight item finishes, so a slow
/// call only ever holds one slot.
pub struct Scheduler {
    worker: Arc<GenerationWorker>,
    batch_size: usize,
    progress: Arc<dyn ProgressObserver>,
}

impl Scheduler {
    /// Creates a scheduler; a `batch_size` of 0 is treated as 1.
    pub fn new(worker: GenerationWorker, batch_size: usize) -> Self {
        Self {
            worker: Arc::new(worker),
            batch_size: batch_size.max(1),
            progress: Arc::new(NoProgress),
        }
    }

    /// Reports per-item progress to `progress`.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressObserver>) -> Self {
        self.progress = progress;
        self
    }

    /// The worker shared by every task.
    pub fn worker(&self) -> &GenerationWorker {
        &self.worker
    }

    /// Generates `dimension` for every card in `cards`.
    ///
    /// Once cancellation is signalled no further items are admitted; items
    /// still queued are reported as cancelled without being attempted.
    #[instrument(name = "dimension_batch", skip_all, fields(dimension = %dimension.name, cards = cards.len()))]
    pub async fn run_dimension_batch(&self, dimension: &Dimension, cards: Vec<Card>) -> BatchOutcome {
        self.progress.batch_started(&dimension.name, cards.len());

        let dimension = Arc::new(dimension.clone());
        let cancel = self.worker.cancel_signal().clone();
        let mut queue = cards.into_iter();
        let mut in_flight = JoinSet::new();
        let mut admitted: HashMap<Id, WorkItem> = HashMap::new();
        let mut outcome = BatchOutcome::default();

        loop {
            while in_flight.len() < self.batch_size && !cancel.is_cancelled() {
                let Some(card) = queue.next() else { break };
                let item = WorkItem {
                    card: card.key(),
                    dimension: dimension.name.clone(),
                };
                let worker = Arc::clone(&self.worker);
                let dimension = Arc::clone(&dimension);
                let task = in_flight.spawn(async move { worker.generate(&card, &dimension).await });
                admitted.insert(task.id(), item);
            }

            let Some(joined) = in_flight.join_next_with_id().await else {
                break;
            };
            match joined {
                Ok((id, item_outcome)) => {
                    admitted.remove(&id);
                    self.collect(item_outcome, &mut outcome);
                }
                Err(join_error) => {
                    outcome.lost += 1;
                    match admitted.remove(&join_error.id()) {
                        Some(item) => {
                            error!(item = %item, error = %join_error, "generation task did not complete");
                            self.progress.item_finished(&item, ItemStatus::Lost);
                        }
                        None => error!(error = %join_error, "generation task did not complete"),
                    }
                }
            }
        }

        for card in queue {
            let item = WorkItem {
                card: card.key(),
                dimension: dimension.name.clone(),
            };
            self.progress.item_finished(&item, ItemStatus::Cancelled);
            outcome.cancelled.push(item);
        }

        info!(
            generated = outcome.records.len(),
            failed = outcome.failures.len(),
            cancelled = outcome.cancelled.len(),
            lost = outcome.lost,
            "dimension batch finished"
        );
        self.progress.batch_finished(&dimension.name);
        outcome
    }

    fn collect(&self, item_outcome: ItemOutcome, outcome: &mut BatchOutcome) {
        let item = item_outcome.item();
        match item_outcome {
            ItemOutcome::Succeeded(record) => {
                self.progress.item_finished(&item, ItemStatus::Succeeded);
                outcome.records.push(record);
            }
            ItemOutcome::Failed(failure) => {
                self.progress.item_finished(&item, ItemStatus::Failed);
                outcome.failures.push(failure);
            }
            ItemOutcome::Cancelled(item) => {
                self.progress.item_finished(&item, ItemStatus::Cancelled);
                outcome.cancelled.push(item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use pipeline::{CardName, DimensionName, Direction, ModelName, PromptTemplate, ProviderError};

    use super::*;
    use crate::testing::ScriptedProvider;
    use crate::{CancelHandle, GenerationSettings, RateLimiter, RetryPolicy};

    fn cards(n: usize) -> Vec<Card> {
        (0..n)
            .map(|i| Card {
                name: CardName::new(format!("card-{i}")).unwrap(),
                direction: Direction::Upright,
                summary: String::new(),
                detail: String::new(),
            })
            .collect()
    }

    fn dimension() -> Dimension {
        Dimension {
            name: DimensionName::new("love").unwrap(),
            category: "relationships".into(),
            description: String::new(),
            aspect: None,
            aspect_type: None,
        }
    }

    fn worker(provider: Arc<ScriptedProvider>) -> GenerationWorker {
        GenerationWorker::new(
            provider,
            Arc::new(RateLimiter::unlimited()),
            Arc::new(PromptTemplate::parse("{card_name} / {dimension_name}").unwrap()),
            GenerationSettings {
                model: ModelName::new("m").unwrap(),
                temperature: 0.1,
                max_tokens: 10,
                call_timeout: Duration::from_secs(60),
            },
            RetryPolicy::no_delay(3),
        )
    }

    #[derive(Default)]
    struct Counting {
        started: AtomicUsize,
        succeeded: AtomicUsize,
        failed: AtomicUsize,
        lost: AtomicUsize,
        finished: AtomicUsize,
    }

    impl ProgressObserver for Counting {
        fn batch_started(&self, _dimension: &DimensionName, total: usize) {
            self.started.fetch_add(total, Ordering::SeqCst);
        }

        fn item_finished(&self, _item: &WorkItem, status: ItemStatus) {
            match status {
                ItemStatus::Succeeded => self.succeeded.fetch_add(1, Ordering::SeqCst),
                ItemStatus::Lost => self.lost.fetch_add(1, Ordering::SeqCst),
                _ => self.failed.fetch_add(1, Ordering::SeqCst),
            };
        }

        fn batch_finished(&self, _dimension: &DimensionName) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_never_exceeds_batch_size() {
        let provider = Arc::new(ScriptedProvider::echo().with_latency(Duration::from_millis(250)));
        let scheduler = Scheduler::new(worker(provider.clone()), 4);

        let outcome = scheduler.run_dimension_batch(&dimension(), cards(17)).await;

        assert_eq!(outcome.records.len(), 17);
        assert_eq!(provider.call_count(), 17);
        assert_eq!(provider.peak_concurrency(), 4);
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_batch() {
        let provider = Arc::new(ScriptedProvider::new(|prompt, _| {
            if prompt.starts_with("card-3 ") {
                Err(ProviderError::Status {
                    status: 500,
                    body: "boom".into(),
                })
            } else {
                Ok("fine".into())
            }
        }));
        let progress = Arc::new(Counting::default());
        let scheduler = Scheduler::new(worker(provider.clone()), 3).with_progress(progress.clone());

        let outcome = scheduler.run_dimension_batch(&dimension(), cards(6)).await;

        assert_eq!(outcome.records.len(), 5);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].item.card.name.as_str(), "card-3");
        assert_eq!(outcome.failures[0].attempts, 3);
        assert_eq!(progress.started.load(Ordering::SeqCst), 6);
        assert_eq!(progress.succeeded.load(Ordering::SeqCst), 5);
        assert_eq!(progress.failed.load(Ordering::SeqCst), 1);
        assert_eq!(progress.finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicked_task_is_lost_but_still_ticks_progress() {
        let provider = Arc::new(ScriptedProvider::new(|prompt, _| {
            if prompt.starts_with("card-1 ") {
                panic!("responder blew up");
            }
            Ok("fine".into())
        }));
        let progress = Arc::new(Counting::default());
        let scheduler = Scheduler::new(worker(provider), 2).with_progress(progress.clone());

        let outcome = scheduler.run_dimension_batch(&dimension(), cards(3)).await;

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.lost, 1);
        assert_eq!(progress.started.load(Ordering::SeqCst), 3);
        assert_eq!(progress.succeeded.load(Ordering::SeqCst), 2);
        assert_eq!(progress.lost.load(Ordering::SeqCst), 1);
        assert_eq!(progress.failed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelled_batch_admits_nothing() {
        let provider = Arc::new(ScriptedProvider::echo());
        let handle = CancelHandle::new();
        handle.cancel();
        let scheduler = Scheduler::new(worker(provider.clone()).with_cancel(handle.signal()), 2);

        let outcome = scheduler.run_dimension_batch(&dimension(), cards(5)).await;

        assert!(outcome.records.is_empty());
        assert_eq!(outcome.cancelled.len(), 5);
        assert!(outcome.was_cancelled());
        assert_eq!(provider.call_count(), 0);
    }
}
