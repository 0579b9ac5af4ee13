//! Run driver: gap analysis, per-dimension batches and checkpoints.
//!
//! Every generation command goes through the same loop:
//!
//! 1. load the ledger,
//! 2. compute the gap report (optionally narrowed to one dimension or card),
//! 3. run one scheduler batch per incomplete dimension,
//! 4. merge the batch into the ledger and persist it before moving on.
//!
//! A crash therefore loses at most the dimension that was in flight, and a
//! restart picks up exactly where the last checkpoint left off.

use std::sync::Arc;

use pipeline::{
    gap, Card, CardKey, Catalog, Dimension, Direction, FailureRecord, GapReport, ItemFailure,
    Ledger, LedgerStore, PipelineError, RunId, StatusReport,
};
use tracing::{info, info_span, warn, Instrument};

use crate::Scheduler;

/// Which part of the matrix a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunScope {
    /// Every dimension.
    All,
    /// A single dimension, by name.
    Dimension(String),
    /// Every dimension for one card.
    Card {
        /// Card name.
        name: String,
        /// Card polarity.
        direction: Direction,
    },
}

/// Summary of a reconciliation run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Identifier attached to the run's span.
    pub run_id: RunId,
    /// Work items the run set out to generate.
    pub requested: usize,
    /// Dimensions whose batch was run and checkpointed.
    pub dimensions_processed: usize,
    /// Records added to the ledger.
    pub added: usize,
    /// Existing records replaced (forced runs only).
    pub replaced: usize,
    /// Items that exhausted their attempts.
    pub failures: Vec<ItemFailure>,
    /// Tasks that panicked.
    pub lost: usize,
    /// Items not attempted or interrupted because the run was cancelled.
    pub cancelled: usize,
    /// Completion of the ledger after the run.
    pub status: StatusReport,
}

impl RunReport {
    /// Returns `true` if there was no missing work to begin with.
    pub fn nothing_to_do(&self) -> bool {
        self.requested == 0
    }

    /// Returns `true` if the run stopped early on a cancel signal.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled > 0
    }

    /// Records in the ledger that count towards completion.
    pub fn total(&self) -> usize {
        self.status.generated
    }

    /// Size of the full matrix.
    pub fn expected(&self) -> usize {
        self.status.expected
    }

    /// Work items still missing.
    pub fn still_missing(&self) -> usize {
        self.status.still_missing()
    }
}

/// Summary of a sample run.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleReport {
    /// Distinct work items requested.
    pub requested: usize,
    /// Records written to the sample sink.
    pub generated: usize,
    /// Items that exhausted their attempts.
    pub failures: Vec<ItemFailure>,
    /// Items interrupted by cancellation.
    pub cancelled: usize,
}

/// Read-only access to the ledger held by `S`, checked against the catalog.
///
/// Needs no provider, so status checks and planning work without credentials.
pub struct LedgerView<S> {
    catalog: Arc<Catalog>,
    store: S,
    description: String,
}

impl<S: LedgerStore> LedgerView<S> {
    /// Creates a view over `store`.
    pub fn new(catalog: Arc<Catalog>, store: S) -> Self {
        Self {
            catalog,
            store,
            description: String::new(),
        }
    }

    /// Sets the description given to a ledger that has none.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// The ledger store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The catalog this view checks against.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Loads the ledger, dropping repeated keys (last occurrence wins).
    pub fn load_ledger(&self) -> Result<Ledger, PipelineError> {
        let mut ledger = self.store.load()?;
        if ledger.description.is_empty() {
            ledger.description.clone_from(&self.description);
        }
        let removed = ledger.dedupe();
        if removed > 0 {
            warn!(
                removed,
                location = %self.store.location(),
                "dropped duplicate records from ledger"
            );
        }
        Ok(ledger)
    }

    /// Reports completion without generating or persisting anything.
    pub fn check_status(&self) -> Result<StatusReport, PipelineError> {
        let ledger = self.load_ledger()?;
        Ok(StatusReport::build(&self.catalog, &ledger))
    }

    /// The work a run over `scope` would request, without running it.
    pub fn plan(&self, scope: &RunScope, force: bool) -> Result<GapReport, PipelineError> {
        let target = self.resolve(scope)?;
        let ledger = self.load_ledger()?;
        Ok(self.gaps_for(&ledger, &target, force))
    }

    fn gaps_for(&self, ledger: &Ledger, target: &Target, force: bool) -> GapReport {
        let gaps = if force {
            GapReport::everything(&self.catalog)
        } else {
            gap::missing(&self.catalog, &ledger.grouped())
        };
        match target {
            Target::All => gaps,
            Target::Dimension(name) => gaps.restrict_to_dimension(name),
            Target::Card(key) => gaps.restrict_to_card(key),
        }
    }

    fn resolve(&self, scope: &RunScope) -> Result<Target, PipelineError> {
        match scope {
            RunScope::All => Ok(Target::All),
            RunScope::Dimension(name) => self
                .catalog
                .find_dimension(name)
                .map(|d| Target::Dimension(d.name.to_string()))
                .ok_or_else(|| PipelineError::UnknownDimension(name.clone())),
            RunScope::Card { name, direction } => self
                .catalog
                .find_card(name, *direction)
                .map(|c| Target::Card(c.key()))
                .ok_or_else(|| PipelineError::UnknownCard(format!("{name} ({direction})"))),
        }
    }
}

/// Reconciles the ledger held by `S` against the catalog.
pub struct Reconciler<S> {
    view: LedgerView<S>,
    scheduler: Scheduler,
}

impl<S: LedgerStore> Reconciler<S> {
    /// Creates a reconciler.
    pub fn new(catalog: Arc<Catalog>, store: S, scheduler: Scheduler) -> Self {
        Self {
            view: LedgerView::new(catalog, store),
            scheduler,
        }
    }

    /// Sets the description stored in newly created ledgers.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.view = self.view.with_description(description);
        self
    }

    /// The ledger store.
    pub fn store(&self) -> &S {
        self.view.store()
    }

    /// The catalog this reconciler targets.
    pub fn catalog(&self) -> &Catalog {
        self.view.catalog()
    }

    /// See [`LedgerView::load_ledger`].
    pub fn load_ledger(&self) -> Result<Ledger, PipelineError> {
        self.view.load_ledger()
    }

    /// See [`LedgerView::check_status`].
    pub fn check_status(&self) -> Result<StatusReport, PipelineError> {
        self.view.check_status()
    }

    /// See [`LedgerView::plan`].
    pub fn plan(&self, scope: &RunScope, force: bool) -> Result<GapReport, PipelineError> {
        self.view.plan(scope, force)
    }

    /// Fills every gap in the ledger. With `force`, regenerates everything.
    pub async fn run_all(&self, force: bool) -> Result<RunReport, PipelineError> {
        self.run(RunScope::All, force).await
    }

    /// Fills the gap of a single dimension.
    pub async fn run_dimension(&self, name: &str) -> Result<RunReport, PipelineError> {
        self.run(RunScope::Dimension(name.to_string()), false).await
    }

    /// Fills every missing dimension of a single card.
    pub async fn run_card(
        &self,
        name: &str,
        direction: Direction,
    ) -> Result<RunReport, PipelineError> {
        self.run(
            RunScope::Card {
                name: name.to_string(),
                direction,
            },
            false,
        )
        .await
    }

    /// Runs the gap → batch → checkpoint loop over `scope`.
    ///
    /// Per-item failures are reported, not returned. Errors are returned only
    /// for an unknown target or when the ledger cannot be loaded or persisted.
    pub async fn run(&self, scope: RunScope, force: bool) -> Result<RunReport, PipelineError> {
        let run_id = RunId::new_random();
        let span = info_span!("reconcile", %run_id, ?scope, force);
        self.run_inner(run_id, scope, force).instrument(span).await
    }

    async fn run_inner(
        &self,
        run_id: RunId,
        scope: RunScope,
        force: bool,
    ) -> Result<RunReport, PipelineError> {
        let view = &self.view;
        let catalog = view.catalog();
        let target = view.resolve(&scope)?;
        let mut ledger = view.load_ledger()?;
        let gaps = view.gaps_for(&ledger, &target, force);

        let mut report = RunReport {
            run_id,
            requested: gaps.total_missing(),
            dimensions_processed: 0,
            added: 0,
            replaced: 0,
            failures: Vec::new(),
            lost: 0,
            cancelled: 0,
            status: StatusReport::build(catalog, &ledger),
        };

        if gaps.is_empty() {
            info!(
                generated = report.total(),
                expected = report.expected(),
                "nothing to do"
            );
            return Ok(report);
        }
        info!(
            dimensions = gaps.gaps().len(),
            items = report.requested,
            "starting generation"
        );

        let model = self.model();
        let cancel = self.scheduler.worker().cancel_signal().clone();
        for dimension_gap in gaps.gaps() {
            if cancel.is_cancelled() {
                report.cancelled += dimension_gap.missing.len();
                continue;
            }
            let Some(dimension) = catalog.find_dimension(dimension_gap.dimension.as_str())
            else {
                continue;
            };
            let cards: Vec<Card> = dimension_gap
                .missing
                .iter()
                .filter_map(|key| catalog.card(key).cloned())
                .collect();

            let batch = self.scheduler.run_dimension_batch(dimension, cards).await;

            let merged = ledger.merge(batch.records);
            ledger.record_failures(batch.failures.iter().map(FailureRecord::from));
            ledger.model = Some(model.clone());
            ledger.touch();
            view.store().persist(&ledger)?;

            info!(
                dimension = %dimension.name,
                added = merged.added,
                replaced = merged.replaced,
                failed = batch.failures.len(),
                total = ledger.len(),
                "checkpoint written"
            );

            report.dimensions_processed += 1;
            report.added += merged.added;
            report.replaced += merged.replaced;
            report.failures.extend(batch.failures);
            report.lost += batch.lost;
            report.cancelled += batch.cancelled.len();
        }

        report.status = StatusReport::build(catalog, &ledger);
        info!(
            generated = report.total(),
            expected = report.expected(),
            still_missing = report.still_missing(),
            failed = report.failures.len(),
            cancelled = report.cancelled,
            "run finished"
        );
        Ok(report)
    }

    /// Generates `count` debug samples into `sink`, ignoring the ledger.
    ///
    /// Sample `i` pairs card `i % cards` with dimension `i % dimensions`.
    /// Repeated pairs are generated once.
    pub async fn run_sample(
        &self,
        count: usize,
        sink: &impl LedgerStore,
    ) -> Result<SampleReport, PipelineError> {
        let run_id = RunId::new_random();
        let span = info_span!("sample", %run_id, count);
        self.run_sample_inner(count, sink).instrument(span).await
    }

    async fn run_sample_inner(
        &self,
        count: usize,
        sink: &impl LedgerStore,
    ) -> Result<SampleReport, PipelineError> {
        let plan = sample_plan(self.view.catalog(), count);
        let mut samples = Ledger::new(format!("{} (samples)", self.view.description).trim());
        samples.model = Some(self.model());
        let mut report = SampleReport {
            requested: plan.iter().map(|(_, cards)| cards.len()).sum(),
            generated: 0,
            failures: Vec::new(),
            cancelled: 0,
        };

        let cancel = self.scheduler.worker().cancel_signal().clone();
        for (dimension, cards) in plan {
            if cancel.is_cancelled() {
                report.cancelled += cards.len();
                continue;
            }
            let batch = self.scheduler.run_dimension_batch(dimension, cards).await;
            report.generated += batch.records.len();
            report.cancelled += batch.cancelled.len();
            samples.merge(batch.records);
            samples.record_failures(batch.failures.iter().map(FailureRecord::from));
            report.failures.extend(batch.failures);
        }

        samples.touch();
        sink.persist(&samples)?;
        info!(
            generated = report.generated,
            location = %sink.location(),
            "samples written"
        );
        Ok(report)
    }

    fn model(&self) -> String {
        self.scheduler.worker().settings().model.to_string()
    }
}

enum Target {
    All,
    Dimension(String),
    Card(CardKey),
}

/// Groups the first `count` (card, dimension) pairs by dimension, in order of
/// first appearance, without repeating a card within a dimension.
fn sample_plan(catalog: &Catalog, count: usize) -> Vec<(&Dimension, Vec<Card>)> {
    let cards = catalog.all_cards();
    let dimensions = catalog.all_dimensions();
    let mut plan: Vec<(&Dimension, Vec<Card>)> = Vec::new();

    for i in 0..count {
        let card = &cards[i % cards.len()];
        let dimension = &dimensions[i % dimensions.len()];
        let slot = match plan.iter().position(|(d, _)| d.name == dimension.name) {
            Some(index) => index,
            None => {
                plan.push((dimension, Vec::new()));
                plan.len() - 1
            }
        };
        let batch = &mut plan[slot].1;
        if !batch.iter().any(|c| c.key() == card.key()) {
            batch.push(card.clone());
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use pipeline::{CardName, DimensionName};

    use super::*;

    fn catalog(cards: usize, dimensions: usize) -> Catalog {
        Catalog::new(
            (0..cards)
                .map(|i| Card {
                    name: CardName::new(format!("c{i}")).unwrap(),
                    direction: Direction::Upright,
                    summary: String::new(),
                    detail: String::new(),
                })
                .collect(),
            (0..dimensions)
                .map(|i| Dimension {
                    name: DimensionName::new(format!("d{i}")).unwrap(),
                    category: "x".into(),
                    description: String::new(),
                    aspect: None,
                    aspect_type: None,
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn sample_plan_cycles_cards_and_dimensions() {
        let catalog = catalog(3, 2);
        let plan = sample_plan(&catalog, 4);

        let names: Vec<(String, Vec<String>)> = plan
            .iter()
            .map(|(d, cards)| {
                (
                    d.name.to_string(),
                    cards.iter().map(|c| c.name.to_string()).collect(),
                )
            })
            .collect();
        assert_eq!(
            names,
            vec![
                ("d0".to_string(), vec!["c0".to_string(), "c2".to_string()]),
                ("d1".to_string(), vec!["c1".to_string(), "c0".to_string()]),
            ]
        );
    }

    #[test]
    fn sample_plan_does_not_repeat_pairs() {
        let catalog = catalog(1, 1);
        let plan = sample_plan(&catalog, 5);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].1.len(), 1);
    }
}
