//! Generation engine for Arcana.
//!
//! Drives the ports defined in `pipeline`: a shared [`RateLimiter`] gates
//! every provider call, a [`GenerationWorker`] turns one work item into a
//! record with bounded retries, the [`Scheduler`] fans a dimension's missing
//! cards out over a bounded set of tasks, and the [`Reconciler`] checkpoints
//! the ledger after every dimension.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`rate_limit`] | Minimum-interval request gate |
//! | [`retry`] | Attempt cap and backoff schedule |
//! | [`cancel`] | Cooperative cancellation signal |
//! | [`worker`] | Prompt, call, validate, retry for one work item |
//! | [`scheduler`] | Bounded concurrent batch per dimension |
//! | [`runner`] | Gap analysis, batches and checkpoints |
//! | `testing` | Scripted provider and in-memory ledger store (feature `testing`) |

pub mod cancel;
pub mod rate_limit;
pub mod retry;
pub mod runner;
pub mod scheduler;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod worker;

pub use cancel::{CancelHandle, CancelSignal};
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
pub use runner::{LedgerView, Reconciler, RunReport, RunScope, SampleReport};
pub use scheduler::{BatchOutcome, Scheduler};
pub use worker::{GenerationSettings, GenerationWorker, ItemOutcome};
