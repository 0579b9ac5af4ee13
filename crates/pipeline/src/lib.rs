//! Core generation domain for Arcana.
//!
//! This crate contains every domain concept, newtype identifier, shared value
//! type and error type used to fill the card × dimension interpretation
//! matrix. Infrastructure crates implement the ports defined here; they never
//! add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; the `store` and `llm` crates define *how* to
//! supply it, and the `engine` crate drives it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`CardName`, `DimensionName`, `RunId`, ...) |
//! | [`types`] | Cards, dimensions, work items, generation records |
//! | [`errors`] | Per-attempt, per-item and run-halting error types |
//! | [`catalog`] | The static card × dimension key space |
//! | [`ledger`] | Persisted records, grouping, merge, and the [`LedgerStore`] port |
//! | [`gap`] | Missing-work computation |
//! | [`status`] | Read-only completion report |
//! | [`prompt`] | Prompt template parsing and rendering |
//! | [`provider`] | The [`LlmProvider`] port |
//! | [`progress`] | The [`ProgressObserver`] port |

pub mod catalog;
pub mod errors;
pub mod gap;
pub mod identifiers;
pub mod ledger;
pub mod progress;
pub mod prompt;
pub mod provider;
pub mod status;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use catalog::Catalog;
pub use errors::{
    AttemptError, CatalogError, ContentError, ItemFailure, LedgerError, PipelineError,
    ProviderError, TemplateError,
};
pub use gap::{DimensionGap, GapReport};
pub use identifiers::{CardName, DimensionName, ModelName, RunId};
pub use ledger::{group_by_dimension, GroupedRecords, Ledger, LedgerStore, MergeStats, LEDGER_VERSION};
pub use progress::{ItemStatus, NoProgress, ProgressObserver};
pub use prompt::PromptTemplate;
pub use provider::{ChatMessage, ChatRequest, ChatRole, LlmProvider};
pub use status::{DimensionStatus, StatusReport};
pub use types::{
    Card, CardKey, Dimension, Direction, FailureRecord, GenerationRecord, ParseDirectionError,
    RecordKey, Timestamp, WorkItem,
};
