//! Error types for the generation domain.
//!
//! Failures are layered by blast radius:
//!
//! - [`ProviderError`] and [`ContentError`] describe one failed attempt. They
//!   are always retried by the worker, up to its attempt cap.
//! - [`ItemFailure`] is what remains once a work item has exhausted its
//!   attempts. It is reported and the item stays missing; the run continues.
//! - [`PipelineError`] halts a run: bad configuration, an unreadable catalog,
//!   or a ledger that can no longer be loaded or persisted.

use std::time::Duration;

use thiserror::Error;

use crate::{CardKey, DimensionName, WorkItem};

// ---------------------------------------------------------------------------
// Per-attempt errors
// ---------------------------------------------------------------------------

/// Failure of a single call to an LLM provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The request never produced an HTTP response (DNS, connect, TLS, reset).
    #[error("transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// The provider answered with a non-success status (including quota and
    /// rate-limit responses).
    #[error("provider returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated by the adapter.
        body: String,
    },

    /// The call did not complete within the configured per-call timeout.
    #[error("provider call timed out after {after:?}")]
    Timeout {
        /// The timeout that elapsed.
        after: Duration,
    },

    /// The response body did not have the expected shape.
    #[error("malformed provider response: {message}")]
    MalformedResponse {
        /// What was wrong with the response.
        message: String,
    },
}

/// The provider answered successfully but the content is unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContentError {
    /// The text was empty or whitespace only.
    #[error("provider returned empty content")]
    Empty,
}

/// Why a single generation attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    /// The provider call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
    /// The provider call succeeded with unusable content.
    #[error(transparent)]
    Content(#[from] ContentError),
}

/// A work item that exhausted its attempts without producing a record.
///
/// Terminal for the current run only: the item is still missing from the
/// ledger and will be picked up again by the next reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{item} failed after {attempts} attempt(s): {last_error}")]
pub struct ItemFailure {
    /// The item that could not be generated.
    pub item: WorkItem,
    /// How many attempts were made.
    pub attempts: u32,
    /// The error from the final attempt.
    pub last_error: AttemptError,
}

// ---------------------------------------------------------------------------
// Component errors
// ---------------------------------------------------------------------------

/// Failure to load or persist the ledger.
///
/// Messages carry the adapter's description; this crate performs no I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The backing store could not be read.
    #[error("failed to read ledger from {location}: {message}")]
    Read {
        /// Where the ledger lives (path, URL, ...).
        location: String,
        /// Adapter-supplied description.
        message: String,
    },

    /// The stored ledger could not be decoded.
    #[error("ledger at {location} is malformed: {message}")]
    Malformed {
        /// Where the ledger lives.
        location: String,
        /// Decoder description.
        message: String,
    },

    /// The ledger could not be written.
    #[error("failed to persist ledger to {location}: {message}")]
    Write {
        /// Where the ledger lives.
        location: String,
        /// Adapter-supplied description.
        message: String,
    },
}

/// The catalog data is missing or inconsistent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// A catalog source could not be read or decoded.
    #[error("failed to load catalog source {location}: {message}")]
    Source {
        /// The source that failed.
        location: String,
        /// Description of the failure.
        message: String,
    },

    /// The catalog has no cards.
    #[error("catalog contains no cards")]
    NoCards,

    /// The catalog has no dimensions.
    #[error("catalog contains no dimensions")]
    NoDimensions,

    /// Two card entries share a name and direction.
    #[error("duplicate card in catalog: {0}")]
    DuplicateCard(CardKey),

    /// Two dimension entries share a name.
    #[error("duplicate dimension in catalog: {0}")]
    DuplicateDimension(DimensionName),
}

/// A prompt template that cannot be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// The template references a field that does not exist.
    #[error("unknown placeholder '{{{name}}}' in prompt template")]
    UnknownPlaceholder {
        /// The offending placeholder name.
        name: String,
    },

    /// A `{` or `}` is not part of a placeholder or an escape sequence.
    #[error("unbalanced brace at byte {position} in prompt template")]
    UnbalancedBrace {
        /// Byte offset of the brace.
        position: usize,
    },
}

// ---------------------------------------------------------------------------
// Run-level errors
// ---------------------------------------------------------------------------

/// Errors that halt a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The configuration is invalid; raised before any work begins.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// The catalog could not be loaded or validated.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The prompt template is invalid.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// The ledger could not be loaded or checkpointed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A targeted run named a dimension the catalog does not contain.
    #[error("unknown dimension: {0}")]
    UnknownDimension(String),

    /// A targeted run named a card the catalog does not contain.
    #[error("unknown card: {0}")]
    UnknownCard(String),
}

impl PipelineError {
    /// Shorthand for [`PipelineError::Configuration`].
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns `true` for errors that are raised before any generation starts.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::Catalog(_) | Self::Template(_)
        )
    }
}
