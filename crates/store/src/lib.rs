//! Arcana file adapters.
//!
//! Implements the [`pipeline::LedgerStore`] port over a JSON file and loads
//! the catalog and prompt template from disk.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** All filesystem access for the workspace lives here.
//! Errors are reported through the `pipeline` error types so callers never
//! see `std::io::Error` directly.

pub mod catalog_file;
pub mod json_ledger;
pub mod template_file;

pub use catalog_file::{load_cards, load_catalog, load_dimensions};
pub use json_ledger::JsonLedgerStore;
pub use template_file::load_prompt_template;
