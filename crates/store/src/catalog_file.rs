//! Catalog loading from the `{"data": [...]}` JSON files.

use std::path::Path;

use pipeline::{Card, Catalog, CatalogError, Dimension};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::info;

#[derive(Deserialize)]
struct Envelope<T> {
    data: Vec<T>,
}

fn load_entries<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, CatalogError> {
    let source_error = |message: String| CatalogError::Source {
        location: path.display().to_string(),
        message,
    };
    let bytes = std::fs::read(path).map_err(|e| source_error(e.to_string()))?;
    let envelope: Envelope<T> =
        serde_json::from_slice(&bytes).map_err(|e| source_error(e.to_string()))?;
    Ok(envelope.data)
}

/// Reads the card interpretation file.
pub fn load_cards(path: &Path) -> Result<Vec<Card>, CatalogError> {
    load_entries(path)
}

/// Reads the dimension file.
pub fn load_dimensions(path: &Path) -> Result<Vec<Dimension>, CatalogError> {
    load_entries(path)
}

/// Loads and validates the catalog.
pub fn load_catalog(cards: &Path, dimensions: &Path) -> Result<Catalog, CatalogError> {
    let catalog = Catalog::new(load_cards(cards)?, load_dimensions(dimensions)?)?;
    info!(
        cards = catalog.card_count(),
        dimensions = catalog.all_dimensions().len(),
        expected = catalog.expected_count(),
        "catalog loaded"
    );
    Ok(catalog)
}
