//! The static enumeration of cards and dimensions.
//!
//! The catalog defines the full expected key space of a run: every card under
//! every dimension. It is built once at startup and never changes afterwards.

use std::collections::HashSet;

use crate::{Card, CardKey, CatalogError, Dimension, Direction, WorkItem};

/// All cards and all dimensions, in catalog order.
#[derive(Debug, Clone)]
pub struct Catalog {
    cards: Vec<Card>,
    dimensions: Vec<Dimension>,
}

impl Catalog {
    /// Builds a catalog, rejecting empty lists and duplicate identities.
    pub fn new(cards: Vec<Card>, dimensions: Vec<Dimension>) -> Result<Self, CatalogError> {
        if cards.is_empty() {
            return Err(CatalogError::NoCards);
        }
        if dimensions.is_empty() {
            return Err(CatalogError::NoDimensions);
        }

        let mut seen_cards = HashSet::with_capacity(cards.len());
        for card in &cards {
            let key = card.key();
            if !seen_cards.insert(key.clone()) {
                return Err(CatalogError::DuplicateCard(key));
            }
        }

        let mut seen_dimensions = HashSet::with_capacity(dimensions.len());
        for dimension in &dimensions {
            if !seen_dimensions.insert(dimension.name.clone()) {
                return Err(CatalogError::DuplicateDimension(dimension.name.clone()));
            }
        }

        Ok(Self { cards, dimensions })
    }

    /// Every card, in catalog order.
    pub fn all_cards(&self) -> &[Card] {
        &self.cards
    }

    /// Every dimension, in catalog order.
    pub fn all_dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// Number of cards; the record count that makes a dimension complete.
    pub fn card_count(&self) -> usize {
        self.cards.len()
    }

    /// Size of the full card × dimension matrix.
    pub fn expected_count(&self) -> usize {
        self.cards.len() * self.dimensions.len()
    }

    /// Looks up a card by name and direction.
    pub fn find_card(&self, name: &str, direction: Direction) -> Option<&Card> {
        self.cards
            .iter()
            .find(|c| c.name.as_str() == name && c.direction == direction)
    }

    /// Looks up a card by its key.
    pub fn card(&self, key: &CardKey) -> Option<&Card> {
        self.find_card(key.name.as_str(), key.direction)
    }

    /// Looks up a dimension by name.
    pub fn find_dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name.as_str() == name)
    }

    /// Every expected work item, dimension-major.
    pub fn expected_items(&self) -> impl Iterator<Item = WorkItem> + '_ {
        self.dimensions.iter().flat_map(move |dimension| {
            self.cards.iter().map(move |card| WorkItem {
                card: card.key(),
                dimension: dimension.name.clone(),
            })
        })
    }
}
