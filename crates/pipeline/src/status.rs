//! Read-only completion report over a catalog and a ledger.

use std::collections::HashSet;

use crate::{gap, CardKey, Catalog, DimensionName, Ledger};

/// Completion of a single dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionStatus {
    /// Dimension name.
    pub dimension: DimensionName,
    /// Category of the dimension.
    pub category: String,
    /// Records present for catalog cards.
    pub present: usize,
    /// Records required for completion (the card count).
    pub expected: usize,
}

impl DimensionStatus {
    /// Number of cards still missing.
    pub fn missing(&self) -> usize {
        self.expected.saturating_sub(self.present)
    }

    /// Returns `true` if every card has a record.
    pub fn is_complete(&self) -> bool {
        self.missing() == 0
    }
}

/// Completion table for the whole matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// One row per catalog dimension, in catalog order.
    pub dimensions: Vec<DimensionStatus>,
    /// Records in the ledger that match a catalog card and dimension.
    pub generated: usize,
    /// Size of the card × dimension matrix.
    pub expected: usize,
    /// Records whose card or dimension is not in the catalog.
    pub orphaned: usize,
    /// Items whose last attempt gave up, as recorded in the ledger.
    pub failed: usize,
}

impl StatusReport {
    /// Builds the report. Performs no mutation of either input.
    pub fn build(catalog: &Catalog, ledger: &Ledger) -> Self {
        let grouped = ledger.grouped();
        let gaps = gap::missing(catalog, &grouped);
        let card_keys: HashSet<CardKey> = catalog.all_cards().iter().map(|c| c.key()).collect();

        let dimensions: Vec<DimensionStatus> = catalog
            .all_dimensions()
            .iter()
            .map(|d| {
                let missing = gaps.get(d.name.as_str()).map_or(0, |g| g.missing.len());
                DimensionStatus {
                    dimension: d.name.clone(),
                    category: d.category.clone(),
                    present: catalog.card_count() - missing,
                    expected: catalog.card_count(),
                }
            })
            .collect();

        let orphaned = ledger
            .records()
            .iter()
            .filter(|r| {
                catalog.find_dimension(r.dimension_name.as_str()).is_none()
                    || !card_keys.contains(&r.card_key())
            })
            .count();

        Self {
            generated: dimensions.iter().map(|d| d.present).sum(),
            expected: catalog.expected_count(),
            dimensions,
            orphaned,
            failed: ledger.failures().len(),
        }
    }

    /// Work items still missing.
    pub fn still_missing(&self) -> usize {
        self.expected - self.generated
    }

    /// Number of complete dimensions.
    pub fn complete_dimensions(&self) -> usize {
        self.dimensions.iter().filter(|d| d.is_complete()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Card, CardName, Dimension, Direction, GenerationRecord};

    fn card(name: &str) -> Card {
        Card {
            name: CardName::new(name).unwrap(),
            direction: Direction::Reversed,
            summary: String::new(),
            detail: String::new(),
        }
    }

    fn dimension(name: &str) -> Dimension {
        Dimension {
            name: DimensionName::new(name).unwrap(),
            category: "cat".into(),
            description: String::new(),
            aspect: None,
            aspect_type: None,
        }
    }

    #[test]
    fn counts_present_missing_and_orphans() {
        let catalog = Catalog::new(vec![card("x"), card("y")], vec![dimension("A"), dimension("B")])
            .unwrap();
        let ledger = Ledger::with_records(
            "t",
            vec![
                GenerationRecord::new(&card("x"), &dimension("A"), "1"),
                GenerationRecord::new(&card("y"), &dimension("A"), "2"),
                GenerationRecord::new(&card("x"), &dimension("B"), "3"),
                GenerationRecord::new(&card("x"), &dimension("retired"), "4"),
                GenerationRecord::new(&card("ghost"), &dimension("B"), "5"),
            ],
        );

        let report = StatusReport::build(&catalog, &ledger);
        assert_eq!(report.expected, 4);
        assert_eq!(report.generated, 3);
        assert_eq!(report.still_missing(), 1);
        assert_eq!(report.orphaned, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(report.complete_dimensions(), 1);
        assert_eq!(report.dimensions[1].missing(), 1);
    }
}
