//! Gap analysis: which work items are not yet in the ledger.
//!
//! For each dimension the missing set is `all card keys − keys already
//! recorded under that dimension`. Dimensions with nothing missing do not
//! appear in the report at all, which is what makes re-running over a complete
//! ledger a no-op.

use std::collections::HashSet;

use crate::{CardKey, Catalog, Dimension, DimensionName, GroupedRecords};

/// The missing cards of one dimension, in catalog card order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionGap {
    /// The incomplete dimension.
    pub dimension: DimensionName,
    /// Cards with no record under `dimension`.
    pub missing: Vec<CardKey>,
}

/// Missing work per dimension, in catalog dimension order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GapReport {
    gaps: Vec<DimensionGap>,
}

impl GapReport {
    /// Incomplete dimensions, in catalog order.
    pub fn gaps(&self) -> &[DimensionGap] {
        &self.gaps
    }

    /// Returns `true` if nothing is missing.
    pub fn is_empty(&self) -> bool {
        self.gaps.is_empty()
    }

    /// Total number of missing work items.
    pub fn total_missing(&self) -> usize {
        self.gaps.iter().map(|g| g.missing.len()).sum()
    }

    /// Missing cards for `dimension`, or `None` if it is complete.
    pub fn get(&self, dimension: &str) -> Option<&DimensionGap> {
        self.gaps.iter().find(|g| g.dimension.as_str() == dimension)
    }

    /// Keeps only the gap of `dimension`.
    pub fn restrict_to_dimension(self, dimension: &str) -> Self {
        Self {
            gaps: self
                .gaps
                .into_iter()
                .filter(|g| g.dimension.as_str() == dimension)
                .collect(),
        }
    }

    /// Keeps only `card`, dropping dimensions where it is not missing.
    pub fn restrict_to_card(self, card: &CardKey) -> Self {
        Self {
            gaps: self
                .gaps
                .into_iter()
                .filter_map(|mut g| {
                    g.missing.retain(|k| k == card);
                    (!g.missing.is_empty()).then_some(g)
                })
                .collect(),
        }
    }

    /// Treats every work item of the catalog as missing.
    ///
    /// Used for forced regeneration.
    pub fn everything(catalog: &Catalog) -> Self {
        let all: Vec<CardKey> = catalog.all_cards().iter().map(|c| c.key()).collect();
        Self {
            gaps: catalog
                .all_dimensions()
                .iter()
                .map(|d| DimensionGap {
                    dimension: d.name.clone(),
                    missing: all.clone(),
                })
                .collect(),
        }
    }
}

/// Computes the missing card keys of every dimension.
pub fn missing(catalog: &Catalog, grouped: &GroupedRecords<'_>) -> GapReport {
    let gaps = catalog
        .all_dimensions()
        .iter()
        .filter_map(|dimension| dimension_gap(catalog, dimension, grouped))
        .collect();
    GapReport { gaps }
}

fn dimension_gap(
    catalog: &Catalog,
    dimension: &Dimension,
    grouped: &GroupedRecords<'_>,
) -> Option<DimensionGap> {
    let present: HashSet<CardKey> = grouped
        .get(&dimension.name)
        .map(|records| records.iter().map(|r| r.card_key()).collect())
        .unwrap_or_default();

    let missing: Vec<CardKey> = catalog
        .all_cards()
        .iter()
        .map(|c| c.key())
        .filter(|k| !present.contains(k))
        .collect();

    if missing.is_empty() {
        None
    } else {
        Some(DimensionGap {
            dimension: dimension.name.clone(),
            missing,
        })
    }
}
