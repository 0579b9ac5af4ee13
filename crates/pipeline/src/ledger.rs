//! The durable collection of generated records.
//!
//! The ledger is the single source of truth for "what work has already been
//! done". It is loaded once at the start of a run, read by the gap analysis,
//! and mutated only by the run driver between batches. Persistence is behind
//! the [`LedgerStore`] port; see the `store` crate for the JSON file adapter.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{DimensionName, FailureRecord, GenerationRecord, LedgerError, RecordKey, Timestamp};

/// Format version written into every persisted ledger.
pub const LEDGER_VERSION: &str = "1.0.0";

/// Records grouped by dimension name.
pub type GroupedRecords<'a> = BTreeMap<&'a DimensionName, Vec<&'a GenerationRecord>>;

/// Groups records by `dimension_name`. Pure function of its input.
pub fn group_by_dimension(records: &[GenerationRecord]) -> GroupedRecords<'_> {
    let mut grouped: GroupedRecords<'_> = BTreeMap::new();
    for record in records {
        grouped.entry(&record.dimension_name).or_default().push(record);
    }
    grouped
}

/// Outcome of [`Ledger::merge`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Records whose key was not present before.
    pub added: usize,
    /// Records that replaced an existing record with the same key.
    pub replaced: usize,
}

/// All generated records plus envelope metadata.
///
/// Serialises to `{"version", "updated_at", "description", "model", "count",
/// "data": [...], "failures": [...]}`. `count` is derived from `data` on
/// write and ignored on read.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Ledger {
    /// Format version.
    #[serde(default = "default_version")]
    pub version: String,
    /// When the ledger was last checkpointed.
    #[serde(
        alias = "generated_at",
        default = "Timestamp::now",
        deserialize_with = "deserialize_lenient_timestamp"
    )]
    pub updated_at: Timestamp,
    /// Free-form description of the dataset.
    #[serde(default)]
    pub description: String,
    /// Model that produced the most recent checkpoint.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(rename = "data", default)]
    records: Vec<GenerationRecord>,
    #[serde(default)]
    failures: Vec<FailureRecord>,
}

#[derive(Serialize)]
struct Envelope<'a> {
    version: &'a str,
    updated_at: Timestamp,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    count: usize,
    data: &'a [GenerationRecord],
    #[serde(skip_serializing_if = "<[FailureRecord]>::is_empty")]
    failures: &'a [FailureRecord],
}

impl Serialize for Ledger {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Envelope {
            version: &self.version,
            updated_at: self.updated_at,
            description: &self.description,
            model: self.model.as_deref(),
            count: self.records.len(),
            data: &self.records,
            failures: &self.failures,
        }
        .serialize(serializer)
    }
}

fn default_version() -> String {
    LEDGER_VERSION.to_string()
}

impl Ledger {
    /// Creates an empty ledger.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            version: default_version(),
            updated_at: Timestamp::now(),
            description: description.into(),
            model: None,
            records: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Creates a ledger holding `records` as given.
    ///
    /// Call [`Ledger::dedupe`] if the input may contain repeated keys.
    pub fn with_records(description: impl Into<String>, records: Vec<GenerationRecord>) -> Self {
        Self {
            records,
            ..Self::new(description)
        }
    }

    /// All records, in insertion order.
    pub fn records(&self) -> &[GenerationRecord] {
        &self.records
    }

    /// Items whose most recent attempt gave up and that still have no record.
    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the ledger holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records grouped by dimension.
    pub fn grouped(&self) -> GroupedRecords<'_> {
        group_by_dimension(&self.records)
    }

    /// Upserts `records` by [`RecordKey`].
    ///
    /// New keys are appended; existing keys are replaced in place. Failures
    /// for the merged keys are cleared.
    pub fn merge(&mut self, records: impl IntoIterator<Item = GenerationRecord>) -> MergeStats {
        let mut index: HashMap<RecordKey, usize> = self
            .records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.key(), i))
            .collect();

        let mut stats = MergeStats::default();
        for record in records {
            let key = record.key();
            match index.get(&key) {
                Some(&i) => {
                    self.records[i] = record;
                    stats.replaced += 1;
                }
                None => {
                    index.insert(key, self.records.len());
                    self.records.push(record);
                    stats.added += 1;
                }
            }
        }
        self.failures.retain(|f| !index.contains_key(&f.key()));
        stats
    }

    /// Upserts `failures` by [`RecordKey`], skipping keys that already have a
    /// record.
    pub fn record_failures(&mut self, failures: impl IntoIterator<Item = FailureRecord>) {
        let generated: HashSet<RecordKey> = self.records.iter().map(GenerationRecord::key).collect();
        for failure in failures {
            let key = failure.key();
            if generated.contains(&key) {
                continue;
            }
            match self.failures.iter_mut().find(|f| f.key() == key) {
                Some(existing) => *existing = failure,
                None => self.failures.push(failure),
            }
        }
    }

    /// Drops earlier occurrences of repeated keys, keeping the last one.
    ///
    /// Returns the number of records removed.
    pub fn dedupe(&mut self) -> usize {
        let last: HashMap<RecordKey, usize> = self
            .records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.key(), i))
            .collect();
        if last.len() == self.records.len() {
            return 0;
        }

        let before = self.records.len();
        let mut position = 0;
        self.records.retain(|r| {
            let keep = last.get(&r.key()) == Some(&position);
            position += 1;
            keep
        });
        before - self.records.len()
    }

    /// Stamps the ledger with the current time.
    pub fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }
}

/// Accepts RFC 3339 and the naive ISO-8601 form older ledgers used
/// (interpreted as UTC).
fn deserialize_lenient_timestamp<'de, D>(deserializer: D) -> Result<Timestamp, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Timestamp::from_utc(dt.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Timestamp::from_utc(naive.and_utc()))
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp '{raw}': {e}")))
}

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// Durable storage for the [`Ledger`].
///
/// Implementations must make [`LedgerStore::persist`] atomic: a reader (or a
/// restarted process) sees either the previous ledger or the new one, never a
/// partial write.
pub trait LedgerStore: Send + Sync {
    /// Loads the ledger, returning an empty one if nothing has been persisted.
    fn load(&self) -> Result<Ledger, LedgerError>;

    /// Replaces the persisted ledger with `ledger`.
    fn persist(&self, ledger: &Ledger) -> Result<(), LedgerError>;

    /// Human-readable location for logs.
    fn location(&self) -> String;
}
