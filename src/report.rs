//! Aggregation and ranking of extracted counts.

use indexmap::IndexMap;
use indexmap::map::Entry;
use serde::{Serialize, Serializer};
use tracing::warn;

/// Counts extracted for one institute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
    #[serde(skip)]
    pub name: String,
    /// Static rank shown on the page, when it parsed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
    #[serde(serialize_with = "serialize_count")]
    pub total: f64,
    /// Professor name to count, highest first
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_counts"
    )]
    pub professors: Option<IndexMap<String, f64>>,
}

impl MetricRecord {
    pub fn new(name: impl Into<String>, rank: Option<u32>, total: f64) -> Self {
        Self {
            name: name.into(),
            rank,
            total,
            professors: None,
        }
    }
}

/// A count as JSON: whole values as integers, anything else as a float.
struct Count(f64);

impl Serialize for Count {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = self.0;
        if value.fract() == 0.0 && (0.0..=u64::MAX as f64).contains(&value) {
            serializer.serialize_u64(value as u64)
        } else {
            serializer.serialize_f64(value)
        }
    }
}

fn serialize_count<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    Count(*value).serialize(serializer)
}

fn serialize_counts<S: Serializer>(
    counts: &Option<IndexMap<String, f64>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match counts {
        Some(counts) => serializer.collect_map(counts.iter().map(|(name, &v)| (name, Count(v)))),
        None => serializer.serialize_none(),
    }
}

/// Order `(name, count)` pairs by descending count, dropping zeros.
///
/// Ties keep their input order. A repeated name keeps its first count.
pub fn rank_by_count<I>(counts: I) -> IndexMap<String, f64>
where
    I: IntoIterator<Item = (String, f64)>,
{
    let mut ranked: IndexMap<String, f64> = IndexMap::new();
    for (name, count) in counts.into_iter().filter(|(_, count)| *count > 0.0) {
        match ranked.entry(name) {
            Entry::Occupied(entry) => {
                warn!(name = entry.key().as_str(), count, "Duplicate name, keeping first count");
            }
            Entry::Vacant(entry) => {
                entry.insert(count);
            }
        }
    }
    // Stable, so equal counts stay in input order.
    ranked.sort_by(|_, a, _, b| b.total_cmp(a));
    ranked
}

/// Final institute ranking, ordered by descending total.
///
/// Serializes as a JSON object keyed by institute name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Report {
    entries: IndexMap<String, MetricRecord>,
}

impl Report {
    /// Build the report from walker output. Zero totals are excluded.
    pub fn build<I>(records: I) -> Self
    where
        I: IntoIterator<Item = MetricRecord>,
    {
        let mut entries: IndexMap<String, MetricRecord> = IndexMap::new();
        for record in records.into_iter().filter(|r| r.total > 0.0) {
            match entries.entry(record.name.clone()) {
                Entry::Occupied(_) => {
                    warn!(
                        institute = record.name.as_str(),
                        total = record.total,
                        "Duplicate institute, keeping first record"
                    );
                }
                Entry::Vacant(entry) => {
                    entry.insert(record);
                }
            }
        }
        // Stable, so equal totals stay in page order.
        entries.sort_by(|_, a, _, b| b.total.total_cmp(&a.total));

        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&MetricRecord> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricRecord> {
        self.entries.values()
    }
}
