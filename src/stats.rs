//! Latency/throughput statistics per (symbol, shape)
//!
//! Call records are grouped by callable symbol and argument shape. Each
//! group reports its call count, min/mean/max latency in milliseconds and
//! the matching throughput (`1000 / latency`, calls per second). Because
//! throughput is the reciprocal of latency, the fastest call gives the
//! maximum throughput. A zero latency yields an infinite throughput, which
//! serializes as the string `"inf"` since JSON has no infinity literal.

use crate::join::CallRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default counter-to-millisecond factor (nanosecond clock counters)
pub const DEFAULT_LATENCY_SCALE: f64 = 1e-6;

/// Aggregation key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShapeKey {
    pub symbol: String,
    pub width: u64,
    pub height: u64,
}

/// Raw accumulation for one group (counter units)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupStats {
    pub count: u64,
    pub min: i64,
    pub max: i64,
    /// Exact sum so the mean does not depend on record order
    pub total: i128,
}

impl GroupStats {
    fn record(&mut self, delta: i64) {
        if self.count == 0 {
            self.min = delta;
            self.max = delta;
        } else {
            self.min = self.min.min(delta);
            self.max = self.max.max(delta);
        }
        self.count += 1;
        self.total += delta as i128;
    }
}

/// One row of the aggregate report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub symbol: String,
    pub width: u64,
    pub height: u64,
    pub count: u64,
    /// Milliseconds
    pub latency_min: f64,
    pub latency_mean: f64,
    pub latency_max: f64,
    /// Calls per second
    #[serde(with = "float_text")]
    pub throughput_min: f64,
    #[serde(with = "float_text")]
    pub throughput_mean: f64,
    #[serde(with = "float_text")]
    pub throughput_max: f64,
}

/// Serde adapter writing non-finite floats as `"inf"`, `"-inf"` or `"NaN"`
mod float_text {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value.is_sign_positive() {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::Text(text) => match text.as_str() {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                "NaN" => Ok(f64::NAN),
                other => Err(D::Error::custom(format!("invalid throughput {:?}", other))),
            },
        }
    }
}

fn throughput(latency_ms: f64) -> f64 {
    1000.0 / latency_ms
}

/// Accumulates call records into per-group statistics
#[derive(Debug, Default)]
pub struct ShapeStatsTracker {
    groups: BTreeMap<ShapeKey, GroupStats>,
}

impl ShapeStatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call record
    pub fn record(&mut self, record: &CallRecord) {
        let key = ShapeKey {
            symbol: record.symbol.clone(),
            width: record.width,
            height: record.height,
        };
        self.groups.entry(key).or_default().record(record.delta);
    }

    /// Access the raw per-group accumulators
    pub fn groups(&self) -> &BTreeMap<ShapeKey, GroupStats> {
        &self.groups
    }

    /// Build the report, ordered by (symbol, width, height)
    ///
    /// `scale` converts counter units to milliseconds.
    pub fn summarize(&self, scale: f64) -> Vec<SummaryRow> {
        self.groups
            .iter()
            .map(|(key, stats)| {
                let latency_min = stats.min as f64 * scale;
                let latency_max = stats.max as f64 * scale;
                let latency_mean = stats.total as f64 / stats.count as f64 * scale;
                SummaryRow {
                    symbol: key.symbol.clone(),
                    width: key.width,
                    height: key.height,
                    count: stats.count,
                    latency_min,
                    latency_mean,
                    latency_max,
                    throughput_min: throughput(latency_max),
                    throughput_mean: throughput(latency_mean),
                    throughput_max: throughput(latency_min),
                }
            })
            .collect()
    }
}

/// Aggregate a set of call records in one step
pub fn aggregate<'a, I>(records: I, scale: f64) -> Vec<SummaryRow>
where
    I: IntoIterator<Item = &'a CallRecord>,
{
    let mut tracker = ShapeStatsTracker::new();
    for record in records {
        tracker.record(record);
    }
    tracker.summarize(scale)
}
