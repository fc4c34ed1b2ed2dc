//! In-process metric snapshots handed to the pipeline each cycle.
//!
//! The snapshot provider is an external collaborator: it supplies five
//! ordered mappings from registered key string to metric state. Keys are
//! produced by the registration path with [`crate::codec::MetricKey::encode`].

use serde_json::Value;
use std::collections::BTreeMap;

/// Current state of a value distribution: the cumulative observation count
/// plus the current reservoir of recorded values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SamplingSnapshot {
    /// Cumulative number of observations since registration. Monotonically
    /// non-decreasing; the pipeline reports its per-cycle delta.
    pub count: u64,
    /// Values currently held by the distribution's reservoir.
    pub values: Vec<i64>,
}

impl SamplingSnapshot {
    /// Snapshot with the given cumulative count and reservoir values.
    pub fn new(count: u64, values: Vec<i64>) -> Self {
        SamplingSnapshot { count, values }
    }

    /// Sum of the reservoir values.
    pub fn sum(&self) -> f64 {
        self.values.iter().map(|&v| v as f64).sum()
    }

    /// Smallest reservoir value, or 0 when empty.
    pub fn min(&self) -> f64 {
        self.values.iter().min().copied().unwrap_or(0) as f64
    }

    /// Largest reservoir value, or 0 when empty.
    pub fn max(&self) -> f64 {
        self.values.iter().max().copied().unwrap_or(0) as f64
    }

    /// Number of values in the reservoir.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the reservoir holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One cycle's view of every registered metric, keyed by encoded name.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Gauge values; non-numeric or null values are skipped at report time.
    pub gauges: BTreeMap<String, Value>,
    /// Cumulative counter values.
    pub counters: BTreeMap<String, u64>,
    /// Cumulative meter counts.
    pub meters: BTreeMap<String, u64>,
    /// Histogram distributions.
    pub histograms: BTreeMap<String, SamplingSnapshot>,
    /// Timer distributions, recorded in nanoseconds.
    pub timers: BTreeMap<String, SamplingSnapshot>,
}

impl MetricsSnapshot {
    /// Upper-bound estimate of datums this snapshot can produce before
    /// permutation, used to size the marshalling buffer.
    pub fn estimated_datums(&self) -> usize {
        self.gauges.len()
            + self.counters.len()
            + self.meters.len()
            + 2 * self.histograms.len()
            + 2 * self.timers.len()
    }
}

/// External collaborator supplying snapshots on demand.
pub trait SnapshotSource: Send + Sync {
    /// Capture the current state of every registered metric.
    fn snapshot(&self) -> MetricsSnapshot;
}

/// Extract a numeric reading from a gauge value, accepting numbers and
/// numeric strings. Anything else means "nothing to report this cycle".
pub fn numeric_gauge_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
