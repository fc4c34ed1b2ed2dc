//! Wire-format data points for the remote ingestion service.
//!
//! These mirror the `PutMetricData` request shape: each datum carries either
//! a scalar value or a pre-aggregated statistic set, plus the dimensions,
//! unit, storage resolution, and timestamp decoded from its registered name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One name/value pair attached to a datum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dimension {
    /// Dimension key.
    pub name: String,
    /// Dimension value.
    pub value: String,
}

impl Dimension {
    /// Create a dimension from a key and value.
    pub fn new<K: Into<String>, V: Into<String>>(name: K, value: V) -> Self {
        Dimension {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Pre-aggregated {sum, count, min, max} summary submitted in place of raw
/// samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatisticSet {
    /// Sum of all samples in the set.
    pub sum: f64,
    /// Number of samples in the set.
    pub sample_count: f64,
    /// Smallest sample.
    pub minimum: f64,
    /// Largest sample.
    pub maximum: f64,
}

/// Measurement unit understood by the receiving service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StandardUnit {
    /// Plain count.
    Count,
    /// Counts per second.
    #[serde(rename = "Count/Second")]
    CountPerSecond,
    /// Seconds.
    Seconds,
    /// Milliseconds.
    Milliseconds,
    /// Microseconds.
    Microseconds,
    /// Bytes.
    Bytes,
    /// Kilobytes.
    Kilobytes,
    /// Megabytes.
    Megabytes,
    /// Gigabytes.
    Gigabytes,
    /// Percentage in the range 0..100.
    Percent,
    /// No unit.
    None,
}

impl StandardUnit {
    /// The wire name of this unit.
    pub fn as_str(&self) -> &'static str {
        match self {
            StandardUnit::Count => "Count",
            StandardUnit::CountPerSecond => "Count/Second",
            StandardUnit::Seconds => "Seconds",
            StandardUnit::Milliseconds => "Milliseconds",
            StandardUnit::Microseconds => "Microseconds",
            StandardUnit::Bytes => "Bytes",
            StandardUnit::Kilobytes => "Kilobytes",
            StandardUnit::Megabytes => "Megabytes",
            StandardUnit::Gigabytes => "Gigabytes",
            StandardUnit::Percent => "Percent",
            StandardUnit::None => "None",
        }
    }
}

impl fmt::Display for StandardUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StandardUnit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Count" => Ok(StandardUnit::Count),
            "Count/Second" => Ok(StandardUnit::CountPerSecond),
            "Seconds" => Ok(StandardUnit::Seconds),
            "Milliseconds" => Ok(StandardUnit::Milliseconds),
            "Microseconds" => Ok(StandardUnit::Microseconds),
            "Bytes" => Ok(StandardUnit::Bytes),
            "Kilobytes" => Ok(StandardUnit::Kilobytes),
            "Megabytes" => Ok(StandardUnit::Megabytes),
            "Gigabytes" => Ok(StandardUnit::Gigabytes),
            "Percent" => Ok(StandardUnit::Percent),
            "None" => Ok(StandardUnit::None),
            _ => Err(format!("Unknown metric unit: {}", s)),
        }
    }
}

/// One fully resolved, submission-ready data point.
///
/// Carries either `value` or `statistic_values`, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricDatum {
    /// Metric name as the receiving service will display it.
    pub metric_name: String,
    /// Dimension set for this variant.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub dimensions: Vec<Dimension>,
    /// Scalar value, for gauges and counter deltas.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<f64>,
    /// Pre-aggregated statistics, for distributions.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub statistic_values: Option<StatisticSet>,
    /// Measurement unit.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub unit: Option<StandardUnit>,
    /// Requested reporting granularity in seconds.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub storage_resolution: Option<u32>,
    /// Capture timestamp, or None to let the service assign one on arrival.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl MetricDatum {
    /// Create a datum with the given name and nothing else resolved yet.
    pub fn new<S: Into<String>>(metric_name: S) -> Self {
        MetricDatum {
            metric_name: metric_name.into(),
            dimensions: Vec::new(),
            value: None,
            statistic_values: None,
            unit: None,
            storage_resolution: None,
            timestamp: None,
        }
    }

    /// Attach a dimension set.
    pub fn with_dimensions(mut self, dimensions: Vec<Dimension>) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Attach a scalar value.
    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    /// Attach a statistic set.
    pub fn with_statistic_values(mut self, statistic_values: StatisticSet) -> Self {
        self.statistic_values = Some(statistic_values);
        self
    }

    /// Attach a unit.
    pub fn with_unit(mut self, unit: StandardUnit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Attach a storage resolution in seconds.
    pub fn with_storage_resolution(mut self, storage_resolution: u32) -> Self {
        self.storage_resolution = Some(storage_resolution);
        self
    }

    /// Attach a capture timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Whether the receiving service will accept this datum. Statistic sets
    /// with zero samples are rejected there, so they are dropped here first.
    pub fn is_reportable(&self) -> bool {
        match &self.statistic_values {
            Some(stats) => stats.sample_count > 0.0,
            None => true,
        }
    }
}
