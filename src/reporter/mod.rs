//! The reporting pipeline: one cycle from snapshot to batched submission.
//!
//! A cycle marshals every snapshot entry into wire-format datums, filters
//! and timestamps them, partitions the survivors into bounded batches, and
//! fans the batches out as independent submission tasks. No failure —
//! unparseable names, marshalling faults, rejected batches — is allowed to
//! escape a cycle, so the external scheduler's run-forever contract holds.

mod builder;
mod diff;

pub use builder::ReporterBuilder;
pub use diff::CounterDiffState;

use crate::codec::{self, DemuxedKey, MetricKey, StatisticKind};
use crate::core::{ReporterConfig, Result};
use crate::datum::{MetricDatum, StandardUnit, StatisticSet};
use crate::sink::MetricSink;
use crate::snapshot::{numeric_gauge_value, MetricsSnapshot, SamplingSnapshot, SnapshotSource};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

/// The receiving service accepts at most this many datums per submission.
pub const MAX_DATUMS_PER_REQUEST: usize = 20;

/// Post-decode filter over fully structured datums. Distinct from any
/// pre-decode name filter applied upstream of the snapshot.
pub type DatumFilter = Box<dyn Fn(&MetricDatum) -> bool + Send + Sync>;

/// Translates metric snapshots into wire-format datums and dispatches them.
///
/// Holds the only cross-cycle state, [`CounterDiffState`]. `report` takes
/// `&mut self`, so overlapping cycles on one instance cannot compile — the
/// invariant that makes the unsynchronized diff state safe.
pub struct Reporter {
    config: ReporterConfig,
    sink: Arc<dyn MetricSink>,
    reporter_filter: DatumFilter,
    diff_state: CounterDiffState,
}

impl Reporter {
    pub(crate) fn from_parts(
        config: ReporterConfig,
        sink: Arc<dyn MetricSink>,
        reporter_filter: DatumFilter,
    ) -> Self {
        Reporter {
            config,
            sink,
            reporter_filter,
            diff_state: CounterDiffState::new(),
        }
    }

    /// The configuration this reporter was built with. The external
    /// scheduler reads its `report_interval` from here.
    pub fn config(&self) -> &ReporterConfig {
        &self.config
    }

    /// Pull a snapshot from `source` and report it.
    pub async fn report_from(&mut self, source: &dyn SnapshotSource) {
        let snapshot = source.snapshot();
        self.report(&snapshot).await;
    }

    /// Run one reporting cycle over `snapshot`.
    ///
    /// Always returns normally: marshalling faults end the cycle early but
    /// cleanly, and submission faults are logged per batch after every
    /// batch has been dispatched.
    pub async fn report(&mut self, snapshot: &MetricsSnapshot) {
        let data = match self.marshal(snapshot) {
            Ok(data) => data,
            Err(e) => {
                error!(
                    namespace = %self.config.namespace,
                    error = %e,
                    "Error marshalling metric data; skipping this cycle"
                );
                return;
            },
        };

        let datums = self.finalize(data);
        let total = datums.len();
        if total == 0 {
            debug!(namespace = %self.config.namespace, "No metric data to submit this cycle");
            return;
        }

        // Fan out: every batch is its own task, dispatched before any batch
        // is awaited.
        let batches = partition(datums, MAX_DATUMS_PER_REQUEST);
        let mut handles = Vec::with_capacity(batches.len());
        for batch in batches {
            let sink = Arc::clone(&self.sink);
            let namespace = self.config.namespace.clone();
            handles.push(tokio::spawn(async move {
                let size = batch.len();
                (size, sink.put_metric_data(&namespace, batch).await)
            }));
        }

        // Fan in: wait for every submission from this cycle, collecting
        // failures without aborting siblings.
        for outcome in join_all(handles).await {
            match outcome {
                Ok((_, Ok(()))) => {},
                Ok((size, Err(e))) => error!(
                    batch_size = size,
                    namespace = %self.config.namespace,
                    error = %e,
                    "Batch submission failed; this batch's data did not reach the service"
                ),
                Err(e) => error!(
                    namespace = %self.config.namespace,
                    error = %e,
                    "Batch submission task failed"
                ),
            }
        }

        debug!(
            datums = total,
            namespace = %self.config.namespace,
            "Submitted metric data"
        );
    }

    /// Translate every snapshot entry into datums. Entries with unparseable
    /// names or nothing to report are skipped individually; an `Err` here
    /// aborts the whole cycle's marshalling.
    fn marshal(&mut self, snapshot: &MetricsSnapshot) -> Result<Vec<MetricDatum>> {
        let mut data = Vec::with_capacity(snapshot.estimated_datums());

        for (name, value) in &snapshot.gauges {
            self.report_gauge(name, value, &mut data);
        }
        for (name, count) in &snapshot.counters {
            self.report_counter(name, *count, &mut data);
        }
        for (name, count) in &snapshot.meters {
            self.report_counter(name, *count, &mut data);
        }
        for (name, dist) in &snapshot.histograms {
            self.report_counter(name, dist.count, &mut data);
            self.report_sampling(name, dist, 1.0, &mut data);
        }
        let timer_rescale = self.config.timer_rescale;
        for (name, dist) in &snapshot.timers {
            self.report_counter(name, dist.count, &mut data);
            self.report_sampling(name, dist, timer_rescale, &mut data);
        }

        Ok(data)
    }

    fn report_gauge(&self, encoded: &str, value: &Value, data: &mut Vec<MetricDatum>) {
        let Some(value) = numeric_gauge_value(value) else {
            return;
        };
        let decoded = match codec::decode(encoded, StatisticKind::Gauge) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!(name = encoded, error = %e, "Skipping gauge with unparseable name");
                return;
            },
        };

        let resolution = decoded.options.storage_resolution;
        let timestamp = decoded.options.timestamp_millis;
        data.extend(self.demux(decoded.key).new_datums(|datum| {
            attach_timestamp(
                datum.with_value(value).with_storage_resolution(resolution),
                timestamp,
            )
        }));
    }

    fn report_counter(&mut self, encoded: &str, count: u64, data: &mut Vec<MetricDatum>) {
        // The identity's last count is updated even when the name turns out
        // to be unparseable, so a later fix reports a sane delta.
        let diff = self.diff_state.diff_last(encoded, count);
        if diff == 0 {
            return;
        }
        let decoded = match codec::decode(encoded, StatisticKind::Counter) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!(name = encoded, error = %e, "Skipping counter with unparseable name");
                return;
            },
        };

        let resolution = decoded.options.storage_resolution;
        let timestamp = decoded.options.timestamp_millis;
        data.extend(self.demux(decoded.key).new_datums(|datum| {
            attach_timestamp(
                datum
                    .with_value(diff as f64)
                    .with_unit(StandardUnit::Count)
                    .with_storage_resolution(resolution),
                timestamp,
            )
        }));
    }

    fn report_sampling(
        &self,
        encoded: &str,
        dist: &SamplingSnapshot,
        rescale: f64,
        data: &mut Vec<MetricDatum>,
    ) {
        let decoded = match codec::decode(encoded, StatisticKind::Sampling) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!(name = encoded, error = %e, "Skipping distribution with unparseable name");
                return;
            },
        };

        let statistics = StatisticSet {
            sum: dist.sum() * rescale,
            sample_count: dist.len() as f64,
            minimum: dist.min() * rescale,
            maximum: dist.max() * rescale,
        };
        let unit = decoded.options.unit;
        let resolution = decoded.options.storage_resolution;
        let timestamp = decoded.options.timestamp_millis;
        data.extend(self.demux(decoded.key).new_datums(|datum| {
            let datum = datum
                .with_statistic_values(statistics.clone())
                .with_storage_resolution(resolution);
            let datum = match unit {
                Some(unit) => datum.with_unit(unit),
                None => datum,
            };
            attach_timestamp(datum, timestamp)
        }));
    }

    fn demux(&self, mut key: MetricKey) -> DemuxedKey {
        if let Some(dimensions) = self.config.trimmed_global_dimensions() {
            key.extend_parsed(dimensions);
        }
        DemuxedKey::new(key)
    }

    /// Drop unreportable datums, apply the local-timestamp option, and run
    /// the user filter, in that order.
    fn finalize(&self, data: Vec<MetricDatum>) -> Vec<MetricDatum> {
        let now = Utc::now();
        data.into_iter()
            .filter(MetricDatum::is_reportable)
            .map(|datum| {
                if self.config.timestamp_local {
                    datum.with_timestamp(now)
                } else {
                    datum
                }
            })
            .filter(|datum| (self.reporter_filter)(datum))
            .collect()
    }
}

fn attach_timestamp(datum: MetricDatum, timestamp_millis: i64) -> MetricDatum {
    match DateTime::<Utc>::from_timestamp_millis(timestamp_millis) {
        Some(timestamp) => datum.with_timestamp(timestamp),
        None => datum,
    }
}

/// Split datums into batches of at most `size`, preserving relative order.
fn partition(mut datums: Vec<MetricDatum>, size: usize) -> Vec<Vec<MetricDatum>> {
    let mut batches = Vec::with_capacity((datums.len() + size - 1) / size);
    while !datums.is_empty() {
        let rest = datums.split_off(datums.len().min(size));
        batches.push(datums);
        datums = rest;
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::KeyOptions;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    struct RecordingSink {
        batches: Mutex<Vec<(String, Vec<MetricDatum>)>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(RecordingSink {
                batches: Mutex::new(Vec::new()),
            })
        }

        fn batches(&self) -> Vec<(String, Vec<MetricDatum>)> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl MetricSink for RecordingSink {
        async fn put_metric_data(&self, namespace: &str, data: Vec<MetricDatum>) -> Result<()> {
            self.batches
                .lock()
                .unwrap()
                .push((namespace.to_string(), data));
            Ok(())
        }
    }

    fn reporter(sink: Arc<RecordingSink>) -> Reporter {
        ReporterBuilder::new()
            .with_namespace("TestApp")
            .with_shared_sink(sink)
            .build()
            .unwrap()
    }

    fn counter_key(name: &str) -> String {
        MetricKey::new(name).encode(&KeyOptions::counter(60, 1_000)).unwrap()
    }

    fn all_datums(sink: &RecordingSink) -> Vec<MetricDatum> {
        sink.batches()
            .into_iter()
            .flat_map(|(_, batch)| batch)
            .collect()
    }

    #[tokio::test]
    async fn test_zero_delta_counter_is_suppressed() {
        let sink = RecordingSink::new();
        let mut reporter = reporter(Arc::clone(&sink));

        let mut snapshot = MetricsSnapshot::default();
        snapshot.counters.insert(counter_key("requests"), 7);

        reporter.report(&snapshot).await;
        assert_eq!(all_datums(&sink).len(), 1);

        // Same cumulative count: nothing new to say.
        reporter.report(&snapshot).await;
        assert_eq!(all_datums(&sink).len(), 1);
    }

    #[tokio::test]
    async fn test_batches_are_bounded_and_ordered() {
        let sink = RecordingSink::new();
        let mut reporter = reporter(Arc::clone(&sink));

        let mut snapshot = MetricsSnapshot::default();
        for i in 0..45 {
            snapshot.counters.insert(counter_key(&format!("c{:02}", i)), 1);
        }
        reporter.report(&snapshot).await;

        let mut batches = sink.batches();
        // Tasks may record out of dispatch order; restore it by first datum.
        batches.sort_by(|a, b| a.1[0].metric_name.cmp(&b.1[0].metric_name));
        let sizes: Vec<usize> = batches.iter().map(|(_, b)| b.len()).collect();
        assert_eq!(sizes, vec![20, 20, 5]);

        let names: Vec<String> = batches
            .into_iter()
            .flat_map(|(_, batch)| batch)
            .map(|d| d.metric_name)
            .collect();
        let expected: Vec<String> = (0..45).map(|i| format!("c{:02}", i)).collect();
        assert_eq!(names, expected);
    }

    #[tokio::test]
    async fn test_non_numeric_gauge_is_skipped() {
        let sink = RecordingSink::new();
        let mut reporter = reporter(Arc::clone(&sink));

        let gauge_key = MetricKey::new("state")
            .encode(&KeyOptions::gauge(60, 1_000))
            .unwrap();
        let mut snapshot = MetricsSnapshot::default();
        snapshot
            .gauges
            .insert(gauge_key, serde_json::json!("starting up"));

        reporter.report(&snapshot).await;
        assert!(sink.batches().is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_name_skips_only_that_datum() {
        let sink = RecordingSink::new();
        let mut reporter = reporter(Arc::clone(&sink));

        let mut snapshot = MetricsSnapshot::default();
        snapshot.counters.insert("not an encoded key".to_string(), 5);
        snapshot.counters.insert(counter_key("requests"), 5);

        reporter.report(&snapshot).await;
        let datums = all_datums(&sink);
        assert_eq!(datums.len(), 1);
        assert_eq!(datums[0].metric_name, "requests");
    }

    #[tokio::test]
    async fn test_reporter_filter_drops_datums() {
        let sink = RecordingSink::new();
        let mut reporter = ReporterBuilder::new()
            .with_namespace("TestApp")
            .with_shared_sink(sink.clone())
            .with_reporter_filter(|datum| datum.metric_name != "noisy")
            .build()
            .unwrap();

        let mut snapshot = MetricsSnapshot::default();
        snapshot.counters.insert(counter_key("noisy"), 3);
        snapshot.counters.insert(counter_key("requests"), 3);

        reporter.report(&snapshot).await;
        let datums = all_datums(&sink);
        assert_eq!(datums.len(), 1);
        assert_eq!(datums[0].metric_name, "requests");
    }

    #[tokio::test]
    async fn test_local_timestamp_overrides_decoded_timestamp() {
        let sink = RecordingSink::new();
        let mut reporter = ReporterBuilder::new()
            .with_namespace("TestApp")
            .with_shared_sink(sink.clone())
            .with_timestamp_local(true)
            .build()
            .unwrap();

        let before = Utc::now();
        let mut snapshot = MetricsSnapshot::default();
        snapshot.counters.insert(counter_key("requests"), 3);
        reporter.report(&snapshot).await;

        let datums = all_datums(&sink);
        let stamped = datums[0].timestamp.unwrap();
        assert!(stamped >= before && stamped <= Utc::now());
    }

    #[tokio::test]
    async fn test_global_dimensions_reach_every_datum() {
        let sink = RecordingSink::new();
        let mut reporter = ReporterBuilder::new()
            .with_namespace("TestApp")
            .with_shared_sink(sink.clone())
            .with_dimensions("env=prod")
            .build()
            .unwrap();

        let mut snapshot = MetricsSnapshot::default();
        snapshot.counters.insert(counter_key("requests"), 3);
        reporter.report(&snapshot).await;

        let datums = all_datums(&sink);
        assert_eq!(datums.len(), 1);
        assert_eq!(datums[0].dimensions.len(), 1);
        assert_eq!(datums[0].dimensions[0].name, "env");
        assert_eq!(datums[0].dimensions[0].value, "prod");
    }

    #[test]
    fn test_partition_sizes() {
        let datums: Vec<MetricDatum> =
            (0..45).map(|i| MetricDatum::new(format!("m{}", i))).collect();
        let batches = partition(datums, MAX_DATUMS_PER_REQUEST);
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![20, 20, 5]);
        assert_eq!(batches[2][4].metric_name, "m44");

        assert!(partition(Vec::new(), MAX_DATUMS_PER_REQUEST).is_empty());
    }
}
