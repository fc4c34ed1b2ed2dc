//! Skywatch - asynchronous CloudWatch-style metrics reporter.
//!
//! Skywatch translates an in-process snapshot of gauges, counters, meters,
//! histograms, and timers into wire-format data points and submits them to
//! a remote time-series service in bounded asynchronous batches. A failed
//! submission never stops future reporting cycles.
//!
//! # Features
//!
//! - **Dimensional names in flat keys**: dimensions, permute directives,
//!   storage resolution, unit, and capture timestamp are packed into the
//!   single string key the snapshot interface offers, and unpacked at
//!   report time
//! - **Permutation expansion**: segments marked with `*` are reported both
//!   with and without, for aggregate and fine-grained views of one metric
//! - **Counter differencing**: cumulative counters are submitted as
//!   per-cycle deltas, so the source counters never need resetting
//! - **Failure isolation**: unparseable names skip one datum, a rejected
//!   batch loses one batch, and a reporting cycle always returns normally
//!
//! # Architecture
//!
//! - `codec`: metric-name encoding, decoding, and permutation expansion
//! - `snapshot`: the five name-to-metric mappings handed in each cycle
//! - `datum`: wire-format data points and units
//! - `reporter`: the per-cycle pipeline, counter diffing, and the builder
//! - `sink`: the async seam to the remote ingestion client
//!
//! # Example
//!
//! ```no_run
//! use skywatch::{MetricSink, ReporterBuilder};
//! use skywatch::datum::MetricDatum;
//! use skywatch::snapshot::MetricsSnapshot;
//!
//! struct StdoutSink;
//!
//! #[async_trait::async_trait]
//! impl MetricSink for StdoutSink {
//!     async fn put_metric_data(
//!         &self,
//!         namespace: &str,
//!         data: Vec<MetricDatum>,
//!     ) -> skywatch::Result<()> {
//!         println!("{}: {} datums", namespace, data.len());
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut reporter = ReporterBuilder::new()
//!         .with_namespace("MyApplication")
//!         .with_sink(StdoutSink)
//!         .build()?;
//!
//!     let mut interval = tokio::time::interval(reporter.config().report_interval);
//!     loop {
//!         interval.tick().await;
//!         let snapshot = MetricsSnapshot::default(); // supplied by your registry
//!         reporter.report(&snapshot).await;
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod codec;
pub mod core;
pub mod datum;
pub mod reporter;
pub mod sink;
pub mod snapshot;

// Re-export core types for convenience
pub use crate::core::{ReporterConfig, ReporterError, Result};
pub use crate::reporter::{Reporter, ReporterBuilder, MAX_DATUMS_PER_REQUEST};
pub use crate::sink::MetricSink;
