//! Fluent construction of a [`Reporter`].

use crate::core::{ReporterConfig, ReporterError, Result};
use crate::datum::MetricDatum;
use crate::reporter::{DatumFilter, Reporter};
use crate::sink::MetricSink;
use std::sync::Arc;
use std::time::Duration;

/// Builder for a [`Reporter`]. A namespace and a sink are required; there
/// are suitable defaults for everything else.
///
/// Defaults are resolved in [`build`](ReporterBuilder::build) so a partially
/// configured builder can be cloned-by-hand into several reporters without
/// the builder secretly mutating itself.
pub struct ReporterBuilder {
    config: ReporterConfig,
    sink: Option<Arc<dyn MetricSink>>,
    reporter_filter: Option<DatumFilter>,
}

impl ReporterBuilder {
    /// Builder with default configuration and nothing required set.
    pub fn new() -> Self {
        ReporterBuilder {
            config: ReporterConfig::default(),
            sink: None,
            reporter_filter: None,
        }
    }

    /// Replace the whole configuration, e.g. one loaded from YAML.
    pub fn with_config(mut self, config: ReporterConfig) -> Self {
        self.config = config;
        self
    }

    /// Namespace all metrics are submitted under. Required.
    pub fn with_namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    /// Global dimensions in encoded `name=value` form, appended to every
    /// metric this reporter submits.
    pub fn with_dimensions<S: Into<String>>(mut self, dimensions: S) -> Self {
        self.config.global_dimensions = Some(dimensions.into());
        self
    }

    /// Stamp every datum with the local wall clock at submission time
    /// instead of leaving timestamps to the receiving service.
    pub fn with_timestamp_local(mut self, timestamp_local: bool) -> Self {
        self.config.timestamp_local = timestamp_local;
        self
    }

    /// How often the external scheduler should trigger a cycle.
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.config.report_interval = interval;
        self
    }

    /// Multiplier applied to timer distribution values before submission.
    pub fn with_timer_rescale(mut self, rescale: f64) -> Self {
        self.config.timer_rescale = rescale;
        self
    }

    /// Submission sink. Required.
    pub fn with_sink<S: MetricSink + 'static>(self, sink: S) -> Self {
        self.with_shared_sink(Arc::new(sink))
    }

    /// Submission sink shared with other owners. Required (or
    /// [`with_sink`](ReporterBuilder::with_sink)).
    pub fn with_shared_sink(mut self, sink: Arc<dyn MetricSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Filter applied to fully structured datums right before submission;
    /// `true` keeps the datum. Defaults to keeping everything.
    pub fn with_reporter_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&MetricDatum) -> bool + Send + Sync + 'static,
    {
        self.reporter_filter = Some(Box::new(filter));
        self
    }

    /// Build the reporter, validating the configuration.
    pub fn build(self) -> Result<Reporter> {
        self.config.validate()?;
        let sink = self
            .sink
            .ok_or_else(|| ReporterError::config("A metric sink is required"))?;
        let reporter_filter = self.reporter_filter.unwrap_or_else(|| Box::new(|_| true));
        Ok(Reporter::from_parts(self.config, sink, reporter_filter))
    }
}

impl Default for ReporterBuilder {
    fn default() -> Self {
        ReporterBuilder::new()
    }
}
