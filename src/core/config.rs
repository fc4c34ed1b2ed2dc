//! Configuration for the reporting pipeline.
//!
//! Supports YAML loading with sensible defaults for everything except the
//! namespace, which the receiving service requires.

use crate::core::{ReporterError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete configuration for one reporter instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Namespace all metrics from this reporter are submitted under. Required.
    pub namespace: String,
    /// Global dimensions in encoded `name=value` form, appended to every
    /// metric this reporter submits. Blank means none.
    pub global_dimensions: Option<String>,
    /// Whether to stamp every datum with the local wall clock at submission
    /// time (true), or leave timestamps to the receiving service (false).
    pub timestamp_local: bool,
    /// How often the external scheduler should trigger a reporting cycle.
    #[serde(with = "humantime_serde")]
    pub report_interval: Duration,
    /// Multiplier applied to timer distribution values before submission.
    /// The default converts nanosecond recordings to milliseconds.
    pub timer_rescale: f64,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        ReporterConfig {
            namespace: String::new(),
            global_dimensions: None,
            timestamp_local: false,
            report_interval: Duration::from_secs(60),
            timer_rescale: 1e-6,
        }
    }
}

impl ReporterConfig {
    /// Create a configuration with the given namespace and defaults elsewhere.
    pub fn new<S: Into<String>>(namespace: S) -> Self {
        ReporterConfig {
            namespace: namespace.into(),
            ..ReporterConfig::default()
        }
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ReporterConfig = serde_yaml::from_str(yaml)
            .map_err(|e| ReporterError::config(format!("Failed to parse YAML config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(ReporterError::config("Metric namespace is required"));
        }

        if self.report_interval.is_zero() {
            return Err(ReporterError::config("report_interval must be greater than zero"));
        }

        if !self.timer_rescale.is_finite() || self.timer_rescale <= 0.0 {
            return Err(ReporterError::config(format!(
                "timer_rescale must be a positive finite number, got {}",
                self.timer_rescale
            )));
        }

        Ok(())
    }

    /// Global dimensions, or None when unset or blank.
    pub fn trimmed_global_dimensions(&self) -> Option<&str> {
        self.global_dimensions
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }
}
