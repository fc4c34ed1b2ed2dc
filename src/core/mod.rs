//! Core domain types for the reporting pipeline.
//!
//! This module contains the configuration surface and the error taxonomy
//! shared by every other module in the crate.

#![warn(missing_docs)]

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::ReporterConfig;
pub use error::{ReporterError, Result};
