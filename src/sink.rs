//! Seam to the remote ingestion client.

use crate::core::Result;
use crate::datum::MetricDatum;
use async_trait::async_trait;

/// Asynchronous submission sink for wire-format datums.
///
/// Implemented by the external ingestion client. Each call receives at most
/// [`crate::reporter::MAX_DATUMS_PER_REQUEST`] datums. The pipeline never
/// retries a failed call; transport-level retry is the implementor's
/// business.
#[async_trait]
pub trait MetricSink: Send + Sync {
    /// Submit one batch of datums under the given namespace.
    async fn put_metric_data(&self, namespace: &str, data: Vec<MetricDatum>) -> Result<()>;
}
