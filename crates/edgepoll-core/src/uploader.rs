//! Batch delivery to the telemetry sink.
//!
//! One batch becomes one remote insert. Every call is bounded by a timeout so
//! a stalled sink cannot hold up other groups indefinitely. There is no
//! durable outbox: a batch that fails (after any configured retries) is
//! dropped and the group samples again at its next interval.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use edgepoll_types::UploadBatch;

use crate::error::{Error, Result};
use crate::retry::{RetryConfig, with_retry};
use crate::traits::TelemetrySink;

/// Default budget for one insert call.
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(1);

/// Delivers [`UploadBatch`]es to a [`TelemetrySink`].
pub struct BatchUploader {
    sink: Arc<dyn TelemetrySink>,
    timeout: Duration,
    retry: RetryConfig,
}

impl std::fmt::Debug for BatchUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchUploader")
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl BatchUploader {
    /// Create an uploader with the default timeout and no retries.
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            sink,
            timeout: DEFAULT_UPLOAD_TIMEOUT,
            retry: RetryConfig::none(),
        }
    }

    /// Set the budget for one insert call.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry policy for transient failures.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Deliver `batch` in a single insert call.
    ///
    /// An empty batch is a no-op.
    pub async fn upload(&self, batch: &UploadBatch) -> Result<()> {
        if batch.is_empty() {
            debug!(sensor_type = %batch.sensor_type, "Skipping empty batch");
            return Ok(());
        }

        let records = batch.records();
        with_retry(&self.retry, "upload", || async {
            tokio::time::timeout(self.timeout, self.sink.insert(&records))
                .await
                .map_err(|_| Error::timeout("upload", self.timeout))?
        })
        .await?;

        debug!(
            sensor_type = %batch.sensor_type,
            timestamp = %batch.timestamp,
            records = records.len(),
            "Uploaded batch"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UploadFailureReason;
    use crate::mock::MockSink;
    use edgepoll_types::Reading;
    use time::OffsetDateTime;

    fn batch(readings: Vec<Reading>) -> UploadBatch {
        let at = OffsetDateTime::from_unix_timestamp(5).unwrap();
        UploadBatch::new("turbidity", "SiteA", at, readings).unwrap()
    }

    #[tokio::test]
    async fn test_upload_sends_one_insert() {
        let sink = Arc::new(MockSink::new());
        let uploader = BatchUploader::new(sink.clone());

        uploader
            .upload(&batch(vec![
                Reading::new("Sensor1", 14000, 2.31),
                Reading::new("Sensor2", 16000, 2.64),
            ]))
            .await
            .unwrap();

        assert_eq!(sink.insert_count(), 1);
        let batches = sink.batches().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[0][0].timestamp, "1970-01-01T00:00:05.000Z");
    }

    #[tokio::test]
    async fn test_empty_batch_not_sent() {
        let sink = Arc::new(MockSink::new());
        let uploader = BatchUploader::new(sink.clone());

        uploader.upload(&batch(Vec::new())).await.unwrap();
        assert_eq!(sink.insert_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_reported() {
        let sink = Arc::new(MockSink::new());
        sink.set_should_fail(true);
        let uploader = BatchUploader::new(sink.clone());

        let err = uploader
            .upload(&batch(vec![Reading::new("Sensor1", 14000, 2.31)]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Upload(_)));
        assert_eq!(sink.insert_count(), 1);
        assert!(sink.batches().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_sink_times_out() {
        let sink = Arc::new(MockSink::new());
        sink.set_latency(Duration::from_secs(30));
        let uploader = BatchUploader::new(sink.clone()).timeout(Duration::from_secs(1));

        let err = uploader
            .upload(&batch(vec![Reading::new("Sensor1", 14000, 2.31)]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_retried_when_enabled() {
        let sink = Arc::new(MockSink::new());
        sink.set_fail_count(1);
        let uploader =
            BatchUploader::new(sink.clone()).retry(RetryConfig::new(2).jitter(false));

        uploader
            .upload(&batch(vec![Reading::new("Sensor1", 14000, 2.31)]))
            .await
            .unwrap();
        assert_eq!(sink.insert_count(), 2);
        assert_eq!(sink.batches().await.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_batch_not_retried() {
        let sink = Arc::new(MockSink::new());
        sink.set_failure_reason(UploadFailureReason::Rejected {
            status: 400,
            body: "bad column".to_string(),
        })
        .await;
        sink.set_should_fail(true);
        let uploader = BatchUploader::new(sink.clone()).retry(RetryConfig::new(3));

        assert!(
            uploader
                .upload(&batch(vec![Reading::new("Sensor1", 14000, 2.31)]))
                .await
                .is_err()
        );
        assert_eq!(sink.insert_count(), 1);
    }
}
