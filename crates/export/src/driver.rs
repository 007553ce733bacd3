//! Batched export: records in, backend-shaped requests out.

use std::future::Future;

use tally_core::error::{Result, TallyError};
use tally_core::model::{Datum, MetricRecord};
use tracing::{debug, warn};

use crate::datum::build_all_datums;
use crate::dimensions::DEFAULT_MAX_DIMENSIONS;
use crate::partition::partition;

/// Per-request datum limit used when none is configured.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 20;

/// The backend side of an [`ExportDriver`].
///
/// A transport is owned by exactly one driver, which never calls it
/// concurrently. Timeouts belong to the transport: a timed-out call is
/// reported as an error like any other failed send.
pub trait BatchTransport: Send {
    /// Establishes whatever session the backend needs.
    fn connect(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Sends one partition of datums to `namespace`.
    fn send_batch(
        &mut self,
        namespace: &str,
        batch: &[Datum],
    ) -> impl Future<Output = Result<()>> + Send;

    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    pub max_batch_size: usize,
    pub max_dimensions: usize,
    pub namespace: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_dimensions: DEFAULT_MAX_DIMENSIONS,
            namespace: "Tally/Agent".to_string(),
        }
    }
}

impl ExportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(TallyError::Config(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Disconnected,
    Connected,
    Closed,
}

/// What a successful write did. `datums` is zero for routed outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub records: usize,
    pub datums: usize,
    pub requests: usize,
}

pub(crate) fn require_connected(state: DriverState) -> Result<()> {
    match state {
        DriverState::Connected => Ok(()),
        other => Err(TallyError::State(format!(
            "write requires a connected output (state: {other:?})"
        ))),
    }
}

pub struct ExportDriver<T> {
    transport: T,
    cfg: ExportConfig,
    state: DriverState,
}

impl<T: BatchTransport> ExportDriver<T> {
    pub fn new(transport: T, cfg: ExportConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            transport,
            cfg,
            state: DriverState::Disconnected,
        })
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn config(&self) -> &ExportConfig {
        &self.cfg
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn connect(&mut self) -> Result<()> {
        match self.state {
            DriverState::Connected => return Ok(()),
            DriverState::Closed => {
                return Err(TallyError::State(
                    "cannot reconnect a closed output".to_string(),
                ));
            }
            DriverState::Disconnected => {}
        }

        if let Err(e) = self.transport.connect().await {
            warn!(error = %e, namespace = %self.cfg.namespace, "output connect failed");
            return Err(e);
        }
        self.state = DriverState::Connected;
        Ok(())
    }

    /// Builds datums for every record, partitions them and sends the
    /// partitions in order.
    ///
    /// The first failed send aborts the rest. Partitions already sent stay
    /// sent; the caller sees only the error.
    pub async fn write(&mut self, records: &[MetricRecord]) -> Result<WriteReport> {
        require_connected(self.state)?;

        let datums = build_all_datums(records, self.cfg.max_dimensions);
        let partitions = partition(self.cfg.max_batch_size, &datums)?;
        let total = partitions.len();

        for (idx, batch) in partitions.into_iter().enumerate() {
            if let Err(e) = self.transport.send_batch(&self.cfg.namespace, batch).await {
                warn!(
                    error = %e,
                    sent_partitions = idx,
                    total_partitions = total,
                    "export write aborted"
                );
                return Err(e);
            }
        }

        debug!(
            records = records.len(),
            datums = datums.len(),
            partitions = total,
            "export write complete"
        );
        Ok(WriteReport {
            records: records.len(),
            datums: datums.len(),
            requests: total,
        })
    }

    pub async fn close(&mut self) -> Result<()> {
        let previous = self.state;
        self.state = DriverState::Closed;
        if previous == DriverState::Connected {
            self.transport.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tally_core::line::parse_lines;
    use tally_core::model::Dimension;

    use super::*;
    use crate::transport::mock::{MockBatchTransport, MockHandle};

    fn driver(max_batch_size: usize, max_dimensions: usize) -> (ExportDriver<MockBatchTransport>, MockHandle) {
        let (transport, handle) = MockBatchTransport::new();
        let driver = ExportDriver::new(
            transport,
            ExportConfig {
                max_batch_size,
                max_dimensions,
                namespace: "Test/NS".to_string(),
            },
        )
        .unwrap();
        (driver, handle)
    }

    #[test]
    fn zero_batch_size_is_rejected_at_setup() {
        let (transport, _) = MockBatchTransport::new();
        let res = ExportDriver::new(
            transport,
            ExportConfig {
                max_batch_size: 0,
                ..ExportConfig::default()
            },
        );
        assert!(matches!(res, Err(TallyError::Config(_))));
    }

    #[tokio::test]
    async fn write_before_connect_is_a_state_error() {
        let (mut driver, handle) = driver(20, 10);
        let res = driver.write(&[testkit::cpu_record()]).await;
        assert!(matches!(res, Err(TallyError::State(_))));
        assert!(handle.batches().is_empty());
    }

    #[tokio::test]
    async fn single_record_scenario_sends_one_partition() {
        let (mut driver, handle) = driver(20, 2);
        driver.connect().await.unwrap();

        let report = driver.write(&[testkit::cpu_record()]).await.unwrap();
        assert_eq!(
            report,
            WriteReport {
                records: 1,
                datums: 1,
                requests: 1
            }
        );

        let batches = handle.batches();
        assert_eq!(batches.len(), 1);
        let (namespace, datums) = &batches[0];
        assert_eq!(namespace, "Test/NS");
        assert_eq!(datums.len(), 1);
        assert_eq!(datums[0].metric_name, "cpu_usage");
        assert_eq!(datums[0].value, 42.0);
        assert_eq!(
            datums[0].dimensions,
            vec![Dimension::new("host", "a"), Dimension::new("region", "us")]
        );
    }

    #[tokio::test]
    async fn datums_across_records_are_partitioned_together() {
        let (mut driver, handle) = driver(20, 10);
        driver.connect().await.unwrap();

        let records = testkit::numbered_records(5, 5);
        let report = driver.write(&records).await.unwrap();
        assert_eq!(report.datums, 25);
        assert_eq!(report.requests, 2);

        let batches = handle.batches();
        assert_eq!(batches[0].1.len(), 20);
        assert_eq!(batches[1].1.len(), 5);
        let values: Vec<f64> = batches.iter().flat_map(|(_, b)| b.iter().map(|d| d.value)).collect();
        let expected: Vec<f64> = (0..25).map(|v| v as f64).collect();
        assert_eq!(values, expected);
    }

    #[tokio::test]
    async fn first_failure_aborts_remaining_partitions() {
        let (mut driver, handle) = driver(2, 10);
        driver.connect().await.unwrap();
        handle.fail_send_at(1);

        let records = testkit::numbered_records(1, 6);
        let err = driver.write(&records).await.unwrap_err();
        assert!(matches!(err, TallyError::Transport(_)));

        // first partition went out, the failing one was attempted, the third never was
        assert_eq!(handle.batches().len(), 1);
        assert_eq!(handle.send_attempts(), 2);
        assert_eq!(driver.state(), DriverState::Connected);
    }

    #[tokio::test]
    async fn non_finite_fields_never_reach_the_transport() {
        let (mut driver, handle) = driver(20, 10);
        driver.connect().await.unwrap();

        let records = parse_lines("cpu,host=a v=NaN,w=inf,x=-inf", testkit::base_ts()).records;
        let report = driver.write(&records).await.unwrap();
        assert_eq!(report.datums, 0);
        assert_eq!(report.requests, 0);
        assert_eq!(handle.send_attempts(), 0);
    }

    #[tokio::test]
    async fn empty_write_sends_nothing() {
        let (mut driver, handle) = driver(20, 10);
        driver.connect().await.unwrap();
        let report = driver.write(&[]).await.unwrap();
        assert_eq!(report.requests, 0);
        assert_eq!(handle.send_attempts(), 0);
    }

    #[tokio::test]
    async fn failed_connect_stays_disconnected() {
        let (mut driver, handle) = driver(20, 10);
        handle.fail_connect();
        let err = driver.connect().await.unwrap_err();
        assert!(matches!(err, TallyError::Connection(_)));
        assert_eq!(driver.state(), DriverState::Disconnected);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_final() {
        let (mut driver, handle) = driver(20, 10);
        driver.connect().await.unwrap();
        driver.close().await.unwrap();
        driver.close().await.unwrap();
        assert_eq!(driver.state(), DriverState::Closed);
        assert_eq!(handle.close_calls(), 1);
        assert!(matches!(driver.connect().await, Err(TallyError::State(_))));
        assert!(matches!(
            driver.write(&[testkit::cpu_record()]).await,
            Err(TallyError::State(_))
        ));
    }
}
