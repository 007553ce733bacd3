//! Routed export for queue-style backends: one send per record, keyed by a
//! tag value instead of batched and dimensioned.

use std::future::Future;

use tally_core::error::{Result, TallyError};
use tally_core::line::encode_record;
use tally_core::model::MetricRecord;
use tracing::{debug, warn};

use crate::driver::{DriverState, WriteReport, require_connected};

pub trait RecordTransport: Send {
    fn connect(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Publishes one serialized record to `topic`, optionally keyed.
    fn send_record(
        &mut self,
        topic: &str,
        key: Option<&str>,
        payload: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedConfig {
    pub topic: String,
    pub routing_tag: Option<String>,
}

impl RoutedConfig {
    pub fn validate(&self) -> Result<()> {
        if self.topic.is_empty() {
            return Err(TallyError::Config("topic cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Value of the routing tag on `record`, if both exist.
    pub fn routing_key<'a>(&self, record: &'a MetricRecord) -> Option<&'a str> {
        let tag = self.routing_tag.as_deref()?;
        record.tags().get(tag).map(String::as_str)
    }
}

pub struct RoutedDriver<T> {
    transport: T,
    cfg: RoutedConfig,
    state: DriverState,
}

impl<T: RecordTransport> RoutedDriver<T> {
    pub fn new(transport: T, cfg: RoutedConfig) -> Result<Self> {
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

    pub fn config(&self) -> &RoutedConfig {
        &self.cfg
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
            warn!(error = %e, topic = %self.cfg.topic, "output connect failed");
            return Err(e);
        }
        self.state = DriverState::Connected;
        Ok(())
    }

    /// Sends each record in order. Records with nothing encodable are
    /// skipped, as are records that fail to encode (logged with the cause);
    /// the first failed send aborts the rest.
    pub async fn write(&mut self, records: &[MetricRecord]) -> Result<WriteReport> {
        require_connected(self.state)?;

        let mut sent = 0;
        for record in records {
            let payload = match encode_record(record) {
                Ok(Some(payload)) => payload,
                Ok(None) => {
                    debug!(record = record.name(), "skipping record with no encodable fields");
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, record = record.name(), "skipping record that failed to encode");
                    continue;
                }
            };
            let key = self.cfg.routing_key(record);
            if let Err(e) = self
                .transport
                .send_record(&self.cfg.topic, key, &payload)
                .await
            {
                warn!(
                    error = %e,
                    sent_records = sent,
                    total_records = records.len(),
                    "routed write aborted"
                );
                return Err(e);
            }
            sent += 1;
        }

        Ok(WriteReport {
            records: records.len(),
            datums: 0,
            requests: sent,
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
