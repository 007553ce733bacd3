use std::io::{self, Write};

use tally_core::error::{Result, TallyError};
use tally_core::model::Datum;

use super::PutMetricData;
use crate::driver::BatchTransport;

/// Writes each partition as one JSON line.
pub struct StdoutTransport<W = io::Stdout> {
    writer: W,
}

impl StdoutTransport {
    pub fn new() -> Self {
        Self {
            writer: io::stdout(),
        }
    }
}

impl Default for StdoutTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> StdoutTransport<W> {
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }
}

impl<W: Write + Send> BatchTransport for StdoutTransport<W> {
    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn send_batch(&mut self, namespace: &str, batch: &[Datum]) -> Result<()> {
        let doc = PutMetricData {
            namespace,
            metric_data: batch,
        };
        serde_json::to_writer(&mut self.writer, &doc)
            .map_err(|e| TallyError::Transport(format!("failed to write batch: {e}")))?;
        writeln!(self.writer)
            .and_then(|_| self.writer.flush())
            .map_err(|e| TallyError::Transport(format!("failed to write batch: {e}")))
    }

    async fn close(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| TallyError::Io(format!("failed to flush output: {e}")))
    }
}
