use std::future::Future;
use std::time::Duration;

use tally_core::config::Config;
use tally_core::error::Result;
use tally_core::model::MetricRecord;
use tally_export::{Output, WriteReport};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::exec::{CommandRunner, Exec, ProcessRunner};

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub interval: Duration,
    pub global_tags: Vec<(String, String)>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            global_tags: Vec::new(),
        }
    }
}

impl AgentConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            interval: cfg.interval,
            global_tags: cfg.global_tags.clone(),
        }
    }
}

/// Gathers from one input and writes to one output, one write in flight at a
/// time. Failed gathers and writes are logged; the next tick tries again.
pub struct Agent<R = ProcessRunner> {
    input: Exec<R>,
    output: Output,
    cfg: AgentConfig,
}

impl<R: CommandRunner> Agent<R> {
    pub fn new(input: Exec<R>, output: Output, cfg: AgentConfig) -> Self {
        Self { input, output, cfg }
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    /// Runs the input once and applies the global tags.
    pub async fn gather(&self) -> Result<Vec<MetricRecord>> {
        let records = self.input.gather().await?;
        Ok(records
            .into_iter()
            .map(|r| r.with_default_tags(&self.cfg.global_tags))
            .collect())
    }

    /// Connects, gathers and writes once, then closes the output.
    pub async fn run_once(&mut self) -> Result<WriteReport> {
        self.output.connect().await?;
        let result = match self.gather().await {
            Ok(records) => self.output.write(&records).await,
            Err(e) => Err(e),
        };
        let closed = self.output.close().await;
        let report = result?;
        closed?;
        Ok(report)
    }

    /// Connects and flushes every interval until `shutdown` resolves.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.output.connect().await?;
        info!(
            output = self.output.kind(),
            interval = ?self.cfg.interval,
            "agent started"
        );

        let mut ticker = tokio::time::interval(self.cfg.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => self.flush().await,
            }
        }

        info!("agent stopping");
        self.output.close().await
    }

    async fn flush(&mut self) {
        let records = match self.gather().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "gather failed");
                return;
            }
        };
        match self.output.write(&records).await {
            Ok(report) => debug!(
                records = report.records,
                datums = report.datums,
                requests = report.requests,
                "flush complete"
            ),
            Err(e) => warn!(error = %e, output = self.output.kind(), "write failed"),
        }
    }
}
