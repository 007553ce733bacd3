//! Collector command input.

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use chrono::Utc;
use tally_core::config::Config;
use tally_core::error::{Result, TallyError};
use tally_core::line::{ParsedLines, parse_lines};
use tally_core::model::{FieldValue, MetricRecord};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::flatten::flatten_json;

/// Measurement name for records gathered from JSON output.
pub const JSON_MEASUREMENT: &str = "exec";

pub trait CommandRunner: Send + Sync {
    /// Runs `command` (argv form) and returns its stdout.
    fn run(&self, command: &[String]) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Runs commands as child processes, killed if they outlive `timeout`.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &[String]) -> Result<Vec<u8>> {
        let Some((program, args)) = command.split_first() else {
            return Err(TallyError::Config("exec command is empty".to_string()));
        };
        let display = command.join(" ");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                TallyError::Io(format!(
                    "command '{display}' timed out after {:?}",
                    self.timeout
                ))
            })?
            .map_err(|e| TallyError::Io(format!("failed to run '{display}': {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TallyError::Io(format!(
                "command '{display}' exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Json,
    Influx,
}

impl DataFormat {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "" | "json" => Ok(Self::Json),
            "influx" => Ok(Self::Influx),
            other => Err(TallyError::Config(format!(
                "unsupported data format {other}; must be either json or influx"
            ))),
        }
    }
}

pub struct Exec<R = ProcessRunner> {
    command: Vec<String>,
    format: DataFormat,
    name_suffix: String,
    runner: R,
}

impl Exec {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self::with_runner(
            cfg.exec_command.clone(),
            DataFormat::parse(&cfg.exec_data_format)?,
            cfg.exec_name_suffix.clone(),
            ProcessRunner::new(cfg.exec_timeout),
        ))
    }
}

impl<R: CommandRunner> Exec<R> {
    pub fn with_runner(
        command: Vec<String>,
        format: DataFormat,
        name_suffix: String,
        runner: R,
    ) -> Self {
        Self {
            command,
            format,
            name_suffix,
            runner,
        }
    }

    /// Runs the command once and parses its output. Every record is stamped
    /// with the gather time.
    ///
    /// Influx lines that do not parse are logged and skipped; the first
    /// parse error is returned only when no line parsed.
    pub async fn gather(&self) -> Result<Vec<MetricRecord>> {
        let out = self.runner.run(&self.command).await?;
        let now = Utc::now();

        let records = match self.format {
            DataFormat::Json => {
                let value: serde_json::Value = serde_json::from_slice(&out).map_err(|e| {
                    TallyError::Parse(format!(
                        "unable to parse output of '{}' as JSON: {e}",
                        self.command.join(" ")
                    ))
                })?;
                let fields = flatten_json(&value);
                if fields.is_empty() {
                    Vec::new()
                } else {
                    let name = format!("{JSON_MEASUREMENT}{}", self.name_suffix);
                    vec![MetricRecord::new(name, now)?.with_fields(
                        fields.into_iter().map(|(k, v)| (k, FieldValue::Float(v))),
                    )]
                }
            }
            DataFormat::Influx => {
                let text = String::from_utf8(out).map_err(|e| {
                    TallyError::Parse(format!(
                        "output of '{}' is not valid utf8: {e}",
                        self.command.join(" ")
                    ))
                })?;
                let ParsedLines {
                    records,
                    mut errors,
                } = parse_lines(&text, now);
                if records.is_empty() && !errors.is_empty() {
                    return Err(errors.swap_remove(0));
                }
                for e in &errors {
                    warn!(command = %self.command.join(" "), error = %e, "skipping unparsable line");
                }
                records
                    .into_iter()
                    .map(|r| r.with_name_suffix(&self.name_suffix).with_timestamp(now))
                    .collect()
            }
        };

        debug!(records = records.len(), "exec gather complete");
        Ok(records)
    }
}
