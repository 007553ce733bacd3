use std::time::Duration;

use tally_core::config::Config;
use tally_core::error::{Result, TallyError};
use tally_core::model::MetricRecord;

use crate::driver::{DriverState, ExportConfig, ExportDriver, WriteReport};
use crate::routed::{RoutedConfig, RoutedDriver};
use crate::transport::{
    Compression, HttpBatchTransport, HttpSettings, RestQueueTransport, StdoutTransport,
    TlsSettings,
};

/// Everything an output constructor needs, independent of where it came from.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub kind: String,
    pub endpoint: Option<String>,
    pub namespace: String,
    pub max_batch_size: usize,
    pub max_dimensions: usize,
    pub routing_tag: Option<String>,
    pub headers: Vec<(String, String)>,
    pub compression: Compression,
    pub timeout: Duration,
    pub tls: TlsSettings,
}

impl OutputConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            kind: cfg.output_kind.clone(),
            endpoint: cfg.output_endpoint.clone(),
            namespace: cfg.output_namespace.clone(),
            max_batch_size: cfg.output_max_batch_size,
            max_dimensions: cfg.output_max_dimensions,
            routing_tag: cfg.output_routing_tag.clone(),
            headers: cfg.output_headers.clone(),
            compression: Compression::parse(&cfg.output_compression),
            timeout: cfg.output_timeout,
            tls: TlsSettings {
                ca: cfg.output_tls_ca.clone(),
                cert: cfg.output_tls_cert.clone(),
                key: cfg.output_tls_key.clone(),
                insecure_skip_verify: cfg.output_tls_insecure_skip_verify,
            },
        }
    }

    pub fn export_config(&self) -> ExportConfig {
        ExportConfig {
            max_batch_size: self.max_batch_size,
            max_dimensions: self.max_dimensions,
            namespace: self.namespace.clone(),
        }
    }

    pub fn routed_config(&self) -> RoutedConfig {
        RoutedConfig {
            topic: self.namespace.clone(),
            routing_tag: self.routing_tag.clone(),
        }
    }

    pub fn http_settings(&self) -> Result<HttpSettings> {
        let endpoint = self.endpoint.clone().ok_or_else(|| {
            TallyError::Config(format!("output kind {} requires an endpoint", self.kind))
        })?;
        Ok(HttpSettings {
            endpoint,
            headers: self.headers.clone(),
            compression: self.compression,
            timeout: self.timeout,
            tls: self.tls.clone(),
        })
    }
}

/// A configured output, one variant per backend kind.
pub enum Output {
    Stdout(ExportDriver<StdoutTransport>),
    Http(ExportDriver<HttpBatchTransport>),
    Queue(RoutedDriver<RestQueueTransport>),
}

impl Output {
    pub fn stdout(cfg: &OutputConfig) -> Result<Self> {
        Ok(Self::Stdout(ExportDriver::new(
            StdoutTransport::new(),
            cfg.export_config(),
        )?))
    }

    pub fn http(cfg: &OutputConfig) -> Result<Self> {
        Ok(Self::Http(ExportDriver::new(
            HttpBatchTransport::new(cfg.http_settings()?),
            cfg.export_config(),
        )?))
    }

    pub fn queue(cfg: &OutputConfig) -> Result<Self> {
        Ok(Self::Queue(RoutedDriver::new(
            RestQueueTransport::new(cfg.http_settings()?),
            cfg.routed_config(),
        )?))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stdout(_) => "stdout",
            Self::Http(_) => "http",
            Self::Queue(_) => "queue",
        }
    }

    /// Whether records are routed one by one rather than batched as datums.
    pub fn is_routed(&self) -> bool {
        matches!(self, Self::Queue(_))
    }

    pub fn state(&self) -> DriverState {
        match self {
            Self::Stdout(d) => d.state(),
            Self::Http(d) => d.state(),
            Self::Queue(d) => d.state(),
        }
    }

    pub async fn connect(&mut self) -> Result<()> {
        match self {
            Self::Stdout(d) => d.connect().await,
            Self::Http(d) => d.connect().await,
            Self::Queue(d) => d.connect().await,
        }
    }

    pub async fn write(&mut self, records: &[MetricRecord]) -> Result<WriteReport> {
        match self {
            Self::Stdout(d) => d.write(records).await,
            Self::Http(d) => d.write(records).await,
            Self::Queue(d) => d.write(records).await,
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        match self {
            Self::Stdout(d) => d.close().await,
            Self::Http(d) => d.close().await,
            Self::Queue(d) => d.close().await,
        }
    }
}
