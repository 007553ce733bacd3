//! Concrete transports for the batched and routed drivers.

pub mod http;
pub mod queue;
pub mod stdout;

#[cfg(test)]
pub(crate) mod mock;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::Compression as GzLevel;
use flate2::write::GzEncoder;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Certificate, Client, Identity, Method};
use serde::Serialize;
use tally_core::error::{Result, TallyError};
use tally_core::model::Datum;

pub use http::HttpBatchTransport;
pub use queue::RestQueueTransport;
pub use stdout::StdoutTransport;

/// Request body shared by the batched transports.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutMetricData<'a> {
    pub namespace: &'a str,
    pub metric_data: &'a [Datum],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
}

impl Compression {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "gzip" => Self::Gzip,
            _ => Self::None,
        }
    }
}

/// Client-side TLS material. Paths point at PEM files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    pub ca: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub insecure_skip_verify: bool,
}

/// Settings common to the HTTP-based transports.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub endpoint: String,
    pub headers: Vec<(String, String)>,
    pub compression: Compression,
    pub timeout: Duration,
    pub tls: TlsSettings,
}

pub(crate) fn parse_endpoint(endpoint: &str) -> Result<reqwest::Url> {
    let url = reqwest::Url::parse(endpoint.trim_end_matches('/'))
        .map_err(|e| TallyError::Connection(format!("invalid endpoint {endpoint}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(TallyError::Connection(format!(
            "endpoint {endpoint} must use http or https"
        )));
    }
    Ok(url)
}

fn read_pem(path: &Path, what: &str) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        TallyError::Connection(format!("failed reading {what} {}: {e}", path.display()))
    })
}

pub(crate) fn build_client(settings: &HttpSettings) -> Result<Client> {
    let tls = &settings.tls;
    let mut builder = Client::builder().timeout(settings.timeout);

    if let Some(ca) = &tls.ca {
        let cert = Certificate::from_pem(&read_pem(ca, "tls ca")?).map_err(|e| {
            TallyError::Connection(format!("invalid tls ca {}: {e}", ca.display()))
        })?;
        builder = builder.add_root_certificate(cert);
    }
    if let (Some(cert), Some(key)) = (&tls.cert, &tls.key) {
        let mut pem = read_pem(cert, "tls cert")?;
        pem.extend(read_pem(key, "tls key")?);
        let identity = Identity::from_pem(&pem)
            .map_err(|e| TallyError::Connection(format!("invalid tls client identity: {e}")))?;
        builder = builder.identity(identity);
    }
    if tls.insecure_skip_verify {
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder
        .build()
        .map_err(|e| TallyError::Connection(format!("failed to build http client: {e}")))
}

/// Sends a bodiless request to `url` to confirm the backend answers.
///
/// Any response below 500 counts as reachable: batch endpoints commonly
/// refuse methods other than POST.
pub(crate) async fn check_reachable(
    client: &Client,
    method: Method,
    url: reqwest::Url,
    headers: &HeaderMap,
) -> Result<()> {
    let resp = client
        .request(method, url.clone())
        .headers(headers.clone())
        .send()
        .await
        .map_err(|e| TallyError::Connection(format!("{url} is unreachable: {e}")))?;
    let status = resp.status();
    if status.is_server_error() {
        return Err(TallyError::Connection(format!(
            "{url} responded with status {status}"
        )));
    }
    Ok(())
}

pub(crate) fn build_http_headers(headers: &[(String, String)]) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (k, v) in headers {
        let name = HeaderName::try_from(k.as_str());
        let value = HeaderValue::try_from(v.as_str());
        match (name, value) {
            (Ok(name), Ok(value)) => {
                out.insert(name, value);
            }
            _ => {
                tracing::warn!(header = %k, "ignored invalid output HTTP header");
            }
        }
    }
    out
}

pub(crate) fn maybe_compress_body(
    body: Vec<u8>,
    compression: Compression,
) -> std::io::Result<(Vec<u8>, Option<&'static str>)> {
    match compression {
        Compression::None => Ok((body, None)),
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
            encoder.write_all(&body)?;
            let compressed = encoder.finish()?;
            Ok((compressed, Some("gzip")))
        }
    }
}

/// POSTs `body` and maps every failure to a transport error.
pub(crate) async fn post(
    client: &Client,
    url: reqwest::Url,
    headers: &HeaderMap,
    content_type: &str,
    body: Vec<u8>,
    compression: Compression,
) -> Result<()> {
    let (body, content_encoding) = maybe_compress_body(body, compression)
        .map_err(|e| TallyError::Transport(format!("failed to compress payload: {e}")))?;

    let mut req = client
        .post(url.clone())
        .header("content-type", content_type)
        .headers(headers.clone());
    if let Some(encoding) = content_encoding {
        req = req.header("content-encoding", encoding);
    }

    let resp = req
        .body(body)
        .send()
        .await
        .map_err(|e| TallyError::Transport(format!("request to {url} failed: {e}")))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(TallyError::Transport(format!(
            "{url} responded with status {status}"
        )));
    }
    Ok(())
}
