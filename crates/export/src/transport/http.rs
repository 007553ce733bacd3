use reqwest::header::HeaderMap;
use reqwest::{Client, Method};
use tally_core::error::{Result, TallyError};
use tally_core::model::Datum;

use super::{
    HttpSettings, PutMetricData, build_client, build_http_headers, check_reachable, parse_endpoint,
    post,
};
use crate::driver::BatchTransport;

/// Posts each partition as one JSON `PutMetricData` document. Connecting
/// sends a `HEAD` to the endpoint and fails if nothing answers.
pub struct HttpBatchTransport {
    settings: HttpSettings,
    session: Option<Session>,
}

struct Session {
    client: Client,
    url: reqwest::Url,
    headers: HeaderMap,
}

impl HttpBatchTransport {
    pub fn new(settings: HttpSettings) -> Self {
        Self {
            settings,
            session: None,
        }
    }
}

impl BatchTransport for HttpBatchTransport {
    async fn connect(&mut self) -> Result<()> {
        let url = parse_endpoint(&self.settings.endpoint)?;
        let client = build_client(&self.settings)?;
        let headers = build_http_headers(&self.settings.headers);
        check_reachable(&client, Method::HEAD, url.clone(), &headers).await?;
        self.session = Some(Session {
            client,
            url,
            headers,
        });
        Ok(())
    }

    async fn send_batch(&mut self, namespace: &str, batch: &[Datum]) -> Result<()> {
        let Some(session) = self.session.as_ref() else {
            return Err(TallyError::Transport("http transport is not connected".to_string()));
        };
        let body = serde_json::to_vec(&PutMetricData {
            namespace,
            metric_data: batch,
        })
        .map_err(|e| TallyError::Internal(format!("failed to encode batch: {e}")))?;

        post(
            &session.client,
            session.url.clone(),
            &session.headers,
            "application/json",
            body,
            self.settings.compression,
        )
        .await
    }

    async fn close(&mut self) -> Result<()> {
        self.session = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::driver::{ExportConfig, ExportDriver};
    use crate::driver::DriverState;
    use crate::transport::{Compression, TlsSettings};

    fn settings(endpoint: String) -> HttpSettings {
        HttpSettings {
            endpoint,
            headers: vec![("x-tenant".to_string(), "dev".to_string())],
            compression: Compression::None,
            timeout: Duration::from_secs(5),
            tls: TlsSettings::default(),
        }
    }

    #[tokio::test]
    async fn posts_each_partition_as_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/put"))
            .and(header("x-tenant", "dev"))
            .and(body_partial_json(serde_json::json!({ "Namespace": "Fleet" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let transport = HttpBatchTransport::new(settings(format!("{}/put", server.uri())));
        let mut driver = ExportDriver::new(
            transport,
            ExportConfig {
                max_batch_size: 20,
                max_dimensions: 10,
                namespace: "Fleet".to_string(),
            },
        )
        .unwrap();
        driver.connect().await.unwrap();

        let report = driver
            .write(&testkit::numbered_records(5, 5))
            .await
            .unwrap();
        assert_eq!(report.requests, 2);

        let received = server.received_requests().await.unwrap();
        let posts: Vec<_> = received
            .iter()
            .filter(|r| r.method.as_str() == "POST")
            .collect();
        let first: serde_json::Value = serde_json::from_slice(&posts[0].body).unwrap();
        assert_eq!(first["MetricData"].as_array().unwrap().len(), 20);
        assert_eq!(first["MetricData"][0]["MetricName"], "series0_f00");
        assert_eq!(first["MetricData"][0]["Dimensions"][0]["Name"], "host");
    }

    #[tokio::test]
    async fn server_error_is_a_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut transport = HttpBatchTransport::new(settings(server.uri()));
        transport.connect().await.unwrap();
        let datums = crate::datum::build_datums(&testkit::cpu_record(), 10);
        let err = transport.send_batch("Fleet", &datums).await.unwrap_err();
        assert!(matches!(err, TallyError::Transport(_)));
    }

    #[tokio::test]
    async fn bad_endpoint_fails_connect() {
        let mut transport = HttpBatchTransport::new(settings("nowhere".to_string()));
        assert!(matches!(
            transport.connect().await,
            Err(TallyError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn connect_checks_the_endpoint_answers() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/put"))
            .and(header("x-tenant", "dev"))
            .respond_with(ResponseTemplate::new(405))
            .expect(1)
            .mount(&server)
            .await;

        let mut transport = HttpBatchTransport::new(settings(format!("{}/put", server.uri())));
        transport.connect().await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_connect() {
        let transport = HttpBatchTransport::new(settings("http://127.0.0.1:1/put".to_string()));
        let mut driver = ExportDriver::new(transport, ExportConfig::default()).unwrap();
        let err = driver.connect().await.unwrap_err();
        assert!(matches!(err, TallyError::Connection(_)));
        assert_eq!(driver.state(), DriverState::Disconnected);
    }

    #[tokio::test]
    async fn server_error_on_connect_is_a_connection_error() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let mut transport = HttpBatchTransport::new(settings(server.uri()));
        assert!(matches!(
            transport.connect().await,
            Err(TallyError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn gzip_sets_content_encoding() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("content-encoding", "gzip"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let mut transport = HttpBatchTransport::new(HttpSettings {
            compression: Compression::Gzip,
            ..settings(server.uri())
        });
        transport.connect().await.unwrap();
        let datums = crate::datum::build_datums(&testkit::cpu_record(), 10);
        transport.send_batch("Fleet", &datums).await.unwrap();
    }
}
