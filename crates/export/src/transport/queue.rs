use reqwest::header::HeaderMap;
use reqwest::{Client, Method};
use serde_json::json;
use tally_core::error::{Result, TallyError};

use super::{HttpSettings, build_client, build_http_headers, check_reachable, parse_endpoint, post};
use crate::routed::RecordTransport;

const CONTENT_TYPE: &str = "application/vnd.kafka.json.v2+json";

/// Produces records through a Kafka REST proxy: `POST {endpoint}/topics/{topic}`.
/// Connecting lists the proxy's topics to check it answers.
pub struct RestQueueTransport {
    settings: HttpSettings,
    session: Option<Session>,
}

struct Session {
    client: Client,
    base: reqwest::Url,
    headers: HeaderMap,
}

impl RestQueueTransport {
    pub fn new(settings: HttpSettings) -> Self {
        Self {
            settings,
            session: None,
        }
    }
}

fn topics_url(base: &reqwest::Url, topic: Option<&str>) -> Result<reqwest::Url> {
    let mut url = base.clone();
    {
        let mut segments = url.path_segments_mut().map_err(|_| {
            TallyError::Connection(format!("endpoint {base} cannot carry a path"))
        })?;
        segments.pop_if_empty().push("topics");
        if let Some(topic) = topic {
            segments.push(topic);
        }
    }
    Ok(url)
}

impl RecordTransport for RestQueueTransport {
    async fn connect(&mut self) -> Result<()> {
        let base = parse_endpoint(&self.settings.endpoint)?;
        let client = build_client(&self.settings)?;
        let headers = build_http_headers(&self.settings.headers);
        check_reachable(&client, Method::GET, topics_url(&base, None)?, &headers).await?;
        self.session = Some(Session {
            client,
            base,
            headers,
        });
        Ok(())
    }

    async fn send_record(&mut self, topic: &str, key: Option<&str>, payload: &str) -> Result<()> {
        let Some(session) = self.session.as_ref() else {
            return Err(TallyError::Transport("queue transport is not connected".to_string()));
        };
        let url = topics_url(&session.base, Some(topic))?;
        let body = serde_json::to_vec(&json!({
            "records": [{ "key": key, "value": payload }]
        }))
        .map_err(|e| TallyError::Internal(format!("failed to encode record: {e}")))?;

        post(
            &session.client,
            url,
            &session.headers,
            CONTENT_TYPE,
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
