use crate::batch::Batch;
use crate::sink::{LogSink, SinkError, SinkResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Configuration for [`OpenSearchSink`].
#[derive(Clone, Debug)]
pub struct OpenSearchConfig {
    /// Base URL of the cluster, e.g. "http://localhost:9200".
    pub base_url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl OpenSearchConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            user: None,
            password: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// OpenSearch sink that ships each batch with one `_bulk` request.
#[derive(Clone)]
pub struct OpenSearchSink {
    client: Client,
    config: OpenSearchConfig,
}

#[derive(Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

impl OpenSearchSink {
    pub fn new(config: OpenSearchConfig) -> Result<Self, SinkError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/_bulk", self.config.base_url.trim_end_matches('/'))
    }

    /// Render the NDJSON bulk body: an `index` action line followed by the
    /// document, for every document in the batch.
    pub fn bulk_body(index: &str, batch: &Batch) -> Vec<u8> {
        let action = serde_json::json!({ "index": { "_index": index } }).to_string();
        let mut body = Vec::with_capacity(batch.byte_len() + batch.len() * (action.len() + 2));
        for doc in batch.documents() {
            body.extend_from_slice(action.as_bytes());
            body.push(b'\n');
            let bytes = doc.as_bytes();
            if bytes.contains(&b'\n') {
                // Indented documents would break the line protocol.
                match serde_json::from_slice::<serde_json::Value>(bytes) {
                    Ok(value) => body.extend_from_slice(value.to_string().as_bytes()),
                    Err(_) => body.extend(bytes.iter().map(|b| if *b == b'\n' { b' ' } else { *b })),
                }
            } else {
                body.extend_from_slice(bytes);
            }
            body.push(b'\n');
        }
        body
    }
}

#[async_trait]
impl LogSink for OpenSearchSink {
    async fn send(&self, destination: &str, batch: &Batch) -> SinkResult {
        let body = Self::bulk_body(destination, batch);

        let mut request = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/x-ndjson")
            .body(body);
        if let Some(user) = &self.config.user {
            request = request.basic_auth(user, self.config.password.as_ref());
        }
        let resp = request.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.ok();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        // A 200 can still carry per-document failures.
        let text = resp.text().await?;
        match serde_json::from_str::<BulkResponse>(&text) {
            Ok(parsed) if parsed.errors => {
                let failed: Vec<&serde_json::Value> = parsed
                    .items
                    .iter()
                    .filter(|item| {
                        item.as_object()
                            .and_then(|ops| ops.values().next())
                            .map(|op| op.get("error").is_some())
                            .unwrap_or(false)
                    })
                    .collect();
                Err(SinkError::Rejected {
                    status: status.as_u16(),
                    body: Some(format!(
                        "{} of {} documents failed: {}",
                        failed.len(),
                        batch.len(),
                        failed
                            .first()
                            .map(|v| v.to_string())
                            .unwrap_or_default()
                    )),
                })
            }
            _ => Ok(()),
        }
    }
}
