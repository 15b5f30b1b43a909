//! Elasticsearch REST client.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Certificate, Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use super::error::IndexError;
use super::retry::RetryPolicy;
use super::{lease_param, FieldMappings, IndexClient, ScrollRequest};
use crate::config::IndexConfig;
use crate::models::{IndexedDocument, ScrollPage};

/// Index client over HTTP with bounded retries on every call.
#[derive(Clone)]
pub struct HttpIndexClient {
    base_url: Url,
    client: Client,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "_scroll_id", default)]
    scroll_id: Option<String>,
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    total: Option<TotalHits>,
    #[serde(default)]
    hits: Vec<IndexedDocument>,
}

/// `hits.total` is an object on current servers and a bare number on old ones.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TotalHits {
    Count(u64),
    Object { value: u64 },
}

impl TotalHits {
    fn value(&self) -> u64 {
        match self {
            TotalHits::Count(n) => *n,
            TotalHits::Object { value } => *value,
        }
    }
}

impl From<SearchResponse> for ScrollPage {
    fn from(resp: SearchResponse) -> Self {
        ScrollPage {
            scroll_id: resp.scroll_id,
            total: resp.hits.total.map(|t| t.value()).unwrap_or(0),
            hits: resp.hits.hits,
        }
    }
}

impl HttpIndexClient {
    /// Create a client for `base_url`.
    ///
    /// `api_key` is an `(id, key)` pair sent as `Authorization: ApiKey ...`.
    /// `ca_certs` is a PEM bundle trusted in addition to the system roots.
    pub fn new(
        base_url: &str,
        api_key: Option<(&str, &str)>,
        ca_certs: Option<&Path>,
        request_timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, IndexError> {
        let base_url =
            Url::parse(base_url).map_err(|e| IndexError::Setup(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(IndexError::Setup(format!("{} cannot be a base URL", base_url)));
        }

        let mut headers = HeaderMap::new();
        if let Some((id, key)) = api_key {
            let token = base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", id, key));
            let mut value = HeaderValue::from_str(&format!("ApiKey {}", token))
                .map_err(|e| IndexError::Setup(format!("invalid API key: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let mut builder = Client::builder()
            .timeout(request_timeout)
            .gzip(true)
            .default_headers(headers);

        if let Some(path) = ca_certs {
            let pem = std::fs::read(path).map_err(|e| {
                IndexError::Setup(format!("cannot read CA bundle {}: {}", path.display(), e))
            })?;
            let cert = Certificate::from_pem(&pem)
                .map_err(|e| IndexError::Setup(format!("invalid CA bundle: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| IndexError::Setup(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            client,
            retry,
        })
    }

    /// Create a client from connection settings.
    pub fn from_config(config: &IndexConfig) -> Result<Self, IndexError> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let retry = RetryPolicy::new(config.max_retries, timeout);
        let credentials = config.credentials();
        Self::new(
            &config.base_url(),
            credentials.map(|(id, key, _)| (id, key)),
            credentials.map(|(_, _, certs)| certs),
            timeout,
            retry,
        )
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, segments: &[&str]) -> Result<Url, IndexError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| IndexError::Setup(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request through the retry policy and decode the JSON body.
    async fn send<T: DeserializeOwned>(
        &self,
        operation: &str,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<T, IndexError> {
        self.send_counted(operation, method, url, body)
            .await
            .map(|(value, _)| value)
    }

    /// `send`, also returning the number of attempts it took.
    async fn send_counted<T: DeserializeOwned>(
        &self,
        operation: &str,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<(T, u32), IndexError> {
        self.retry
            .run_counted(operation, || {
                let mut request = self.client.request(method.clone(), url.clone());
                if let Some(body) = body {
                    request = request.json(body);
                }
                async move {
                    let resp = request
                        .send()
                        .await
                        .map_err(|e| IndexError::connection(operation, e))?;

                    let status = resp.status();
                    if !status.is_success() {
                        let body = resp.text().await.unwrap_or_default();
                        return Err(IndexError::Status {
                            operation: operation.to_string(),
                            status: status.as_u16(),
                            body,
                        });
                    }

                    resp.json::<T>()
                        .await
                        .map_err(|e| IndexError::parse(operation, e))
                }
            })
            .await
    }
}

/// Pull `properties` out of a `GET /{index}/_mapping` response.
fn parse_mapping(resp: &Value) -> Result<FieldMappings, IndexError> {
    let index_entry = resp
        .as_object()
        .and_then(|obj| obj.values().next())
        .ok_or_else(|| IndexError::parse("get_mapping", "response has no index entry"))?;

    let mut fields = FieldMappings::new();
    if let Some(properties) = index_entry
        .pointer("/mappings/properties")
        .and_then(Value::as_object)
    {
        for (name, definition) in properties {
            let field_type = definition
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("object");
            fields.insert(name.clone(), field_type.to_string());
        }
    }
    Ok(fields)
}

fn scroll_search_body(request: &ScrollRequest) -> Value {
    let mut body = json!({
        "size": request.page_size,
        "query": {"match_all": {}},
        "track_total_hits": true,
        "sort": ["_doc"],
    });
    if !request.source_fields.is_empty() {
        body["_source"] = json!(request.source_fields);
    }
    body
}

#[async_trait]
impl IndexClient for HttpIndexClient {
    async fn ping(&self) -> Result<(), IndexError> {
        let _: Value = self
            .send("ping", Method::GET, self.base_url.clone(), None)
            .await?;
        Ok(())
    }

    async fn open_scroll(
        &self,
        index: &str,
        request: &ScrollRequest,
    ) -> Result<ScrollPage, IndexError> {
        let mut url = self.url(&[index, "_search"])?;
        url.query_pairs_mut()
            .append_pair("scroll", &lease_param(request.lease));
        let body = scroll_search_body(request);

        debug!("Opening scroll on {} (page size {})", index, request.page_size);
        let resp: SearchResponse = self.send("search", Method::POST, url, Some(&body)).await?;
        Ok(resp.into())
    }

    async fn next_scroll(
        &self,
        scroll_id: &str,
        lease: Duration,
    ) -> Result<ScrollPage, IndexError> {
        let url = self.url(&["_search", "scroll"])?;
        let body = json!({"scroll": lease_param(lease), "scroll_id": scroll_id});
        let (resp, attempts): (SearchResponse, u32) = self
            .send_counted("scroll", Method::POST, url, Some(&body))
            .await?;
        if attempts > 1 {
            // A timed-out attempt may already have advanced the cursor.
            warn!(
                "Scroll continuation needed {} attempts; a page may have been skipped ({} documents returned)",
                attempts,
                resp.hits.hits.len()
            );
        }
        Ok(resp.into())
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), IndexError> {
        let url = self.url(&["_search", "scroll"])?;
        let body = json!({"scroll_id": [scroll_id]});
        match self
            .send::<Value>("clear_scroll", Method::DELETE, url, Some(&body))
            .await
        {
            Ok(_) => Ok(()),
            // Already expired or released.
            Err(e) if e.status() == Some(StatusCode::NOT_FOUND.as_u16()) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn update_document(
        &self,
        index: &str,
        id: &str,
        doc: &Value,
    ) -> Result<(), IndexError> {
        let url = self.url(&[index, "_update", id])?;
        let body = json!({ "doc": doc });
        let _: Value = self.send("update", Method::POST, url, Some(&body)).await?;
        Ok(())
    }

    async fn get_mapping(&self, index: &str) -> Result<FieldMappings, IndexError> {
        let url = self.url(&[index, "_mapping"])?;
        let resp: Value = self.send("get_mapping", Method::GET, url, None).await?;
        parse_mapping(&resp)
    }

    async fn put_mapping(&self, index: &str, fields: &FieldMappings) -> Result<(), IndexError> {
        let url = self.url(&[index, "_mapping"])?;
        let properties: serde_json::Map<String, Value> = fields
            .iter()
            .map(|(name, field_type)| (name.clone(), json!({ "type": field_type })))
            .collect();
        let body = json!({ "properties": properties });
        let _: Value = self.send("put_mapping", Method::PUT, url, Some(&body)).await?;
        Ok(())
    }
}
