// Elasticsearch HTTP transport implementation
// This file implements the document store client: basic auth, optional
// certificate verification, bounded retries on transient failures
//
// Numan Thabit 2025 Nov

use super::{DocumentStore, IndexInfo};
use crate::errors::ExporterError;
use crate::metrics::{REQ_ERRORS, REQ_LATENCY};
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Connection settings for one store endpoint.
#[derive(Debug, Clone)]
pub struct ElasticSettings {
    pub url: Url,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Accept any server certificate (self-signed clusters)
    pub insecure_skip_verify: bool,
    /// Retry ceiling for transient failures; 0 disables retries
    pub max_retries: u32,
    pub timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl ElasticSettings {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            username: None,
            password: None,
            insecure_skip_verify: false,
            max_retries: 10,
            timeout: Duration::from_secs(30),
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }

    fn to_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            // attempts are bounded by max_retries instead of elapsed time
            max_elapsed_time: None,
            multiplier: 2.0,
            ..ExponentialBackoff::default()
        }
    }
}

#[derive(Clone)]
pub struct ElasticClient {
    base: Url,
    http: Client,
    settings: ElasticSettings,
}

impl ElasticClient {
    pub fn new(settings: ElasticSettings) -> Result<Self, ExporterError> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .gzip(true)
            .danger_accept_invalid_certs(settings.insecure_skip_verify)
            .build()
            .map_err(|e| ExporterError::Transport(format!("build HTTP client: {e}")))?;

        let mut base = settings.url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            base,
            http,
            settings,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.base
    }

    /// Endpoint URL with `segments` appended as literal path segments, so
    /// index names such as `remote:logs-*` are never parsed as a scheme.
    pub fn url_for(&self, segments: &[&str]) -> Result<Url, ExporterError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ExporterError::Transport(format!("endpoint {} cannot carry a path", self.base))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn request(
        &self,
        operation: &'static str,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<Value, ExporterError> {
        let _timer = REQ_LATENCY.with_label_values(&[operation]).start_timer();
        let max_retries = self.settings.max_retries;
        let mut attempt = 0u32;

        let result = retry(self.settings.to_backoff(), || {
            attempt += 1;
            let current = attempt;
            let fut = self.send_once(method.clone(), url.clone(), body);
            async move {
                match fut.await {
                    Ok(value) => Ok(value),
                    Err(backoff::Error::Transient { err, .. }) if current <= max_retries => {
                        debug!(
                            operation = operation,
                            attempt = current,
                            error = %err,
                            "transient store error; retrying"
                        );
                        Err(backoff::Error::transient(err))
                    }
                    Err(backoff::Error::Transient { err, .. }) => {
                        warn!(
                            operation = operation,
                            attempts = current,
                            "store retry budget exhausted"
                        );
                        Err(backoff::Error::permanent(err))
                    }
                    Err(permanent) => Err(permanent),
                }
            }
        })
        .await;

        if let Err(err) = &result {
            REQ_ERRORS
                .with_label_values(&[operation, err.kind()])
                .inc();
        }
        result
    }

    async fn send_once(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<Value, backoff::Error<ExporterError>> {
        let mut req = self.http.request(method, url);
        if let Some(username) = &self.settings.username {
            req = req.basic_auth(username, self.settings.password.as_deref());
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(|e| {
            let err = ExporterError::Transport(format!("send: {e}"));
            if e.is_connect() || e.is_timeout() || e.is_request() {
                backoff::Error::transient(err)
            } else {
                backoff::Error::permanent(err)
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        resp.json::<Value>().await.map_err(|e| {
            backoff::Error::permanent(ExporterError::Decode(format!("json parse: {e}")))
        })
    }
}

fn classify_status(status: StatusCode, body: &str) -> backoff::Error<ExporterError> {
    let detail: String = body.chars().take(512).collect();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            backoff::Error::permanent(ExporterError::Auth(format!("http {status}: {detail}")))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            backoff::Error::transient(ExporterError::Store(format!("http {status}: {detail}")))
        }
        s if s.is_server_error() => {
            backoff::Error::transient(ExporterError::Store(format!("http {status}: {detail}")))
        }
        _ => backoff::Error::permanent(ExporterError::Store(format!("http {status}: {detail}"))),
    }
}

#[async_trait]
impl DocumentStore for ElasticClient {
    async fn search(&self, index: &str, body: &Value) -> Result<Value, ExporterError> {
        let url = self.url_for(&[index, "_search"])?;
        self.request("search", Method::POST, url, Some(body))
            .await
            .map_err(|e| e.context(format!("search index {index}")))
    }

    async fn list_indices(&self) -> Result<Vec<IndexInfo>, ExporterError> {
        let mut url = self.url_for(&["_cat", "indices"])?;
        url.set_query(Some("format=json"));
        let value = self
            .request("cat_indices", Method::GET, url, None)
            .await
            .map_err(|e| e.context("list indices"))?;
        serde_json::from_value(value)
            .map_err(|e| ExporterError::Decode(format!("decode index listing: {e}")))
    }
}
