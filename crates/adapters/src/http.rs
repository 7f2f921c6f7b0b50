//! HTTP API source: GET/POST with bearer auth, query/body passthrough, and
//! offset/limit or next-link pagination.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use intake_core::{IntakeError, RawPayload};

use crate::{config_err, SourceAdapter};

const DEFAULT_TIMEOUT_SECONDS: f64 = 10.0;

fn default_limit() -> i64 {
    50
}

fn default_max_pages() -> i64 {
    5
}

/// Pagination settings from the source parameter map.
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationParams {
    pub mode: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_max_pages")]
    pub max_pages: i64,
}

/// Parameter map for an HTTP API source.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpParams {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub query: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub pagination: Option<PaginationParams>,
    #[serde(default)]
    pub timeout: Option<f64>,
}

impl HttpParams {
    pub fn parse(params: &Value) -> Result<HttpParams, IntakeError> {
        let parsed: HttpParams = serde_json::from_value(params.clone())
            .map_err(|e| config_err(format!("invalid HTTP source params: {e}")))?;
        if parsed.url.as_deref().unwrap_or("").is_empty() {
            return Err(config_err("HTTP source requires 'url'"));
        }
        let method = parsed.method.as_deref().unwrap_or("GET").to_uppercase();
        if method != "GET" && method != "POST" {
            return Err(config_err("HTTP source only supports GET/POST"));
        }
        Ok(parsed)
    }

    fn method(&self) -> Method {
        match self.method.as_deref().unwrap_or("GET").to_uppercase().as_str() {
            "POST" => Method::POST,
            _ => Method::GET,
        }
    }

    fn url(&self) -> &str {
        self.url.as_deref().unwrap_or_default()
    }
}

/// Fetches payloads from an HTTP JSON endpoint with pagination.
pub struct HttpApiSource {
    params: HttpParams,
    client: Client,
}

impl HttpApiSource {
    pub fn from_params(params: &Value) -> Result<Self, IntakeError> {
        let params = HttpParams::parse(params)?;
        let timeout = params.timeout.unwrap_or(DEFAULT_TIMEOUT_SECONDS);
        let client = Client::builder()
            .timeout(Duration::from_secs_f64(timeout))
            .build()
            .map_err(|e| config_err(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { params, client })
    }

    /// Issue one request. Transport faults are retryable; HTTP status
    /// errors are not.
    async fn request(
        &self,
        url: &str,
        extra_query: Option<&[(&str, String)]>,
    ) -> Result<Response, IntakeError> {
        let mut req = self.client.request(self.params.method(), url);
        if let Some(headers) = &self.params.headers {
            for (key, value) in headers {
                req = req.header(key, value);
            }
        }
        if let Some(token) = &self.params.token {
            req = req.bearer_auth(token);
        }
        if let Some(query) = &self.params.query {
            let pairs: Vec<(String, String)> = query
                .iter()
                .map(|(k, v)| (k.clone(), query_value(v)))
                .collect();
            req = req.query(&pairs);
        }
        if let Some(extra) = extra_query {
            req = req.query(extra);
        }
        if let Some(body) = &self.params.body {
            req = req.json(body);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() || e.is_request() {
                IntakeError::Retryable(format!("HTTP request failed: {e}"))
            } else {
                IntakeError::Adapter(format!("HTTP request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(IntakeError::Adapter(format!(
                "HTTP status error: {status} for {url}"
            )));
        }
        Ok(response)
    }

    /// Read the response body into a payload. JSON bodies are re-serialized
    /// to a canonical byte form; everything else passes through raw. Also
    /// returns the parsed JSON when present, for pagination decisions.
    async fn to_payload(response: Response) -> Result<(RawPayload, Option<Value>), IntakeError> {
        let status_code = response.status().as_u16() as i64;
        let url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| IntakeError::Retryable(format!("HTTP body read failed: {e}")))?;

        let is_json = content_type
            .as_deref()
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false);
        let (body, parsed) = if is_json {
            let value: Value = serde_json::from_slice(&bytes)
                .map_err(|e| IntakeError::Adapter(format!("failed to parse JSON body: {e}")))?;
            let canonical = serde_json::to_vec(&value)?;
            (canonical, Some(value))
        } else {
            (bytes.to_vec(), None)
        };

        let payload = RawPayload {
            body,
            content_type,
            uri: Some(url),
            status_code: Some(status_code),
            ..Default::default()
        };
        Ok((payload, parsed))
    }

    async fn fetch_offset_pages(
        &self,
        pagination: &PaginationParams,
    ) -> Result<Vec<RawPayload>, IntakeError> {
        let limit = pagination.limit.max(1);
        let mut offset = pagination.offset;
        let mut payloads = Vec::new();
        for page in 0..pagination.max_pages {
            let step = [
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ];
            let response = self.request(self.params.url(), Some(&step)).await?;
            let (payload, parsed) = Self::to_payload(response).await?;
            payloads.push(payload);
            let count = parsed.as_ref().map(item_count).unwrap_or(0);
            debug!(page, offset, count, "fetched offset page");
            if (count as i64) < limit {
                break;
            }
            offset += limit;
        }
        Ok(payloads)
    }

    async fn fetch_next_url_pages(
        &self,
        pagination: &PaginationParams,
    ) -> Result<Vec<RawPayload>, IntakeError> {
        let mut next_url = self.params.url().to_string();
        let mut payloads = Vec::new();
        for page in 0..pagination.max_pages {
            let response = self.request(&next_url, None).await?;
            let (payload, parsed) = Self::to_payload(response).await?;
            payloads.push(payload);
            let next = parsed.as_ref().and_then(extract_next_link);
            debug!(page, has_next = next.is_some(), "fetched next-link page");
            match next {
                Some(url) => next_url = url,
                None => break,
            }
        }
        Ok(payloads)
    }
}

#[async_trait]
impl SourceAdapter for HttpApiSource {
    async fn fetch(&self) -> Result<Vec<RawPayload>, IntakeError> {
        match self.params.pagination.as_ref() {
            Some(p) if p.mode.as_deref() == Some("offset") => self.fetch_offset_pages(p).await,
            Some(p) if p.mode.as_deref() == Some("next_url") => self.fetch_next_url_pages(p).await,
            _ => {
                let response = self.request(self.params.url(), None).await?;
                let (payload, _) = Self::to_payload(response).await?;
                Ok(vec![payload])
            }
        }
    }
}

/// Number of items a page carries, for the short-page stop condition.
fn item_count(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        _ => 1,
    }
}

/// A `next`/`next_url` link in the response body, when present.
fn extract_next_link(value: &Value) -> Option<String> {
    let link = value.get("next").or_else(|| value.get("next_url"))?;
    link.as_str().map(|s| s.to_string())
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
