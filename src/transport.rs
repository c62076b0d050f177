//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::completion_queue::Responder;
use crate::credentials::Credentials;
use crate::error::{ia_err, user_agent, BigtableError, BigtableErrorCode};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{json, Value};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, trace};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Delete,
}

impl HttpMethod {
    fn as_reqwest(&self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// One REST call: a method, a path relative to the transport's endpoint, query
/// parameters and an optional JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct RestRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RestRequest {
    pub fn new(method: HttpMethod, path: &str) -> RestRequest {
        RestRequest {
            method,
            path: path.to_string(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: &str) -> RestRequest {
        RestRequest::new(HttpMethod::Get, path)
    }

    pub fn post(path: &str, body: Value) -> RestRequest {
        RestRequest::new(HttpMethod::Post, path).body(body)
    }

    pub fn delete(path: &str) -> RestRequest {
        RestRequest::new(HttpMethod::Delete, path)
    }

    pub fn query(mut self, key: &str, value: &str) -> RestRequest {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: Value) -> RestRequest {
        self.body = Some(body);
        self
    }

    /// The value of query parameter `key`, if present.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Trait defining how requests reach the service.
///
/// `start()` must not block: it begins the call and arranges for `done` to be
/// completed exactly once, from any thread. Dropping `done` without completing
/// it reports the call as cancelled.
pub trait Transport: Send + Sync + Debug {
    fn start(&self, request: RestRequest, done: Responder<Value>);
}

/// [`Transport`] sending JSON over HTTPS with [`reqwest`].
///
/// Requests run as tasks on a tokio runtime: either one supplied by the
/// caller, or a small runtime owned by the transport. Dropping the transport
/// shuts an owned runtime down; calls still in flight then complete with a
/// `Cancelled` error.
pub struct HttpTransport {
    inner: Arc<HttpTransportRef>,
    handle: Handle,
    runtime: Option<Runtime>,
}

#[derive(Debug)]
struct HttpTransportRef {
    client: reqwest::Client,
    endpoint: Url,
    credentials: Arc<dyn Credentials>,
    timeout: Duration,
}

impl Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("credentials", &self.inner.credentials)
            .field("timeout", &self.inner.timeout)
            .field("owns_runtime", &self.runtime.is_some())
            .finish()
    }
}

impl HttpTransport {
    /// Create a transport for `endpoint`.
    ///
    /// `endpoint` may omit the scheme, in which case `https` is used. If
    /// `client` is `None`, a client is built with `timeout` as its connect
    /// timeout. If `handle` is `None`, the transport starts its own runtime.
    pub fn new(
        endpoint: &str,
        credentials: Arc<dyn Credentials>,
        timeout: Duration,
        client: Option<reqwest::Client>,
        handle: Option<Handle>,
    ) -> Result<HttpTransport, BigtableError> {
        let endpoint = normalize_endpoint(endpoint)?;
        let client = match client {
            Some(c) => c,
            None => reqwest::Client::builder()
                .connect_timeout(timeout)
                .build()?,
        };
        let (handle, runtime) = match handle {
            Some(h) => (h, None),
            None => {
                let rt = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(2)
                    .thread_name("bigtable-http")
                    .enable_all()
                    .build()
                    .map_err(|e| {
                        BigtableError::new(
                            BigtableErrorCode::Internal,
                            &format!("can't start http runtime: {}", e),
                        )
                    })?;
                (rt.handle().clone(), Some(rt))
            }
        };
        debug!("Creating new HttpTransport: endpoint={}", endpoint);
        Ok(HttpTransport {
            inner: Arc::new(HttpTransportRef {
                client,
                endpoint,
                credentials,
                timeout,
            }),
            handle,
            runtime,
        })
    }

    pub fn endpoint(&self) -> &str {
        self.inner.endpoint.as_str()
    }
}

impl Transport for HttpTransport {
    fn start(&self, request: RestRequest, done: Responder<Value>) {
        let inner = Arc::clone(&self.inner);
        self.handle.spawn(async move {
            let result = inner.execute(request).await;
            done.complete(result);
        });
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        if let Some(rt) = self.runtime.take() {
            debug!("shutting down http transport runtime");
            // drops unfinished tasks, and with them their responders
            rt.shutdown_background();
        }
    }
}

impl HttpTransportRef {
    fn url_for(&self, request: &RestRequest) -> Result<Url, BigtableError> {
        let mut url = self.endpoint.join(request.path.trim_start_matches('/'))?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &request.query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    async fn execute(&self, request: RestRequest) -> Result<Value, BigtableError> {
        let url = self.url_for(&request)?;
        let mut headers = HeaderMap::new();
        headers.insert("User-Agent", HeaderValue::from_str(user_agent())?);
        if let Some(auth) = self.credentials.authorization_header()? {
            headers.insert("Authorization", HeaderValue::from_str(&auth)?);
        }
        trace!("{:?} {}", request.method, url);
        let mut rb = self
            .client
            .request(request.method.as_reqwest(), url)
            .timeout(self.timeout)
            .headers(headers);
        if let Some(body) = &request.body {
            rb = rb.json(body);
        }
        let resp = rb.send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            let err = error_from_body(status.as_u16(), &bytes);
            trace!("http status {}: {}", status, err);
            return Err(err);
        }
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(json!({}));
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn normalize_endpoint(endpoint: &str) -> Result<Url, BigtableError> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return ia_err!("endpoint must be non-empty");
    }
    let mut ep = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint)
    };
    // Url::join replaces the last path segment unless the base ends in '/'
    if !ep.ends_with('/') {
        ep.push('/');
    }
    let url = Url::parse(&ep)?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return ia_err!("invalid endpoint scheme '{}'", url.scheme());
    }
    Ok(url)
}

/// Decode a service error body, `{"error": {"code", "message", "status"}}`,
/// falling back to the HTTP status when the body is missing or malformed.
pub(crate) fn error_from_body(http_status: u16, body: &[u8]) -> BigtableError {
    let fallback = BigtableErrorCode::from_http_status(http_status);
    let parsed: Option<Value> = serde_json::from_slice(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));
    let Some(error) = error else {
        let text = String::from_utf8_lossy(body);
        let text = text.trim();
        let message = if text.is_empty() {
            format!("http status {}", http_status)
        } else {
            format!("http status {}: {}", http_status, text)
        };
        return BigtableError::new(fallback, &message);
    };
    let code = match error.get("status").and_then(Value::as_str) {
        Some(name) => match BigtableErrorCode::from_status_name(name) {
            BigtableErrorCode::Unknown => fallback,
            c => c,
        },
        None => fallback,
    };
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("http status {}", http_status));
    BigtableError { code, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::AnonymousCredentials;

    #[test]
    fn structured_error_body() {
        let body = br#"{"error": {"code": 404, "message": "table t1 not found", "status": "NOT_FOUND"}}"#;
        let e = error_from_body(404, body);
        assert_eq!(e.code, BigtableErrorCode::NotFound);
        assert_eq!(e.message, "table t1 not found");

        // status name wins over the http status
        let body = br#"{"error": {"code": 400, "message": "busy", "status": "ABORTED"}}"#;
        assert_eq!(error_from_body(400, body).code, BigtableErrorCode::Aborted);
    }

    #[test]
    fn unstructured_error_body() {
        let e = error_from_body(503, b"upstream connect error");
        assert_eq!(e.code, BigtableErrorCode::Unavailable);
        assert!(e.message.contains("upstream connect error"));
        let e = error_from_body(418, b"");
        assert_eq!(e.code, BigtableErrorCode::Unknown);
        assert_eq!(e.message, "http status 418");
    }

    #[test]
    fn endpoints_and_urls() {
        let url = normalize_endpoint("localhost:8086").unwrap();
        assert_eq!(url.as_str(), "https://localhost:8086/");
        assert!(normalize_endpoint("").is_err());
        assert!(normalize_endpoint("ftp://x").is_err());

        let inner = HttpTransportRef {
            client: reqwest::Client::new(),
            endpoint: normalize_endpoint("http://localhost:8086").unwrap(),
            credentials: Arc::new(AnonymousCredentials),
            timeout: Duration::from_secs(1),
        };
        let req = RestRequest::get("v2/projects/p/instances/i/tables")
            .query("view", "NAME_ONLY")
            .query("pageToken", "a b");
        assert_eq!(
            inner.url_for(&req).unwrap().as_str(),
            "http://localhost:8086/v2/projects/p/instances/i/tables?view=NAME_ONLY&pageToken=a+b"
        );
        let req = RestRequest::post("/v2/projects/p/instances/i/tables/t:dropRowRange", json!({}));
        assert_eq!(
            inner.url_for(&req).unwrap().path(),
            "/v2/projects/p/instances/i/tables/t:dropRowRange"
        );
    }

    #[test]
    fn owned_runtime_shuts_down_on_drop() {
        let t = HttpTransport::new(
            "localhost:1",
            Arc::new(AnonymousCredentials),
            Duration::from_secs(1),
            None,
            None,
        )
        .unwrap();
        assert_eq!(t.endpoint(), "https://localhost:1/");
        drop(t);
    }
}
