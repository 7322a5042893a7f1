//! Upstream forwarding.
//!
//! # Responsibilities
//! - Forward matched requests to the origin server
//! - Proxy external rewrites to their target
//! - Invoke a remote middleware service over HTTP
//!
//! # Design Decisions
//! - One pooled hyper-util client shared by every upstream call
//! - Transport headers are stripped before forwarding
//! - Plain HTTP only; TLS towards upstreams is terminated elsewhere

use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response};
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use url::{Position, Url};

use crate::routing::headers::without_blocked;
use crate::routing::{MiddlewareError, MiddlewareInvoker, MiddlewareRequest, MiddlewareResponse};

/// Header asking the origin to resume a postponed (partially prerendered) render.
pub const NEXT_RESUME: &str = "next-resume";

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("unsupported upstream scheme `{0}`")]
    UnsupportedScheme(String),

    #[error("failed to build upstream request: {0}")]
    Build(#[from] axum::http::Error),

    #[error("upstream request failed: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),
}

/// Pooled HTTP client for the origin and external rewrite targets.
#[derive(Clone)]
pub struct OriginClient {
    client: Client<HttpConnector, Body>,
    origin: String,
}

impl OriginClient {
    /// `origin` is a `host:port` authority.
    pub fn new(origin: impl Into<String>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            origin: origin.into(),
        }
    }

    /// Send `path_and_query` to the origin.
    pub async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Response<Body>, UpstreamError> {
        let uri = format!("http://{}{}", self.origin, path_and_query);
        self.send(method, &uri, headers, body).await
    }

    /// Ask the origin to resume rendering from `postponed_state`.
    pub async fn resume(
        &self,
        path_and_query: &str,
        headers: &HeaderMap,
        postponed_state: String,
    ) -> Result<Response<Body>, UpstreamError> {
        let mut headers = headers.clone();
        headers.insert(NEXT_RESUME, HeaderValue::from_static("1"));
        self.forward(Method::POST, path_and_query, &headers, Bytes::from(postponed_state))
            .await
    }

    /// Proxy to an absolute URL on another origin.
    pub async fn proxy_external(
        &self,
        method: Method,
        target: &Url,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Response<Body>, UpstreamError> {
        if target.scheme() != "http" {
            return Err(UpstreamError::UnsupportedScheme(target.scheme().to_string()));
        }
        let mut headers = headers.clone();
        if let Some(host) = host_header(target) {
            headers.insert("host", host);
        }
        self.send(method, &target[..Position::AfterQuery], &headers, body).await
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Response<Body>, UpstreamError> {
        let mut request = Request::builder().method(method).uri(uri).body(Body::from(body))?;
        *request.headers_mut() = without_blocked(headers);

        tracing::debug!(uri = %uri, "Forwarding upstream");
        let response: Response<Incoming> = self.client.request(request).await?;
        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

fn host_header(url: &Url) -> Option<HeaderValue> {
    HeaderValue::from_str(&url[Position::BeforeHost..Position::AfterPort]).ok()
}

/// Middleware running as a separate HTTP service.
///
/// The request is replayed against the service with the original path and
/// headers; the response is interpreted with the middleware header protocol.
pub struct RemoteMiddleware {
    client: OriginClient,
    timeout_secs: u64,
    max_body_bytes: usize,
}

impl RemoteMiddleware {
    /// Responses larger than `max_body_bytes` are rejected as invalid.
    pub fn new(address: impl Into<String>, timeout_secs: u64, max_body_bytes: usize) -> Self {
        Self {
            client: OriginClient::new(address),
            timeout_secs,
            max_body_bytes,
        }
    }

    async fn exchange(&self, request: MiddlewareRequest) -> Result<MiddlewareResponse, MiddlewareError> {
        let response = self
            .client
            .forward(
                request.method,
                &request.url[Position::BeforePath..Position::AfterQuery],
                &request.headers,
                request.body,
            )
            .await
            .map_err(|e| MiddlewareError::Transport(e.to_string()))?;

        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| MiddlewareError::InvalidResponse(e.to_string()))?;

        Ok(MiddlewareResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

#[async_trait]
impl MiddlewareInvoker for RemoteMiddleware {
    async fn invoke(&self, request: MiddlewareRequest) -> Result<MiddlewareResponse, MiddlewareError> {
        tokio::time::timeout(Duration::from_secs(self.timeout_secs), self.exchange(request))
            .await
            .map_err(|_| MiddlewareError::Timeout(self.timeout_secs))?
    }
}
