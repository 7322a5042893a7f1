//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use route_resolver::deployment::{parse_manifest, Deployment};
use route_resolver::routing::{
    MiddlewareError, MiddlewareInvoker, MiddlewareRequest, MiddlewareResponse, NoMiddleware, RequestContext,
    ResolutionResult, ResolveError,
};

/// Compile a deployment from an inline manifest.
pub fn deployment(manifest: serde_json::Value) -> Deployment {
    parse_manifest(&manifest.to_string()).expect("manifest should compile")
}

pub fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        headers.append(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    headers
}

pub async fn resolve_with(
    deployment: &Deployment,
    url: &str,
    request_headers: HeaderMap,
    middleware: &dyn MiddlewareInvoker,
) -> Result<ResolutionResult, ResolveError> {
    let context = RequestContext::new("test");
    deployment
        .resolve(Url::parse(url).unwrap(), request_headers, Bytes::new(), middleware, &context)
        .await
}

/// Resolve without middleware.
pub async fn resolve(deployment: &Deployment, url: &str, request_headers: HeaderMap) -> ResolutionResult {
    resolve_with(deployment, url, request_headers, &NoMiddleware)
        .await
        .expect("resolution without middleware cannot fail")
}

/// Middleware whose answer is computed by a closure; counts invocations.
pub struct ScriptedMiddleware<F> {
    respond: F,
    calls: AtomicUsize,
}

impl<F> ScriptedMiddleware<F>
where
    F: Fn(&MiddlewareRequest) -> MiddlewareResponse + Send + Sync,
{
    pub fn new(respond: F) -> Self {
        Self {
            respond,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<F> MiddlewareInvoker for ScriptedMiddleware<F>
where
    F: Fn(&MiddlewareRequest) -> MiddlewareResponse + Send + Sync,
{
    async fn invoke(&self, request: MiddlewareRequest) -> Result<MiddlewareResponse, MiddlewareError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((self.respond)(&request))
    }
}

/// Middleware that cannot be reached.
pub struct UnreachableMiddleware;

#[async_trait]
impl MiddlewareInvoker for UnreachableMiddleware {
    async fn invoke(&self, _request: MiddlewareRequest) -> Result<MiddlewareResponse, MiddlewareError> {
        Err(MiddlewareError::Transport("connection refused".into()))
    }
}

pub fn middleware_response(status: u16, pairs: &[(&str, &str)], body: &'static str) -> MiddlewareResponse {
    MiddlewareResponse {
        status: StatusCode::from_u16(status).unwrap(),
        headers: headers(pairs),
        body: Bytes::from_static(body.as_bytes()),
    }
}

/// Start a simple mock backend that returns a fixed response.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let _ = read_request(&mut socket).await;
                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            response.len(),
                            response
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a mock origin that describes the request it received in its body:
///
/// ```text
/// GET /path?query
/// matched: <x-matched-path or ->
/// matches: <x-route-matches or ->
/// resume: <next-resume or ->
/// body: <request body>
/// ```
pub async fn start_echo_origin() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let Some(request) = read_request(&mut socket).await else {
                            return;
                        };
                        let header = |name: &str| request.headers.get(name).cloned().unwrap_or_else(|| "-".into());
                        let body = format!(
                            "{}\nmatched: {}\nmatches: {}\nresume: {}\nbody: {}",
                            request.request_line,
                            header("x-matched-path"),
                            header("x-route-matches"),
                            header("next-resume"),
                            request.body,
                        );
                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

pub struct RecordedRequest {
    /// Method and target, e.g. `GET /a?b=1`.
    pub request_line: String,
    /// Lower-cased header names.
    pub headers: HashMap<String, String>,
    pub body: String,
}

async fn read_request(socket: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines
        .next()?
        .rsplit_once(' ')
        .map(|(line, _version)| line.to_string())?;
    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(RecordedRequest {
        request_line,
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
    })
}
