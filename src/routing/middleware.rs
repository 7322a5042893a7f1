//! Middleware invocation and header protocol interpretation.
//!
//! # Data Flow
//! ```text
//! current URL + request headers + body
//!     → MiddlewareInvoker::invoke (external execution)
//!     → MiddlewareResponse (status, headers, body)
//!     → interpret(): x-middleware-* protocol headers
//!     → MiddlewareOutcome (continue / rewrite / redirect / responded)
//! ```
//!
//! # Design Decisions
//! - The invoker is an injected trait object; how middleware executes is the host's concern
//! - Invoker errors propagate unchanged, there are no retries here
//! - Protocol headers never leak onto the forwarded request or the final response

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::header::{HeaderMap, HeaderName, HeaderValue, LOCATION};
use axum::http::{Method, StatusCode};
use url::{Origin, Url};

use crate::routing::destination::{resolve_destination, Destination};
use crate::routing::error::MiddlewareError;
use crate::routing::headers::{is_blocked, merge_set_cookies, without_blocked};
use crate::routing::rules::is_redirect_status;

pub const MIDDLEWARE_REWRITE: &str = "x-middleware-rewrite";
pub const MIDDLEWARE_NEXT: &str = "x-middleware-next";
pub const NEXTJS_REDIRECT: &str = "x-nextjs-redirect";
pub const MIDDLEWARE_REFRESH: &str = "x-middleware-refresh";
pub const MIDDLEWARE_OVERRIDE_HEADERS: &str = "x-middleware-override-headers";
pub const MIDDLEWARE_REQUEST_PREFIX: &str = "x-middleware-request-";
pub const MIDDLEWARE_SET_COOKIE: &str = "x-middleware-set-cookie";

/// What the middleware sees.
#[derive(Debug, Clone)]
pub struct MiddlewareRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Raw middleware answer, before protocol interpretation.
#[derive(Debug, Clone)]
pub struct MiddlewareResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl MiddlewareResponse {
    /// A response that lets the request continue untouched.
    pub fn next() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(MIDDLEWARE_NEXT, HeaderValue::from_static("1"));
        Self {
            status: StatusCode::OK,
            headers,
            body: Bytes::new(),
        }
    }
}

/// Executes middleware for a request.
#[async_trait]
pub trait MiddlewareInvoker: Send + Sync {
    async fn invoke(&self, request: MiddlewareRequest) -> Result<MiddlewareResponse, MiddlewareError>;
}

/// Invoker for deployments without middleware: every request continues.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMiddleware;

#[async_trait]
impl MiddlewareInvoker for NoMiddleware {
    async fn invoke(&self, _request: MiddlewareRequest) -> Result<MiddlewareResponse, MiddlewareError> {
        Ok(MiddlewareResponse::next())
    }
}

/// Interpreted middleware result.
#[derive(Debug, Clone)]
pub enum MiddlewareOutcome {
    /// Continue with the same URL.
    Continue {
        request_headers: HeaderMap,
        response_headers: HeaderMap,
    },
    /// Continue with a same-origin rewritten URL.
    Rewrite {
        url: Url,
        request_headers: HeaderMap,
        response_headers: HeaderMap,
    },
    /// Terminal: proxy to another origin.
    ExternalRewrite {
        url: Url,
        request_headers: HeaderMap,
        response_headers: HeaderMap,
    },
    /// Terminal: redirect the client.
    Redirect {
        url: Url,
        status: u16,
        response_headers: HeaderMap,
    },
    /// Terminal: the middleware produced the response body itself.
    Responded {
        status: u16,
        response_headers: HeaderMap,
        body: Bytes,
    },
}

/// Invoke the middleware and interpret its answer.
pub async fn run_middleware(
    invoker: &dyn MiddlewareInvoker,
    method: &Method,
    url: &Url,
    headers: &HeaderMap,
    body: Bytes,
    origin: &Origin,
) -> Result<MiddlewareOutcome, MiddlewareError> {
    let request = MiddlewareRequest {
        method: method.clone(),
        url: url.clone(),
        headers: without_blocked(headers),
        body,
    };
    let response = invoker.invoke(request).await?;
    Ok(interpret(url, headers, response, origin))
}

fn is_protocol_header(name: &HeaderName) -> bool {
    let name = name.as_str();
    name.starts_with("x-middleware-") || name == NEXTJS_REDIRECT
}

/// Request headers to forward after applying override and set-cookie instructions.
fn forwarded_request_headers(request_headers: &HeaderMap, response: &HeaderMap) -> HeaderMap {
    let mut forwarded = match response
        .get(MIDDLEWARE_OVERRIDE_HEADERS)
        .and_then(|v| v.to_str().ok())
    {
        Some(list) => {
            let mut rebuilt = HeaderMap::new();
            for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                let Ok(target) = HeaderName::from_bytes(name.to_ascii_lowercase().as_bytes()) else {
                    tracing::debug!(header = %name, "Ignoring invalid override header name");
                    continue;
                };
                if is_blocked(&target) {
                    continue;
                }
                let source = format!("{MIDDLEWARE_REQUEST_PREFIX}{}", target.as_str());
                // No value means the header is deleted.
                for value in response.get_all(source.as_str()) {
                    rebuilt.append(target.clone(), value.clone());
                }
            }
            rebuilt
        }
        None => without_blocked(request_headers),
    };

    let set_cookies: Vec<&str> = response
        .get_all(MIDDLEWARE_SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    merge_set_cookies(&mut forwarded, set_cookies);

    forwarded
}

/// Response headers the middleware wants on the final response.
fn surfaced_response_headers(response: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in response {
        if !is_protocol_header(name) && !is_blocked(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Translate a middleware response into an outcome.
pub fn interpret(
    url: &Url,
    request_headers: &HeaderMap,
    mut response: MiddlewareResponse,
    origin: &Origin,
) -> MiddlewareOutcome {
    let has_rewrite = response.headers.contains_key(MIDDLEWARE_REWRITE);
    let has_next = response.headers.contains_key(MIDDLEWARE_NEXT);
    let has_location = response.headers.contains_key(LOCATION);

    if !has_rewrite && !has_next && !has_location {
        response
            .headers
            .insert(MIDDLEWARE_REFRESH, HeaderValue::from_static("1"));
    }

    let request_headers = forwarded_request_headers(request_headers, &response.headers);
    let response_headers = surfaced_response_headers(&response.headers);

    if response.headers.contains_key(MIDDLEWARE_REFRESH) {
        return MiddlewareOutcome::Responded {
            status: response.status.as_u16(),
            response_headers,
            body: response.body,
        };
    }

    if let Some(target) = response
        .headers
        .get(MIDDLEWARE_REWRITE)
        .and_then(|v| v.to_str().ok())
    {
        return match resolve_destination(url, target, origin) {
            Destination::Internal(url) => MiddlewareOutcome::Rewrite {
                url,
                request_headers,
                response_headers,
            },
            Destination::External(url) => MiddlewareOutcome::ExternalRewrite {
                url,
                request_headers,
                response_headers,
            },
        };
    }

    if has_next || response.headers.contains_key(NEXTJS_REDIRECT) {
        return MiddlewareOutcome::Continue {
            request_headers,
            response_headers,
        };
    }

    let status = response.status.as_u16();
    match response.headers.get(LOCATION).and_then(|v| v.to_str().ok()) {
        Some(location) if is_redirect_status(status) => MiddlewareOutcome::Redirect {
            url: resolve_destination(url, location, origin).url().clone(),
            status,
            response_headers,
        },
        _ => MiddlewareOutcome::Responded {
            status,
            response_headers,
            body: response.body,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://site.test/a").unwrap()
    }

    fn response(pairs: &[(&'static str, &'static str)]) -> MiddlewareResponse {
        let mut headers = HeaderMap::new();
        for (k, v) in pairs {
            headers.append(*k, HeaderValue::from_static(v));
        }
        MiddlewareResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::new(),
        }
    }

    #[test]
    fn test_same_origin_rewrite_continues() {
        let url = base();
        let outcome = interpret(&url, &HeaderMap::new(), response(&[(MIDDLEWARE_REWRITE, "/b")]), &url.origin());
        match outcome {
            MiddlewareOutcome::Rewrite { url, .. } => assert_eq!(url.path(), "/b"),
            other => panic!("expected rewrite, got {other:?}"),
        }
    }

    #[test]
    fn test_cross_origin_rewrite_is_external() {
        let url = base();
        let outcome = interpret(
            &url,
            &HeaderMap::new(),
            response(&[(MIDDLEWARE_REWRITE, "https://other.test/b")]),
            &url.origin(),
        );
        assert!(matches!(outcome, MiddlewareOutcome::ExternalRewrite { .. }));
    }

    #[test]
    fn test_external_rewrite_carries_overridden_request_headers() {
        let url = base();
        let mut request = HeaderMap::new();
        request.insert("x-secret", HeaderValue::from_static("1"));

        let res = response(&[
            (MIDDLEWARE_REWRITE, "http://other.test/b"),
            (MIDDLEWARE_OVERRIDE_HEADERS, "x-user"),
            ("x-middleware-request-x-user", "alice"),
        ]);

        match interpret(&url, &request, res, &url.origin()) {
            MiddlewareOutcome::ExternalRewrite { request_headers, .. } => {
                assert_eq!(request_headers.get("x-user").unwrap(), "alice");
                assert!(!request_headers.contains_key("x-secret"));
            }
            other => panic!("expected external rewrite, got {other:?}"),
        }
    }

    #[test]
    fn test_body_response_synthesizes_refresh() {
        let url = base();
        let outcome = interpret(&url, &HeaderMap::new(), response(&[("x-custom", "1")]), &url.origin());
        match outcome {
            MiddlewareOutcome::Responded { response_headers, .. } => {
                assert!(response_headers.contains_key("x-custom"));
                assert!(!response_headers.contains_key(MIDDLEWARE_REFRESH));
            }
            other => panic!("expected responded, got {other:?}"),
        }
    }

    #[test]
    fn test_redirect_uses_status() {
        let url = base();
        let mut res = response(&[("location", "/login")]);
        res.status = StatusCode::TEMPORARY_REDIRECT;
        match interpret(&url, &HeaderMap::new(), res, &url.origin()) {
            MiddlewareOutcome::Redirect { url, status, .. } => {
                assert_eq!(status, 307);
                assert_eq!(url.path(), "/login");
            }
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[test]
    fn test_next_with_redirect_marker_continues() {
        let url = base();
        let outcome = interpret(
            &url,
            &HeaderMap::new(),
            response(&[(NEXTJS_REDIRECT, "/x"), ("location", "/x")]),
            &url.origin(),
        );
        assert!(matches!(outcome, MiddlewareOutcome::Continue { .. }));
    }

    #[test]
    fn test_override_headers_rebuild_request() {
        let url = base();
        let mut request = HeaderMap::new();
        request.insert("x-keep", HeaderValue::from_static("old"));
        request.insert("x-drop", HeaderValue::from_static("gone"));
        request.insert("authorization", HeaderValue::from_static("secret"));

        let res = response(&[
            (MIDDLEWARE_NEXT, "1"),
            (MIDDLEWARE_OVERRIDE_HEADERS, "x-keep, x-new, authorization, content-length"),
            ("x-middleware-request-x-keep", "new"),
            ("x-middleware-request-x-new", "a"),
            ("x-middleware-request-x-new", "b"),
            ("x-middleware-request-content-length", "5"),
            (MIDDLEWARE_SET_COOKIE, "token=abc; Path=/"),
        ]);

        match interpret(&url, &request, res, &url.origin()) {
            MiddlewareOutcome::Continue { request_headers, response_headers } => {
                assert_eq!(request_headers.get("x-keep").unwrap(), "new");
                let values: Vec<_> = request_headers.get_all("x-new").iter().collect();
                assert_eq!(values, vec!["a", "b"]);
                assert!(!request_headers.contains_key("x-drop"));
                // listed without a value: deleted
                assert!(!request_headers.contains_key("authorization"));
                assert!(!request_headers.contains_key("content-length"));
                assert_eq!(request_headers.get("cookie").unwrap(), "token=abc");
                // set-cookie never reaches the response
                assert!(response_headers.is_empty());
            }
            other => panic!("expected continue, got {other:?}"),
        }
    }
}
