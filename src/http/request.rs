//! Request-side helpers.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) as early as possible
//! - Rebuild the absolute request URL the resolver works on
//!
//! # Design Decisions
//! - The ID is set by tower-http's `SetRequestIdLayer` and echoed back by
//!   `PropagateRequestIdLayer`; an ID supplied by the client is kept
//! - Scheme comes from `x-forwarded-proto` when a TLS terminator sits in front

use axum::http::{HeaderMap, HeaderValue, Request, Uri};
use tower_http::request_id::{MakeRequestId, RequestId};
use url::Url;
use uuid::Uuid;

use crate::routing::headers::header_str;

pub const X_REQUEST_ID: &str = "x-request-id";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Request ID generator backed by UUID v4.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// The request ID set by the request-id layer, or `"unknown"`.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Absolute URL of the incoming request.
pub fn request_url(uri: &Uri, headers: &HeaderMap) -> Result<Url, url::ParseError> {
    let scheme = match header_str(headers, X_FORWARDED_PROTO) {
        Some(proto) if proto.eq_ignore_ascii_case("https") => "https",
        _ => "http",
    };
    let host = header_str(headers, "host")
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or("localhost");
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    Url::parse(&format!("{scheme}://{host}{path_and_query}"))
}
