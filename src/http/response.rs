//! Response construction.
//!
//! # Responsibilities
//! - Build redirect responses from resolver outcomes
//! - Layer resolved headers and status overrides over origin responses
//! - Map failures to plain-text error responses
//!
//! # Design Decisions
//! - Same-origin redirects carry a relative `Location`
//! - Block-listed transport headers are never written from resolved headers
//! - `set-cookie` values accumulate; every other resolved header replaces
//!   what the origin sent

use axum::body::Body;
use axum::http::header::{HeaderMap, HeaderValue, LOCATION, SET_COOKIE};
use axum::http::{Response, StatusCode};
use axum::response::IntoResponse;
use url::{Position, Url};

use crate::routing::headers::is_blocked;

/// Redirect to `location`, relative when it shares the request's origin.
pub fn redirect_response(location: &Url, status: u16, request_url: &Url, resolved: &HeaderMap) -> Response<Body> {
    let target = if location.origin() == request_url.origin() {
        &location[Position::BeforePath..]
    } else {
        location.as_str()
    };

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::TEMPORARY_REDIRECT);
    apply_resolved_headers(&mut response, resolved);
    match HeaderValue::from_str(target) {
        Ok(value) => {
            response.headers_mut().insert(LOCATION, value);
            response
        }
        Err(_) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "Invalid redirect target"),
    }
}

/// Copy resolved headers onto `response`.
pub fn apply_resolved_headers(response: &mut Response<Body>, resolved: &HeaderMap) {
    let headers = response.headers_mut();
    for name in resolved.keys() {
        if !is_blocked(name) && name != SET_COOKIE {
            headers.remove(name);
        }
    }
    for (name, value) in resolved {
        if !is_blocked(name) {
            headers.append(name.clone(), value.clone());
        }
    }
}

/// Replace the response status when an override is present and valid.
pub fn apply_status(response: &mut Response<Body>, status: Option<u16>) {
    if let Some(status) = status.and_then(|s| StatusCode::from_u16(s).ok()) {
        *response.status_mut() = status;
    }
}

pub fn error_response(status: StatusCode, message: &'static str) -> Response<Body> {
    (status, message).into_response()
}
