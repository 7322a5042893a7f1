//! Rule matching logic.
//!
//! # Responsibilities
//! - Match a rule's `sourceRegex` against the request pathname (never the query)
//! - Evaluate `has` (all must hold) and `missing` (none may hold) conditions
//! - Collect positional and named capture groups
//! - Substitute captures into the destination template
//!
//! # Design Decisions
//! - Matching is a pure function of (pathname, query, host, headers); nothing is mutated
//! - Header names are case-insensitive, cookie and query keys are case-sensitive
//! - Host comparison ignores case and port
//! - Conditions are only evaluated after the pattern matched

use std::collections::BTreeMap;

use axum::http::HeaderMap;
use url::Url;

use crate::routing::destination::substitute;
use crate::routing::headers::{cookie_value, header_str};
use crate::routing::rules::{CompiledRule, Condition};

/// Capture groups keyed by position (`"1"`, `"2"`, …) and by group name.
pub type Captures = BTreeMap<String, String>;

/// Outcome of a successful rule match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub captures: Captures,
    /// Destination with placeholders already substituted.
    pub destination: Option<String>,
}

impl Condition {
    /// Returns true if the request satisfies this condition.
    pub fn is_satisfied(&self, url: &Url, headers: &HeaderMap) -> bool {
        match self {
            Condition::Header { key, value } => match value {
                None => headers.contains_key(key.as_str()),
                Some(expected) => headers
                    .get_all(key.as_str())
                    .iter()
                    .filter_map(|v| v.to_str().ok())
                    .any(|v| v == expected.as_str()),
            },
            Condition::Cookie { key, value } => match (cookie_value(headers, key), value) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(actual), Some(expected)) => &actual == expected,
            },
            Condition::Query { key, value } => {
                let mut found = url.query_pairs().filter(|(k, _)| k == key.as_str());
                match value {
                    None => found.next().is_some(),
                    Some(expected) => found.any(|(_, v)| v == expected.as_str()),
                }
            }
            Condition::Host { value } => request_host(url, headers)
                .map(|host| host.eq_ignore_ascii_case(strip_port(value)))
                .unwrap_or(false),
        }
    }
}

/// Hostname of the request, port stripped. Prefers the URL, falls back to `Host`.
fn request_host<'a>(url: &'a Url, headers: &'a HeaderMap) -> Option<&'a str> {
    url.host_str()
        .or_else(|| header_str(headers, "host").map(strip_port))
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // IPv6 literal
        return host.split_once(']').map(|(h, _)| &host[..h.len() + 1]).unwrap_or(host);
    }
    host.split(':').next().unwrap_or(host)
}

/// Test `has` / `missing` only.
pub fn conditions_hold(rule: &CompiledRule, url: &Url, headers: &HeaderMap) -> bool {
    rule.has.iter().all(|c| c.is_satisfied(url, headers))
        && !rule.missing.iter().any(|c| c.is_satisfied(url, headers))
}

/// Collect captures for `pathname`, or `None` if the pattern does not match.
pub fn pattern_captures(rule: &CompiledRule, pathname: &str) -> Option<Captures> {
    let caps = rule.source.captures(pathname)?;
    let mut captures = Captures::new();

    for (index, group) in caps.iter().enumerate().skip(1) {
        if let Some(group) = group {
            captures.insert(index.to_string(), group.as_str().to_string());
        }
    }

    for name in rule.source.capture_names().flatten() {
        if let Some(group) = caps.name(name) {
            captures.insert(name.to_string(), group.as_str().to_string());
        }
    }

    Some(captures)
}

/// Match a rule against the current URL and headers.
pub fn match_rule(rule: &CompiledRule, url: &Url, headers: &HeaderMap) -> Option<RuleMatch> {
    let captures = pattern_captures(rule, url.path())?;

    if !conditions_hold(rule, url, headers) {
        return None;
    }

    let destination = rule.destination().map(|d| substitute(d, &captures));

    Some(RuleMatch {
        captures,
        destination,
    })
}
