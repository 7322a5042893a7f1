//! Destination templates and URL resolution.
//!
//! # Responsibilities
//! - Substitute `$1` / `$name` placeholders with captures
//! - Resolve a destination against the current URL
//! - Classify the result as internal (same origin) or external
//!
//! # Design Decisions
//! - Placeholders are substituted longest key first so `$10` is never read as `$1` + `0`
//! - A destination query replaces the current query; without one the current query is kept
//! - Unparseable destinations degrade to a raw path on the current URL instead of failing

use url::{Origin, Url};

use crate::routing::matcher::Captures;

/// Where a destination points relative to the request origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Same origin as the incoming request; evaluation continues.
    Internal(Url),
    /// Different origin; evaluation stops and the request is proxied there.
    External(Url),
}

impl Destination {
    pub fn url(&self) -> &Url {
        match self {
            Destination::Internal(url) | Destination::External(url) => url,
        }
    }
}

/// Substitute captures into a template.
pub fn substitute(template: &str, captures: &Captures) -> String {
    if !template.contains('$') || captures.is_empty() {
        return template.to_string();
    }

    let mut keys: Vec<&String> = captures.keys().collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let mut out = template.to_string();
    for key in keys {
        let placeholder = format!("${key}");
        if out.contains(&placeholder) {
            out = out.replace(&placeholder, &captures[key]);
        }
    }
    out
}

fn is_absolute(destination: &str) -> bool {
    let lower = destination
        .get(..8)
        .unwrap_or(destination)
        .to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Resolve `destination` against `base`.
pub fn apply_destination(base: &Url, destination: &str) -> Url {
    let resolved = if is_absolute(destination) {
        Url::parse(destination)
    } else {
        base.join(destination)
    };

    match resolved {
        Ok(mut url) => {
            if !destination.contains('?') {
                url.set_query(base.query());
            }
            url.set_fragment(None);
            url
        }
        Err(error) => {
            tracing::debug!(%destination, %error, "Destination did not parse, using it as a raw path");
            let mut url = base.clone();
            let (path, query) = match destination.split_once('?') {
                Some((path, query)) => (path, Some(query)),
                None => (destination, base.query()),
            };
            url.set_path(path);
            url.set_query(query);
            url
        }
    }
}

/// Resolve and classify against the origin captured at resolution entry.
pub fn resolve_destination(base: &Url, destination: &str, origin: &Origin) -> Destination {
    let url = apply_destination(base, destination);
    if &url.origin() == origin {
        Destination::Internal(url)
    } else {
        Destination::External(url)
    }
}
