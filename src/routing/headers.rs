//! Header helpers shared by the matcher, the middleware adapter and the resolver.
//!
//! # Responsibilities
//! - Hop-by-hop / transport header block-list
//! - Value-level header map merging at phase boundaries
//! - Cookie header parsing and merging

use axum::http::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};

/// Transport headers that are never copied onto a forwarded request or a final response.
pub const BLOCKED_HEADERS: [&str; 7] = [
    "content-length",
    "transfer-encoding",
    "connection",
    "keepalive",
    "expect",
    "accept-encoding",
    "content-encoding",
];

pub fn is_blocked(name: &HeaderName) -> bool {
    BLOCKED_HEADERS.contains(&name.as_str())
}

/// Copy of `headers` without block-listed entries.
pub fn without_blocked(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_blocked(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Merge `overlay` on top of `base`, returning the merged map.
///
/// Every name present in `overlay` replaces all of its values in `base`;
/// multi-valued overlay entries are preserved.
pub fn merge_headers(mut base: HeaderMap, overlay: &HeaderMap) -> HeaderMap {
    for name in overlay.keys() {
        base.remove(name);
    }
    for (name, value) in overlay {
        base.append(name.clone(), value.clone());
    }
    base
}

/// First value of `name` as a string, if it is valid visible ASCII.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Parse every `Cookie` header into ordered `(name, value)` pairs.
pub fn parse_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| {
            let pair = pair.trim();
            if pair.is_empty() {
                return None;
            }
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    parse_cookies(headers)
        .into_iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v)
}

/// Merge `Set-Cookie` style values (`name=value; Path=/...`) into the request
/// `Cookie` header. Later values replace earlier cookies with the same name.
pub fn merge_set_cookies<'a, I>(headers: &mut HeaderMap, set_cookies: I)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut cookies = parse_cookies(headers);
    let mut changed = false;

    for set_cookie in set_cookies {
        let pair = set_cookie.split(';').next().unwrap_or("").trim();
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        match cookies.iter_mut().find(|(k, _)| k == name) {
            Some(existing) => existing.1 = value.trim().to_string(),
            None => cookies.push((name.to_string(), value.trim().to_string())),
        }
        changed = true;
    }

    if !changed {
        return;
    }

    let serialized = cookies
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("; ");

    match HeaderValue::from_str(&serialized) {
        Ok(value) => {
            headers.insert(COOKIE, value);
        }
        Err(_) => tracing::warn!("Dropping unrepresentable merged cookie header"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_replaces_by_name() {
        let mut base = HeaderMap::new();
        base.insert("x-a", HeaderValue::from_static("1"));
        base.insert("x-b", HeaderValue::from_static("keep"));

        let mut overlay = HeaderMap::new();
        overlay.append("x-a", HeaderValue::from_static("2"));
        overlay.append("x-a", HeaderValue::from_static("3"));

        let merged = merge_headers(base, &overlay);
        let values: Vec<_> = merged.get_all("x-a").iter().collect();
        assert_eq!(values, vec!["2", "3"]);
        assert_eq!(merged.get("x-b").unwrap(), "keep");
    }

    #[test]
    fn test_blocked_headers_stripped() {
        let mut headers = HeaderMap::new();
        headers.insert("content-length", HeaderValue::from_static("10"));
        headers.insert("accept-encoding", HeaderValue::from_static("gzip"));
        headers.insert("x-keep", HeaderValue::from_static("yes"));
        let out = without_blocked(&headers);
        assert_eq!(out.len(), 1);
        assert!(out.contains_key("x-keep"));
    }

    #[test]
    fn test_set_cookie_merge() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("a=1; b=2"));
        merge_set_cookies(&mut headers, ["b=3; Path=/; HttpOnly", "c=4"]);
        assert_eq!(headers.get(COOKIE).unwrap(), "a=1; b=3; c=4");
        assert_eq!(cookie_value(&headers, "c").as_deref(), Some("4"));
    }
}
