//! Locale detection and locale redirects.
//!
//! # Responsibilities
//! - Detect the active locale from path, `NEXT_LOCALE` cookie, `Accept-Language` and domain
//! - Decide between a 307 locale redirect and an internal locale prefix
//! - Produce the locale-prefixed pathname rules are matched against
//!
//! # Design Decisions
//! - A locale in the path always wins and never redirects
//! - Only cookie / header detection can cause a redirect
//! - `defaultLocale` membership in `locales` is checked when the manifest is loaded, not here

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::routing::headers::{cookie_value, header_str};

pub const LOCALE_COOKIE: &str = "NEXT_LOCALE";
pub const LOCALE_REDIRECT_STATUS: u16 = 307;

/// Internationalization settings from the deployment manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct I18nConfig {
    pub default_locale: String,
    pub locales: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<DomainLocale>,
    /// `Some(false)` disables cookie / header detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale_detection: Option<bool>,
}

/// A domain bound to a default locale.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainLocale {
    pub domain: String,
    pub default_locale: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locales: Vec<String>,
    /// Redirect to this domain over plain HTTP.
    #[serde(default)]
    pub http: bool,
}

impl DomainLocale {
    fn hostname(&self) -> &str {
        self.domain.split(':').next().unwrap_or(&self.domain)
    }

    fn serves(&self, locale: &str) -> bool {
        self.default_locale.eq_ignore_ascii_case(locale)
            || self.locales.iter().any(|l| l.eq_ignore_ascii_case(locale))
    }
}

impl I18nConfig {
    /// Configured spelling of `candidate`, matched case-insensitively.
    pub fn find_locale(&self, candidate: &str) -> Option<&str> {
        self.locales
            .iter()
            .find(|l| l.eq_ignore_ascii_case(candidate))
            .map(String::as_str)
    }

    pub fn has_default_locale(&self) -> bool {
        self.find_locale(&self.default_locale).is_some()
    }

    pub fn domain_for_host(&self, hostname: &str) -> Option<&DomainLocale> {
        let hostname = hostname.split(':').next().unwrap_or(hostname);
        self.domains
            .iter()
            .find(|d| d.hostname().eq_ignore_ascii_case(hostname))
    }

    /// Domain whose default is `locale`, else the first domain that lists it.
    pub fn domain_for_locale(&self, locale: &str) -> Option<&DomainLocale> {
        self.domains
            .iter()
            .find(|d| d.default_locale.eq_ignore_ascii_case(locale))
            .or_else(|| self.domains.iter().find(|d| d.serves(locale)))
    }

    fn detection_enabled(&self) -> bool {
        self.locale_detection != Some(false)
    }
}

/// How the active locale was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocaleSource {
    Path,
    DetectionDisabled,
    Cookie,
    AcceptLanguage,
    Domain,
    Default,
}

/// Result of locale resolution for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleResolution {
    pub locale: String,
    pub locale_in_path: bool,
    pub source: LocaleSource,
    /// Locale-prefixed pathname used for rule matching.
    pub pathname: String,
    /// Set when the client must be sent to a locale-specific URL.
    pub redirect: Option<Url>,
}

/// Parse `Accept-Language` into tags ordered by descending weight.
///
/// Entries without `q` weigh 1, entries with `q <= 0` are dropped, ties keep
/// header order.
pub fn parse_accept_language(header: &str) -> Vec<String> {
    let mut entries: Vec<(String, f32)> = header
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split(';');
            let tag = parts.next()?.trim();
            if tag.is_empty() {
                return None;
            }
            let mut weight = 1.0_f32;
            for param in parts {
                if let Some(q) = param.trim().strip_prefix("q=") {
                    weight = q.trim().parse().unwrap_or(0.0);
                }
            }
            (weight > 0.0).then(|| (tag.to_string(), weight))
        })
        .collect();

    entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    entries.into_iter().map(|(tag, _)| tag).collect()
}

/// Best configured locale for an `Accept-Language` header.
///
/// Per tag: exact locale, then the bare language, then any locale sharing the
/// language prefix.
pub fn match_accept_language<'a>(config: &'a I18nConfig, header: &str) -> Option<&'a str> {
    for tag in parse_accept_language(header) {
        if let Some(locale) = config.find_locale(&tag) {
            return Some(locale);
        }

        let language = tag.split('-').next().unwrap_or(&tag);
        if let Some(locale) = config.find_locale(language) {
            return Some(locale);
        }

        let prefix_match = config.locales.iter().find(|l| {
            l.split('-')
                .next()
                .is_some_and(|p| p.eq_ignore_ascii_case(language))
        });
        if let Some(locale) = prefix_match {
            return Some(locale);
        }
    }
    None
}

fn prefixed(base_path: &str, locale: &str, rest: &str) -> String {
    if rest == "/" {
        format!("{base_path}/{locale}")
    } else {
        format!("{base_path}/{locale}{rest}")
    }
}

fn unprefixed(base_path: &str, rest: &str) -> String {
    if base_path.is_empty() {
        rest.to_string()
    } else if rest == "/" {
        base_path.to_string()
    } else {
        format!("{base_path}{rest}")
    }
}

/// Resolve the locale for `url`.
///
/// Returns `None` when the path is outside `base_path` or belongs to the
/// framework's internal `/_next/` namespace.
pub fn resolve_locale(
    config: &I18nConfig,
    base_path: &str,
    url: &Url,
    headers: &HeaderMap,
) -> Option<LocaleResolution> {
    let base_path = base_path.trim_end_matches('/');
    let rest = url.path().strip_prefix(base_path)?;
    let rest = match rest {
        "" => "/",
        r if r.starts_with('/') => r,
        _ => return None,
    };
    if rest.starts_with("/_next/") {
        return None;
    }

    let hostname = url.host_str().unwrap_or_default();
    let domain = config.domain_for_host(hostname);
    let domain_default = domain
        .map(|d| d.default_locale.as_str())
        .unwrap_or(config.default_locale.as_str());

    // 1. locale in path
    let first_segment = rest[1..].split('/').next().unwrap_or_default();
    if let Some(locale) = config.find_locale(first_segment) {
        let remainder = &rest[1 + first_segment.len()..];
        let remainder = if remainder.is_empty() { "/" } else { remainder };
        return Some(LocaleResolution {
            locale: locale.to_string(),
            locale_in_path: true,
            source: LocaleSource::Path,
            pathname: prefixed(base_path, locale, remainder),
            redirect: None,
        });
    }

    // 2. detection disabled
    if !config.detection_enabled() {
        return Some(LocaleResolution {
            locale: domain_default.to_string(),
            locale_in_path: false,
            source: LocaleSource::DetectionDisabled,
            pathname: prefixed(base_path, domain_default, rest),
            redirect: None,
        });
    }

    // 3-4. cookie, then Accept-Language
    let detected = cookie_value(headers, LOCALE_COOKIE)
        .and_then(|c| config.find_locale(&c).map(|l| (l, LocaleSource::Cookie)))
        .or_else(|| {
            header_str(headers, "accept-language")
                .and_then(|h| match_accept_language(config, h))
                .map(|l| (l, LocaleSource::AcceptLanguage))
        });

    // 5-6. domain default, then global default
    let (locale, source) = detected.unwrap_or(match domain {
        Some(_) => (domain_default, LocaleSource::Domain),
        None => (domain_default, LocaleSource::Default),
    });

    let redirect = if locale.eq_ignore_ascii_case(domain_default) {
        None
    } else {
        Some(locale_redirect(config, base_path, url, hostname, locale, rest))
    };

    Some(LocaleResolution {
        locale: locale.to_string(),
        locale_in_path: false,
        source,
        pathname: prefixed(base_path, locale, rest),
        redirect,
    })
}

fn locale_redirect(
    config: &I18nConfig,
    base_path: &str,
    url: &Url,
    hostname: &str,
    locale: &str,
    rest: &str,
) -> Url {
    if let Some(target) = config.domain_for_locale(locale) {
        if !target.hostname().eq_ignore_ascii_case(hostname) {
            let scheme = if target.http { "http" } else { "https" };
            let path = if target.default_locale.eq_ignore_ascii_case(locale) {
                unprefixed(base_path, rest)
            } else {
                prefixed(base_path, locale, rest)
            };
            match Url::parse(&format!("{scheme}://{}{path}", target.domain)) {
                Ok(mut redirect) => {
                    redirect.set_query(url.query());
                    return redirect;
                }
                Err(error) => {
                    tracing::warn!(domain = %target.domain, %error, "Invalid locale domain, redirecting on current host");
                }
            }
        }
    }

    let mut redirect = url.clone();
    redirect.set_path(&prefixed(base_path, locale, rest));
    redirect
}
