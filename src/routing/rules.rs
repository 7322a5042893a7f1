//! Rule document types and their compiled form.
//!
//! # Responsibilities
//! - Deserialize the rule document produced by the build (camelCase JSON)
//! - Compile `sourceRegex` patterns once, at load time
//! - Classify every rule into an explicit action (redirect, rewrite, decorate)
//!
//! # Design Decisions
//! - An invalid pattern or header name is a configuration error, never a per-request failure
//! - Compiled tables are immutable and shared behind `Arc` by the host
//! - Redirect classification happens at compile time so a rule carrying both a
//!   redirect status and an external destination can only ever redirect

use std::collections::BTreeMap;
use std::fmt;

use axum::http::HeaderName;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::routing::error::RuleError;

/// Status codes that qualify a rule as a redirect when paired with a
/// `Location` or `Refresh` header.
pub const REDIRECT_STATUSES: [u16; 5] = [301, 302, 303, 307, 308];

/// Returns true for the status codes a redirect may carry.
pub fn is_redirect_status(status: u16) -> bool {
    REDIRECT_STATUSES.contains(&status)
}

/// One of the named rule collections evaluated by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    BeforeMiddleware,
    BeforeFiles,
    AfterFiles,
    DynamicRoutes,
    OnMatch,
    Fallback,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::BeforeMiddleware => "beforeMiddleware",
            Phase::BeforeFiles => "beforeFiles",
            Phase::AfterFiles => "afterFiles",
            Phase::DynamicRoutes => "dynamicRoutes",
            Phase::OnMatch => "onMatch",
            Phase::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `has` / `missing` side condition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Condition {
    Header {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    Cookie {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    Query {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    Host {
        value: String,
    },
}

/// A routing rule as it appears in the rule document.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRule {
    /// Regex source matched against the request pathname.
    pub source_regex: String,

    /// Destination template with `$1` / `$name` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// Response headers to add when the rule matches.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub has: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// Phases to evaluate again, depth-first, after this rule rewrites.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rerun_routing_phases: Vec<Phase>,
}

/// The full rule document: six ordered phases.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuleSet {
    pub before_middleware: Vec<RouteRule>,
    pub before_files: Vec<RouteRule>,
    pub after_files: Vec<RouteRule>,
    pub dynamic_routes: Vec<RouteRule>,
    pub on_match: Vec<RouteRule>,
    pub fallback: Vec<RouteRule>,
    pub should_normalize_next_data: bool,
}

/// What a rule does once its pattern and conditions match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    /// Terminal redirect. `location` is a placeholder template.
    Redirect { status: u16, location: String },
    /// Internal or external rewrite to the destination template.
    Rewrite { destination: String },
    /// Only contributes headers and/or a status override.
    Decorate,
}

/// A rule with its pattern compiled and its action classified.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub(crate) source: Regex,
    pub(crate) headers: Vec<(HeaderName, String)>,
    pub(crate) has: Vec<Condition>,
    pub(crate) missing: Vec<Condition>,
    pub(crate) status: Option<u16>,
    pub(crate) action: RuleAction,
    pub(crate) rerun: Vec<Phase>,
    destination: Option<String>,
}

impl CompiledRule {
    /// Compile a single rule. `phase` and `index` only feed error messages.
    pub fn compile(rule: &RouteRule, phase: Phase, index: usize) -> Result<Self, RuleError> {
        let source = Regex::new(&rule.source_regex).map_err(|source| RuleError::InvalidRegex {
            phase,
            index,
            pattern: rule.source_regex.clone(),
            source,
        })?;

        let mut headers = Vec::with_capacity(rule.headers.len());
        for (name, value) in &rule.headers {
            let header = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                RuleError::InvalidHeaderName {
                    phase,
                    index,
                    name: name.clone(),
                }
            })?;
            headers.push((header, value.clone()));
        }

        let action = classify(rule);

        Ok(Self {
            source,
            headers,
            has: rule.has.clone(),
            missing: rule.missing.clone(),
            status: rule.status,
            action,
            rerun: rule.rerun_routing_phases.clone(),
            destination: rule.destination.clone(),
        })
    }

    pub fn pattern(&self) -> &str {
        self.source.as_str()
    }

    pub fn action(&self) -> &RuleAction {
        &self.action
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// The raw destination template, regardless of the classified action.
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    pub fn rerun_phases(&self) -> &[Phase] {
        &self.rerun
    }
}

fn classify(rule: &RouteRule) -> RuleAction {
    let header_target = header_ci(&rule.headers, "location")
        .map(str::to_string)
        .or_else(|| header_ci(&rule.headers, "refresh").map(refresh_target));

    if let (Some(status), Some(target)) = (rule.status.filter(|s| is_redirect_status(*s)), header_target) {
        // An empty header value defers to the destination.
        let location = if target.is_empty() {
            rule.destination.clone().unwrap_or_default()
        } else {
            target
        };
        return RuleAction::Redirect { status, location };
    }

    match &rule.destination {
        Some(destination) => RuleAction::Rewrite {
            destination: destination.clone(),
        },
        None => RuleAction::Decorate,
    }
}

fn header_ci<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Extract the target from a `Refresh` value such as `0;url=/next`.
fn refresh_target(value: &str) -> String {
    let lower = value.to_ascii_lowercase();
    match lower.find("url=") {
        Some(pos) => value[pos + 4..].trim().trim_matches(|c| c == '"' || c == '\'').to_string(),
        None => value.trim().to_string(),
    }
}

/// All six phases compiled and ready for resolution.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    before_middleware: Vec<CompiledRule>,
    before_files: Vec<CompiledRule>,
    after_files: Vec<CompiledRule>,
    dynamic_routes: Vec<CompiledRule>,
    on_match: Vec<CompiledRule>,
    fallback: Vec<CompiledRule>,
    should_normalize_next_data: bool,
}

impl RouteTable {
    /// Compile every phase of a rule document. Fails on the first bad rule.
    pub fn compile(rules: &RuleSet) -> Result<Self, RuleError> {
        let table = Self {
            before_middleware: compile_phase(&rules.before_middleware, Phase::BeforeMiddleware)?,
            before_files: compile_phase(&rules.before_files, Phase::BeforeFiles)?,
            after_files: compile_phase(&rules.after_files, Phase::AfterFiles)?,
            dynamic_routes: compile_phase(&rules.dynamic_routes, Phase::DynamicRoutes)?,
            on_match: compile_phase(&rules.on_match, Phase::OnMatch)?,
            fallback: compile_phase(&rules.fallback, Phase::Fallback)?,
            should_normalize_next_data: rules.should_normalize_next_data,
        };

        tracing::debug!(
            before_middleware = table.before_middleware.len(),
            before_files = table.before_files.len(),
            after_files = table.after_files.len(),
            dynamic_routes = table.dynamic_routes.len(),
            on_match = table.on_match.len(),
            fallback = table.fallback.len(),
            "Route table compiled"
        );

        Ok(table)
    }

    pub fn phase(&self, phase: Phase) -> &[CompiledRule] {
        match phase {
            Phase::BeforeMiddleware => &self.before_middleware,
            Phase::BeforeFiles => &self.before_files,
            Phase::AfterFiles => &self.after_files,
            Phase::DynamicRoutes => &self.dynamic_routes,
            Phase::OnMatch => &self.on_match,
            Phase::Fallback => &self.fallback,
        }
    }

    pub fn should_normalize_next_data(&self) -> bool {
        self.should_normalize_next_data
    }

    /// Total number of compiled rules across all phases.
    pub fn len(&self) -> usize {
        [
            Phase::BeforeMiddleware,
            Phase::BeforeFiles,
            Phase::AfterFiles,
            Phase::DynamicRoutes,
            Phase::OnMatch,
            Phase::Fallback,
        ]
        .iter()
        .map(|p| self.phase(*p).len())
        .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn compile_phase(rules: &[RouteRule], phase: Phase) -> Result<Vec<CompiledRule>, RuleError> {
    rules
        .iter()
        .enumerate()
        .map(|(index, rule)| CompiledRule::compile(rule, phase, index))
        .collect()
}
