//! Phase orchestration.
//!
//! # Data Flow
//! ```text
//! request URL
//!     → data URL normalization (when enabled and the path is a data URL)
//!     → locale resolution            (may redirect)
//!     → beforeMiddleware             (redirect / external rewrite terminate)
//!     → middleware                   (may respond, redirect, rewrite)
//!     → beforeFiles
//!     → static pathname check        (hit: matched)
//!     → afterFiles                   (re-probe after every rewrite)
//!     → dynamicRoutes
//!     → fallback                     (re-probe after every rewrite)
//!     → no match
//! ```
//!
//! # Design Decisions
//! - Rules inside a phase chain: each rewrite feeds the next rule
//! - Redirects and external rewrites stop evaluation immediately
//! - `rerunRoutingPhases` re-enters [`PhaseRunner::run_phases`] with the accumulated state
//! - The only await point is the middleware invocation

use std::collections::HashSet;

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, Method};
use tracing::Instrument;
use url::{Origin, Url};

use crate::routing::data_url::DataUrls;
use crate::routing::destination::{apply_destination, resolve_destination, substitute, Destination};
use crate::routing::error::ResolveError;
use crate::routing::headers::merge_headers;
use crate::routing::i18n::{resolve_locale, I18nConfig, LOCALE_REDIRECT_STATUS};
use crate::routing::matcher::{conditions_hold, match_rule, pattern_captures, Captures};
use crate::routing::middleware::{run_middleware, MiddlewareInvoker, MiddlewareOutcome};
use crate::routing::rules::{CompiledRule, Phase, RouteTable, RuleAction};

/// Nesting limit for `rerunRoutingPhases`.
pub const MAX_RERUN_DEPTH: usize = 8;

/// Per-request context supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub request_id: String,
    /// Method of the incoming request, replayed to the middleware.
    pub method: Method,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            method: Method::GET,
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }
}

/// Inputs to one resolution run.
pub struct ResolveParams<'a> {
    pub url: Url,
    pub build_id: &'a str,
    pub base_path: &'a str,
    pub headers: HeaderMap,
    pub pathnames: &'a HashSet<String>,
    pub i18n: Option<&'a I18nConfig>,
    pub routes: &'a RouteTable,
    pub invoke_middleware: &'a dyn MiddlewareInvoker,
    pub request_body: Bytes,
    pub context: &'a RequestContext,
}

/// Terminal decision of a resolution run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Redirect { url: Url, status: u16 },
    ExternalRewrite { url: Url },
    Matched {
        pathname: String,
        route_matches: Option<Captures>,
    },
    /// The middleware produced the response; its body is carried along.
    MiddlewareResponded { status: u16, body: Bytes },
    NoMatch,
}

impl Outcome {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Redirect { .. } => "redirect",
            Outcome::ExternalRewrite { .. } => "external_rewrite",
            Outcome::Matched { .. } => "matched",
            Outcome::MiddlewareResponded { .. } => "middleware_responded",
            Outcome::NoMatch => "no_match",
        }
    }
}

/// Everything a host needs to act on a resolved request.
#[derive(Debug, Clone)]
pub struct ResolutionResult {
    pub outcome: Outcome,
    /// Response headers accumulated across phases.
    pub resolved_headers: HeaderMap,
    /// Last status override set by a rule or the middleware.
    pub status: Option<u16>,
    /// Final internal URL.
    pub url: Url,
    /// Request headers to forward onward.
    pub request_headers: HeaderMap,
    pub locale: Option<String>,
}

/// Mutable state threaded through the phases of one run.
#[derive(Debug, Clone)]
pub struct RoutingState {
    pub url: Url,
    pub request_headers: HeaderMap,
    pub resolved_headers: HeaderMap,
    pub status: Option<u16>,
}

impl RoutingState {
    pub fn new(url: Url, request_headers: HeaderMap) -> Self {
        Self {
            url,
            request_headers,
            resolved_headers: HeaderMap::new(),
            status: None,
        }
    }
}

/// Result of evaluating one or more phases.
#[derive(Debug)]
pub enum Step {
    Continue(RoutingState),
    Done(RoutingState, Outcome),
}

/// Synchronous phase evaluation over a compiled route table.
pub struct PhaseRunner<'a> {
    routes: &'a RouteTable,
    pathnames: &'a HashSet<String>,
    data_urls: DataUrls,
    is_data_url: bool,
    origin: Origin,
}

impl<'a> PhaseRunner<'a> {
    pub fn new(
        routes: &'a RouteTable,
        pathnames: &'a HashSet<String>,
        data_urls: DataUrls,
        is_data_url: bool,
        origin: Origin,
    ) -> Self {
        Self {
            routes,
            pathnames,
            data_urls,
            is_data_url,
            origin,
        }
    }

    /// Evaluate `phases` in order starting from `state`.
    pub fn run_phases(&self, state: RoutingState, phases: &[Phase]) -> Step {
        self.run_phases_at(state, phases, 0)
    }

    fn run_phases_at(&self, mut state: RoutingState, phases: &[Phase], depth: usize) -> Step {
        for &phase in phases {
            match self.run_phase(phase, state, depth) {
                Step::Continue(next) => state = next,
                done => return done,
            }
        }
        Step::Continue(state)
    }

    fn run_phase(&self, phase: Phase, mut state: RoutingState, depth: usize) -> Step {
        match phase {
            Phase::BeforeMiddleware | Phase::BeforeFiles => self.chain(phase, state, false, depth),
            Phase::AfterFiles | Phase::Fallback => self.chain(phase, state, true, depth),
            Phase::DynamicRoutes => match self.check_dynamic(&state) {
                Some((url, pathname, captures)) => {
                    state.url = url;
                    Step::Done(
                        state,
                        Outcome::Matched {
                            pathname,
                            route_matches: Some(captures),
                        },
                    )
                }
                None => Step::Continue(state),
            },
            Phase::OnMatch => {
                self.apply_on_match(&mut state);
                Step::Continue(state)
            }
        }
    }

    /// Evaluate one phase with rule chaining. With `probe`, every internal
    /// rewrite is followed by a static then dynamic pathname check.
    fn chain(&self, phase: Phase, mut state: RoutingState, probe: bool, depth: usize) -> Step {
        for (index, rule) in self.routes.phase(phase).iter().enumerate() {
            let Some(matched) = match_rule(rule, &state.url, &state.request_headers) else {
                continue;
            };

            tracing::trace!(
                phase = %phase,
                index,
                pattern = rule.pattern(),
                path = state.url.path(),
                "Rule matched"
            );

            state.resolved_headers =
                merge_headers(state.resolved_headers, &render_headers(rule, &matched.captures));
            if let Some(status) = rule.status() {
                state.status = Some(status);
            }

            match rule.action() {
                RuleAction::Decorate => continue,
                RuleAction::Redirect { status, location } => {
                    let target = substitute(location, &matched.captures);
                    let url = apply_destination(&state.url, &target);
                    return Step::Done(state, Outcome::Redirect { url, status: *status });
                }
                RuleAction::Rewrite { destination } => {
                    let target = substitute(destination, &matched.captures);
                    match resolve_destination(&state.url, &target, &self.origin) {
                        Destination::External(url) => {
                            return Step::Done(state, Outcome::ExternalRewrite { url });
                        }
                        Destination::Internal(url) => state.url = url,
                    }
                }
            }

            if !rule.rerun_phases().is_empty() {
                if depth >= MAX_RERUN_DEPTH {
                    tracing::warn!(
                        phase = %phase,
                        index,
                        depth,
                        "rerunRoutingPhases nesting limit reached, not re-entering"
                    );
                } else {
                    state = match self.run_phases_at(state, rule.rerun_phases(), depth + 1) {
                        Step::Continue(next) => next,
                        done => return done,
                    };
                }
            }

            if probe {
                if let Some(outcome) = self.probe(&mut state) {
                    return Step::Done(state, outcome);
                }
            }
        }
        Step::Continue(state)
    }

    /// Exact lookup in the known pathname set. For data requests the data
    /// form is tried before the page form.
    pub fn check_static(&self, url: &Url) -> Option<String> {
        let path = url.path();
        if self.is_data_url {
            let data = self.data_urls.denormalize(path);
            if self.pathnames.contains(&data) {
                return Some(data);
            }
        }
        self.pathnames.contains(path).then(|| path.to_string())
    }

    /// Parameters of the first dynamic route matching the current pathname.
    /// Never gates a static match.
    pub fn route_params(&self, state: &RoutingState) -> Option<Captures> {
        self.routes
            .phase(Phase::DynamicRoutes)
            .iter()
            .find_map(|rule| {
                let captures = pattern_captures(rule, state.url.path())?;
                conditions_hold(rule, &state.url, &state.request_headers).then_some(captures)
            })
    }

    /// First dynamic route whose (rewritten) pathname is known.
    fn check_dynamic(&self, state: &RoutingState) -> Option<(Url, String, Captures)> {
        for rule in self.routes.phase(Phase::DynamicRoutes) {
            let Some(captures) = pattern_captures(rule, state.url.path()) else {
                continue;
            };
            if !conditions_hold(rule, &state.url, &state.request_headers) {
                continue;
            }

            let candidate = match rule.destination() {
                Some(destination) => {
                    let target = substitute(destination, &captures);
                    match resolve_destination(&state.url, &target, &self.origin) {
                        Destination::Internal(url) => url,
                        Destination::External(url) => {
                            tracing::debug!(pattern = rule.pattern(), %url, "Ignoring cross-origin dynamic route");
                            continue;
                        }
                    }
                }
                None => state.url.clone(),
            };

            if let Some(pathname) = self.check_static(&candidate) {
                return Some((candidate, pathname, captures));
            }
        }
        None
    }

    fn probe(&self, state: &mut RoutingState) -> Option<Outcome> {
        if let Some(pathname) = self.check_static(&state.url) {
            return Some(Outcome::Matched {
                pathname,
                route_matches: self.route_params(state),
            });
        }

        let (url, pathname, captures) = self.check_dynamic(state)?;
        state.url = url;
        Some(Outcome::Matched {
            pathname,
            route_matches: Some(captures),
        })
    }

    fn apply_on_match(&self, state: &mut RoutingState) {
        for rule in self.routes.phase(Phase::OnMatch) {
            let Some(matched) = match_rule(rule, &state.url, &state.request_headers) else {
                continue;
            };
            let headers = render_headers(rule, &matched.captures);
            state.resolved_headers = merge_headers(std::mem::take(&mut state.resolved_headers), &headers);
            if let Some(status) = rule.status() {
                state.status = Some(status);
            }
        }
    }

    fn finish(&self, mut state: RoutingState, outcome: Outcome, locale: Option<String>) -> ResolutionResult {
        if matches!(outcome, Outcome::Matched { .. }) {
            self.apply_on_match(&mut state);
        }

        tracing::debug!(
            outcome = outcome.label(),
            path = state.url.path(),
            status = ?state.status,
            "Resolution finished"
        );

        ResolutionResult {
            outcome,
            resolved_headers: state.resolved_headers,
            status: state.status,
            url: state.url,
            request_headers: state.request_headers,
            locale,
        }
    }
}

/// Rule headers with captures substituted into their values.
fn render_headers(rule: &CompiledRule, captures: &Captures) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, template) in &rule.headers {
        match HeaderValue::from_str(&substitute(template, captures)) {
            Ok(value) => {
                out.append(name.clone(), value);
            }
            Err(_) => tracing::warn!(header = %name, "Skipping rule header with invalid value"),
        }
    }
    out
}

/// Resolve a request against the routing phases.
pub async fn resolve_routes(params: ResolveParams<'_>) -> Result<ResolutionResult, ResolveError> {
    let span = tracing::debug_span!(
        "resolve_routes",
        request_id = %params.context.request_id,
        path = %params.url.path(),
    );
    resolve_inner(params).instrument(span).await
}

async fn resolve_inner(params: ResolveParams<'_>) -> Result<ResolutionResult, ResolveError> {
    let ResolveParams {
        url,
        build_id,
        base_path,
        headers,
        pathnames,
        i18n,
        routes,
        invoke_middleware,
        request_body,
        context,
    } = params;

    let origin = url.origin();
    let data_urls = DataUrls::new(base_path, build_id);
    let is_data_url = routes.should_normalize_next_data() && data_urls.is_data_url(url.path());

    let mut state = RoutingState::new(url, headers);
    if is_data_url {
        let page = data_urls.normalize(state.url.path());
        state.url.set_path(&page);
    }

    let runner = PhaseRunner::new(routes, pathnames, data_urls, is_data_url, origin.clone());

    let mut locale = None;
    if let Some(i18n) = i18n.filter(|_| !is_data_url) {
        if let Some(resolution) = resolve_locale(i18n, base_path, &state.url, &state.request_headers) {
            tracing::trace!(locale = %resolution.locale, source = ?resolution.source, "Locale resolved");
            locale = Some(resolution.locale);
            if let Some(redirect) = resolution.redirect {
                let outcome = Outcome::Redirect {
                    url: redirect,
                    status: LOCALE_REDIRECT_STATUS,
                };
                return Ok(runner.finish(state, outcome, locale));
            }
            state.url.set_path(&resolution.pathname);
        }
    }

    let mut state = match runner.run_phases(state, &[Phase::BeforeMiddleware]) {
        Step::Continue(state) => state,
        Step::Done(state, outcome) => return Ok(runner.finish(state, outcome, locale)),
    };

    let middleware = run_middleware(
        invoke_middleware,
        &context.method,
        &state.url,
        &state.request_headers,
        request_body,
        &origin,
    )
    .await?;

    match middleware {
        MiddlewareOutcome::Continue {
            request_headers,
            response_headers,
        } => {
            state.request_headers = request_headers;
            state.resolved_headers = merge_headers(state.resolved_headers, &response_headers);
        }
        MiddlewareOutcome::Rewrite {
            url,
            request_headers,
            response_headers,
        } => {
            tracing::trace!(from = state.url.path(), to = url.path(), "Middleware rewrite");
            state.url = url;
            state.request_headers = request_headers;
            state.resolved_headers = merge_headers(state.resolved_headers, &response_headers);
        }
        MiddlewareOutcome::ExternalRewrite {
            url,
            request_headers,
            response_headers,
        } => {
            state.request_headers = request_headers;
            state.resolved_headers = merge_headers(state.resolved_headers, &response_headers);
            return Ok(runner.finish(state, Outcome::ExternalRewrite { url }, locale));
        }
        MiddlewareOutcome::Redirect {
            url,
            status,
            response_headers,
        } => {
            state.resolved_headers = merge_headers(state.resolved_headers, &response_headers);
            state.status = Some(status);
            return Ok(runner.finish(state, Outcome::Redirect { url, status }, locale));
        }
        MiddlewareOutcome::Responded {
            status,
            response_headers,
            body,
        } => {
            state.resolved_headers = merge_headers(state.resolved_headers, &response_headers);
            state.status = Some(status);
            return Ok(runner.finish(state, Outcome::MiddlewareResponded { status, body }, locale));
        }
    }

    let state = match runner.run_phases(state, &[Phase::BeforeFiles]) {
        Step::Continue(state) => state,
        Step::Done(state, outcome) => return Ok(runner.finish(state, outcome, locale)),
    };

    if let Some(pathname) = runner.check_static(&state.url) {
        let route_matches = runner.route_params(&state);
        let outcome = Outcome::Matched {
            pathname,
            route_matches,
        };
        return Ok(runner.finish(state, outcome, locale));
    }

    let result = match runner.run_phases(state, &[Phase::AfterFiles, Phase::DynamicRoutes, Phase::Fallback]) {
        Step::Continue(state) => runner.finish(state, Outcome::NoMatch, locale),
        Step::Done(state, outcome) => runner.finish(state, outcome, locale),
    };
    Ok(result)
}
