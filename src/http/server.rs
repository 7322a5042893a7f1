//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all handler
//! - Wire up layers (request ID, tracing, timeout)
//! - Resolve every request against the active deployment
//! - Act on the resolution: redirect, proxy, serve static, ISR, origin, 404
//! - Swap in reloaded deployments without blocking in-flight requests

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{request::Parts, HeaderMap, HeaderValue, Method, Request, Response, StatusCode},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::{ServiceBuilder, ServiceExt};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeFile,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use url::Url;

use crate::config::RouterConfig;
use crate::deployment::{Deployment, EndpointKind, IsrCache, IsrRequest, NoIsrCache};
use crate::http::origin::{OriginClient, RemoteMiddleware, UpstreamError};
use crate::http::request::{request_id, request_url, UuidRequestId};
use crate::http::response::{apply_resolved_headers, apply_status, error_response, redirect_response};
use crate::observability::metrics;
use crate::routing::matcher::Captures;
use crate::routing::{MiddlewareInvoker, NoMiddleware, Outcome, RequestContext, ResolutionResult};

/// Pathname the request was matched to, for the origin.
pub const X_MATCHED_PATH: &str = "x-matched-path";
/// Dynamic route parameters, form-urlencoded, for the origin.
pub const X_ROUTE_MATCHES: &str = "x-route-matches";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub deployment: Arc<ArcSwap<Deployment>>,
    pub origin: OriginClient,
    pub middleware: Arc<dyn MiddlewareInvoker>,
    pub isr: Arc<dyn IsrCache>,
    pub static_dir: PathBuf,
    pub max_body_bytes: usize,
}

/// HTTP front-end for a deployment.
pub struct HttpServer {
    router: Router,
    config: RouterConfig,
    deployment: Arc<ArcSwap<Deployment>>,
}

impl HttpServer {
    /// Server with collaborators taken from `config`: remote middleware when an
    /// address is set, no ISR cache.
    pub fn new(config: RouterConfig, deployment: Deployment) -> Self {
        let middleware: Arc<dyn MiddlewareInvoker> = match &config.middleware.address {
            Some(address) => Arc::new(RemoteMiddleware::new(
                address.clone(),
                config.timeouts.middleware_secs,
                config.listener.max_body_bytes,
            )),
            None => Arc::new(NoMiddleware),
        };
        Self::with_collaborators(config, deployment, middleware, Arc::new(NoIsrCache))
    }

    pub fn with_collaborators(
        config: RouterConfig,
        deployment: Deployment,
        middleware: Arc<dyn MiddlewareInvoker>,
        isr: Arc<dyn IsrCache>,
    ) -> Self {
        let deployment = Arc::new(ArcSwap::from_pointee(deployment));
        let state = AppState {
            deployment: deployment.clone(),
            origin: OriginClient::new(config.origin.address.clone()),
            middleware,
            isr,
            static_dir: PathBuf::from(&config.deployment.static_dir),
            max_body_bytes: config.listener.max_body_bytes,
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            deployment,
        }
    }

    #[allow(deprecated)]
    fn build_router(config: &RouterConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(route_handler))
            .route("/", any(route_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Serve until `shutdown` fires, activating every deployment received on `updates`.
    pub async fn run(
        self,
        listener: TcpListener,
        mut updates: mpsc::UnboundedReceiver<Deployment>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let live = self.deployment.clone();
        let reloads = tokio::spawn(async move {
            while let Some(next) = updates.recv().await {
                tracing::info!(build_id = %next.build_id, "Activating deployment");
                live.store(Arc::new(next));
                metrics::record_reload();
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        reloads.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all handler: resolve, then dispatch on the outcome.
async fn route_handler(State(state): State<AppState>, request: Request<Body>) -> Response<Body> {
    let start = Instant::now();
    let method = request.method().clone();

    let response = handle(&state, request).await;

    metrics::record_request(method.as_str(), response.status().as_u16(), start);
    response
}

async fn handle(state: &AppState, request: Request<Body>) -> Response<Body> {
    let (parts, body) = request.into_parts();
    let request_id = request_id(&parts.headers);

    let url = match request_url(&parts.uri, &parts.headers) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Unparseable request URL");
            return error_response(StatusCode::BAD_REQUEST, "Invalid request URL");
        }
    };

    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(_) => return error_response(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large"),
    };

    let deployment = state.deployment.load_full();
    let context = RequestContext::new(request_id.clone()).with_method(parts.method.clone());

    let resolve_start = Instant::now();
    let result = match deployment
        .resolve(
            url.clone(),
            parts.headers.clone(),
            body.clone(),
            state.middleware.as_ref(),
            &context,
        )
        .await
    {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Resolution failed");
            return error_response(StatusCode::BAD_GATEWAY, "Middleware invocation failed");
        }
    };
    metrics::record_resolution(result.outcome.label(), resolve_start);

    tracing::debug!(
        request_id = %request_id,
        method = %parts.method,
        path = url.path(),
        outcome = result.outcome.label(),
        "Request resolved"
    );

    dispatch(state, &deployment, &parts, &url, body, result).await
}

async fn dispatch(
    state: &AppState,
    deployment: &Deployment,
    parts: &Parts,
    request_url: &Url,
    body: Bytes,
    result: ResolutionResult,
) -> Response<Body> {
    let ResolutionResult {
        outcome,
        resolved_headers,
        status,
        url,
        request_headers,
        ..
    } = result;

    let mut response = match outcome {
        Outcome::Redirect { url: location, status } => {
            return redirect_response(&location, status, request_url, &resolved_headers);
        }
        Outcome::ExternalRewrite { url: target } => {
            let upstream = state
                .origin
                .proxy_external(parts.method.clone(), &target, &request_headers, body)
                .await;
            upstream_or_502(upstream, &target)
        }
        Outcome::MiddlewareResponded { status, body } => {
            let mut response = Response::new(Body::from(body));
            *response.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
            response
        }
        Outcome::Matched { pathname, route_matches } => {
            serve_matched(state, deployment, parts, &url, &pathname, route_matches, request_headers, body).await
        }
        Outcome::NoMatch => error_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    apply_resolved_headers(&mut response, &resolved_headers);
    apply_status(&mut response, status);
    response
}

#[allow(clippy::too_many_arguments)]
async fn serve_matched(
    state: &AppState,
    deployment: &Deployment,
    parts: &Parts,
    url: &Url,
    pathname: &str,
    route_matches: Option<Captures>,
    mut request_headers: HeaderMap,
    body: Bytes,
) -> Response<Body> {
    if let Some(asset) = deployment.outputs.static_asset(pathname) {
        return serve_static(state, parts, asset).await;
    }

    let path_and_query = match url.query() {
        Some(query) => format!("{pathname}?{query}"),
        None => pathname.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(pathname) {
        request_headers.insert(X_MATCHED_PATH, value);
    }
    if let Some(captures) = route_matches.filter(|c| !c.is_empty()) {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(captures.iter())
            .finish();
        if let Ok(value) = HeaderValue::from_str(&encoded) {
            request_headers.insert(X_ROUTE_MATCHES, value);
        }
    }

    let is_isr = deployment
        .outputs
        .endpoint(pathname)
        .is_some_and(|endpoint| endpoint.kind == EndpointKind::Isr);
    if is_isr {
        let isr_request = IsrRequest {
            pathname: pathname.to_string(),
            url: url.clone(),
            headers: request_headers.clone(),
        };
        if let Some(hit) = state.isr.lookup(&isr_request, &deployment.outputs).await {
            match hit.postponed_state {
                Some(postponed) => {
                    tracing::debug!(pathname, "Resuming postponed render at origin");
                    let upstream = state.origin.resume(&path_and_query, &request_headers, postponed).await;
                    return upstream_or_502(upstream, url);
                }
                None => return hit.response,
            }
        }
    }

    let upstream = state
        .origin
        .forward(parts.method.clone(), &path_and_query, &request_headers, body)
        .await;
    upstream_or_502(upstream, url)
}

async fn serve_static(state: &AppState, parts: &Parts, asset: &str) -> Response<Body> {
    let path = state.static_dir.join(asset.trim_start_matches('/'));

    let mut request = Request::new(Body::empty());
    *request.method_mut() = match parts.method {
        Method::HEAD => Method::HEAD,
        _ => Method::GET,
    };
    *request.headers_mut() = parts.headers.clone();

    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(e) => match e {},
    }
}

fn upstream_or_502(upstream: Result<Response<Body>, UpstreamError>, target: &Url) -> Response<Body> {
    match upstream {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(target = %target, error = %e, "Upstream request failed");
            error_response(StatusCode::BAD_GATEWAY, "Upstream request failed")
        }
    }
}
