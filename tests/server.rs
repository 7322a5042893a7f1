//! HTTP server tests against a mock origin.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::body::Bytes;
use axum::http::{HeaderMap, Method, Response, StatusCode};
use serde_json::json;
use tokio::sync::mpsc;

use route_resolver::config::RouterConfig;
use route_resolver::deployment::{Deployment, DeploymentOutputs, IsrCache, IsrHit, IsrRequest, NoIsrCache};
use route_resolver::http::{HttpServer, RemoteMiddleware};
use route_resolver::lifecycle::Shutdown;
use route_resolver::routing::middleware::MIDDLEWARE_NEXT;
use route_resolver::routing::{MiddlewareError, MiddlewareInvoker, MiddlewareRequest, NoMiddleware};

mod common;
use common::{deployment, middleware_response, start_echo_origin, start_mock_backend, ScriptedMiddleware};

struct TestServer {
    addr: SocketAddr,
    shutdown: Shutdown,
    updates: mpsc::UnboundedSender<Deployment>,
    client: reqwest::Client,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.expect("router unreachable")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

async fn spawn_server(
    config: RouterConfig,
    deployment: Deployment,
    middleware: Arc<dyn MiddlewareInvoker>,
    isr: Arc<dyn IsrCache>,
) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (updates, update_rx) = mpsc::unbounded_channel();
    let server = HttpServer::with_collaborators(config, deployment, middleware, isr);
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, update_rx, server_shutdown).await;
    });

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap();

    TestServer {
        addr,
        shutdown,
        updates,
        client,
    }
}

fn config_for(origin: SocketAddr) -> RouterConfig {
    let mut config = RouterConfig::default();
    config.origin.address = origin.to_string();
    config
}

fn site(external: SocketAddr) -> Deployment {
    deployment(json!({
        "buildId": "b1",
        "routes": {
            "beforeFiles": [
                {"sourceRegex": "^/old$", "status": 301, "headers": {"Location": "/new"}},
                {"sourceRegex": "^/proxy/(.*)$", "destination": format!("http://{external}/$1")}
            ],
            "dynamicRoutes": [
                {"sourceRegex": "^/blog/(?<slug>[^/]+)$", "destination": "/blog/[slug]?slug=$slug"}
            ],
            "onMatch": [{"sourceRegex": ".*", "headers": {"x-frame-options": "DENY"}}]
        },
        "outputs": {
            "staticAssets": ["/about.html"],
            "staticAssetsAliases": {"/about": "/about.html"},
            "endpoints": {"/api/hello": {"type": "function"}, "/blog/[slug]": {"type": "isr"}}
        }
    }))
}

async fn default_server() -> TestServer {
    let origin = start_echo_origin().await;
    let external = start_mock_backend("external").await;
    spawn_server(config_for(origin), site(external), Arc::new(NoMiddleware), Arc::new(NoIsrCache)).await
}

#[tokio::test]
async fn test_redirect_response() {
    let server = default_server().await;

    let res = server.get("/old").await;
    assert_eq!(res.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(res.headers()["location"], "/new");
}

#[tokio::test]
async fn test_function_endpoint_forwarded_to_origin() {
    let server = default_server().await;

    let res = server.get("/api/hello?x=1").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-frame-options"], "DENY");
    let body = res.text().await.unwrap();
    assert!(body.starts_with("GET /api/hello?x=1\n"), "unexpected origin request: {body}");
    assert!(body.contains("matched: /api/hello"));
}

#[tokio::test]
async fn test_dynamic_route_forwarded_with_params() {
    let server = default_server().await;

    let body = server.get("/blog/first").await.text().await.unwrap();
    assert!(body.starts_with("GET /blog/[slug]?slug=first\n"), "unexpected origin request: {body}");
    assert!(body.contains("matched: /blog/[slug]"));
    assert!(body.contains("matches: 1=first&slug=first"));
}

#[tokio::test]
async fn test_static_asset_served_from_disk() {
    let origin = start_echo_origin().await;
    let external = start_mock_backend("external").await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("about.html"), "<h1>About</h1>").unwrap();

    let mut config = config_for(origin);
    config.deployment.static_dir = dir.path().to_string_lossy().into_owned();
    let server = spawn_server(config, site(external), Arc::new(NoMiddleware), Arc::new(NoIsrCache)).await;

    let res = server.get("/about").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-frame-options"], "DENY");
    assert_eq!(res.text().await.unwrap(), "<h1>About</h1>");
}

#[tokio::test]
async fn test_external_rewrite_is_proxied() {
    let server = default_server().await;

    let res = server.get("/proxy/anything").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "external");
}

#[tokio::test]
async fn test_unmatched_is_404() {
    let server = default_server().await;

    let res = server.get("/missing").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_request_id_propagated() {
    let server = default_server().await;

    let res = server.get("/missing").await;
    let generated = res.headers()["x-request-id"].to_str().unwrap().to_string();
    assert_eq!(generated.len(), 36);

    let res = server
        .client
        .get(server.url("/missing"))
        .header("x-request-id", "client-chosen")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "client-chosen");
}

#[tokio::test]
async fn test_middleware_response_returned() {
    let origin = start_echo_origin().await;
    let external = start_mock_backend("external").await;
    let middleware = ScriptedMiddleware::new(|req: &MiddlewareRequest| {
        if req.url.path() == "/api/hello" {
            middleware_response(403, &[("content-type", "text/plain")], "denied")
        } else {
            middleware_response(200, &[(MIDDLEWARE_NEXT, "1")], "")
        }
    });
    let server = spawn_server(config_for(origin), site(external), Arc::new(middleware), Arc::new(NoIsrCache)).await;

    let res = server.get("/api/hello").await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(res.text().await.unwrap(), "denied");

    let res = server.get("/blog/first").await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unreachable_middleware_is_502() {
    let origin = start_echo_origin().await;
    let external = start_mock_backend("external").await;
    let server = spawn_server(
        config_for(origin),
        site(external),
        Arc::new(common::UnreachableMiddleware),
        Arc::new(NoIsrCache),
    )
    .await;

    let res = server.get("/api/hello").await;
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
}

struct FixedIsr {
    postponed: Option<&'static str>,
}

#[async_trait]
impl IsrCache for FixedIsr {
    async fn lookup(&self, request: &IsrRequest, _outputs: &DeploymentOutputs) -> Option<IsrHit> {
        assert_eq!(request.pathname, "/blog/[slug]");
        let response = Response::builder()
            .status(StatusCode::OK)
            .body(Body::from("cached shell"))
            .ok()?;
        Some(IsrHit {
            response,
            postponed_state: self.postponed.map(str::to_string),
        })
    }
}

#[tokio::test]
async fn test_isr_hit_served_from_cache() {
    let origin = start_echo_origin().await;
    let external = start_mock_backend("external").await;
    let isr = Arc::new(FixedIsr { postponed: None });
    let server = spawn_server(config_for(origin), site(external), Arc::new(NoMiddleware), isr).await;

    let res = server.get("/blog/first").await;
    assert_eq!(res.headers()["x-frame-options"], "DENY");
    assert_eq!(res.text().await.unwrap(), "cached shell");
}

#[tokio::test]
async fn test_isr_postponed_state_resumed_at_origin() {
    let origin = start_echo_origin().await;
    let external = start_mock_backend("external").await;
    let isr = Arc::new(FixedIsr {
        postponed: Some("shell-state"),
    });
    let server = spawn_server(config_for(origin), site(external), Arc::new(NoMiddleware), isr).await;

    let body = server.get("/blog/first").await.text().await.unwrap();
    assert!(body.starts_with("POST /blog/[slug]?slug=first\n"), "unexpected origin request: {body}");
    assert!(body.contains("resume: 1"));
    assert!(body.contains("body: shell-state"));
}

#[tokio::test]
async fn test_deployment_hot_swap() {
    let server = default_server().await;
    assert_eq!(server.get("/fresh").await.status(), StatusCode::NOT_FOUND);

    let next = deployment(json!({"buildId": "b2", "pathnames": ["/fresh"]}));
    server.updates.send(next).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let res = server.get("/fresh").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.text().await.unwrap().starts_with("GET /fresh\n"));
}

fn remote_request(method: Method) -> MiddlewareRequest {
    MiddlewareRequest {
        method,
        url: url::Url::parse("http://site.test/items/7?x=1").unwrap(),
        headers: HeaderMap::new(),
        body: Bytes::new(),
    }
}

#[tokio::test]
async fn test_remote_middleware_replays_method() {
    let service = start_echo_origin().await;
    let middleware = RemoteMiddleware::new(service.to_string(), 5, 1024);

    let response = middleware.invoke(remote_request(Method::DELETE)).await.unwrap();
    let body = String::from_utf8(response.body.to_vec()).unwrap();
    assert!(body.starts_with("DELETE /items/7?x=1\n"), "unexpected middleware request: {body}");
}

#[tokio::test]
async fn test_remote_middleware_response_size_bounded() {
    let service = start_echo_origin().await;
    let middleware = RemoteMiddleware::new(service.to_string(), 5, 8);

    let err = middleware.invoke(remote_request(Method::GET)).await.unwrap_err();
    assert!(matches!(err, MiddlewareError::InvalidResponse(_)), "unexpected error: {err}");
}
