//! ISR cache collaborator.
//!
//! Freshness, revalidation and storage live outside this crate. The router
//! only asks for a cached response and, for partially prerendered pages, the
//! postponed state the origin needs to resume rendering.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Response};
use url::Url;

use crate::deployment::outputs::DeploymentOutputs;

/// The request as seen by the cache.
#[derive(Debug, Clone)]
pub struct IsrRequest {
    /// Matched pathname (cache key).
    pub pathname: String,
    pub url: Url,
    pub headers: HeaderMap,
}

/// A cache hit.
#[derive(Debug)]
pub struct IsrHit {
    pub response: Response<Body>,
    /// Present when the cached response is a static shell whose dynamic parts
    /// must be resumed by the origin.
    pub postponed_state: Option<String>,
}

#[async_trait]
pub trait IsrCache: Send + Sync {
    async fn lookup(&self, request: &IsrRequest, outputs: &DeploymentOutputs) -> Option<IsrHit>;
}

/// Cache that never hits; every ISR endpoint goes to the origin.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIsrCache;

#[async_trait]
impl IsrCache for NoIsrCache {
    async fn lookup(&self, _request: &IsrRequest, _outputs: &DeploymentOutputs) -> Option<IsrHit> {
        None
    }
}
