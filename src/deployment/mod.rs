//! Deployment subsystem.
//!
//! # Responsibilities
//! - Load the build manifest (rules, known pathnames, outputs)
//! - Compile it into an immutable [`Deployment`]
//! - Watch the manifest for changes and publish fresh deployments
//!
//! # Data Flow
//! ```text
//! deployment.json
//!     → manifest.rs (parse, validate, compile rules)
//!     → Deployment (immutable, swapped atomically by the server)
//!     → watcher.rs (notify → mpsc → server)
//! ```

pub mod isr;
pub mod manifest;
pub mod outputs;
pub mod watcher;

use std::collections::HashSet;

use axum::body::Bytes;
use axum::http::HeaderMap;
use url::Url;

use crate::routing::{
    resolve_routes, I18nConfig, MiddlewareInvoker, RequestContext, ResolutionResult, ResolveError,
    ResolveParams, RouteTable,
};

pub use isr::{IsrCache, IsrHit, IsrRequest, NoIsrCache};
pub use manifest::{load_deployment, parse_manifest, DeploymentManifest, ManifestError};
pub use outputs::{DeploymentOutputs, Endpoint, EndpointKind};
pub use watcher::ManifestWatcher;

/// A compiled, ready-to-serve deployment.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub build_id: String,
    pub base_path: String,
    pub i18n: Option<I18nConfig>,
    pub routes: RouteTable,
    /// Explicit pathnames plus everything the outputs serve.
    pub pathnames: HashSet<String>,
    pub outputs: DeploymentOutputs,
}

impl Deployment {
    /// Resolve `url` against this deployment.
    pub async fn resolve(
        &self,
        url: Url,
        headers: HeaderMap,
        request_body: Bytes,
        middleware: &dyn MiddlewareInvoker,
        context: &RequestContext,
    ) -> Result<ResolutionResult, ResolveError> {
        resolve_routes(ResolveParams {
            url,
            build_id: &self.build_id,
            base_path: &self.base_path,
            headers,
            pathnames: &self.pathnames,
            i18n: self.i18n.as_ref(),
            routes: &self.routes,
            invoke_middleware: middleware,
            request_body,
            context,
        })
        .await
    }
}
