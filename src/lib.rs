//! Request routing front-end for Next.js-style deployments.
//!
//! The [`routing`] engine decides, for each request, whether it is redirected,
//! rewritten (internally or to another origin), answered by middleware,
//! matched to a known pathname, or unmatched. The remaining modules host that
//! engine behind an HTTP server.

// Core
pub mod config;
pub mod deployment;
pub mod routing;

// Serving
pub mod http;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::RouterConfig;
pub use deployment::Deployment;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
