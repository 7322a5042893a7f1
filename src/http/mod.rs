//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, timeout)
//!     → request.rs (request ID, absolute URL)
//!     → [routing engine resolves against the live deployment]
//!     → origin.rs (origin / external / middleware forwarding)
//!     → response.rs (redirects, resolved headers, status override)
//!     → Send to client
//! ```

pub mod origin;
pub mod request;
pub mod response;
pub mod server;

pub use origin::{OriginClient, RemoteMiddleware, UpstreamError};
pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
