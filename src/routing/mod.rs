//! Routing resolution engine.
//!
//! # Data Flow
//! ```text
//! Rule Compilation (at load):
//!     RuleSet (JSON)
//!     → rules.rs (compile regexes, classify actions)
//!     → RouteTable (immutable, shared via Arc)
//!
//! Per Request:
//!     URL + headers + body
//!     → data_url.rs (data URL normalization)
//!     → i18n.rs (locale detection / redirect)
//!     → resolver.rs (phase state machine)
//!         → matcher.rs (pattern + has/missing)
//!         → destination.rs (substitution, internal vs external)
//!         → middleware.rs (header protocol)
//!     → ResolutionResult
//! ```
//!
//! # Design Decisions
//! - Rules compiled at load time, immutable at runtime
//! - Deterministic: same input always resolves the same way
//! - First match wins inside a phase, but internal rewrites chain to later rules

pub mod data_url;
pub mod destination;
pub mod error;
pub mod headers;
pub mod i18n;
pub mod matcher;
pub mod middleware;
pub mod resolver;
pub mod rules;

pub use error::{MiddlewareError, ResolveError, RuleError};
pub use i18n::{DomainLocale, I18nConfig};
pub use middleware::{MiddlewareInvoker, MiddlewareRequest, MiddlewareResponse, NoMiddleware};
pub use resolver::{resolve_routes, Outcome, RequestContext, ResolutionResult, ResolveParams};
pub use rules::{Condition, Phase, RouteRule, RouteTable, RuleSet};
