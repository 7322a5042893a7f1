//! Routing error types.

use thiserror::Error;

use crate::routing::rules::Phase;

/// Rule set compilation failures. Always configuration errors.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid sourceRegex `{pattern}` in {phase} rule #{index}: {source}")]
    InvalidRegex {
        phase: Phase,
        index: usize,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid header name `{name}` in {phase} rule #{index}")]
    InvalidHeaderName {
        phase: Phase,
        index: usize,
        name: String,
    },
}

/// Failures reported by a middleware invoker.
#[derive(Debug, Error)]
pub enum MiddlewareError {
    /// The middleware could not be reached or the exchange broke mid-way.
    #[error("middleware transport error: {0}")]
    Transport(String),

    /// The middleware did not answer in time.
    #[error("middleware timed out after {0} seconds")]
    Timeout(u64),

    /// The middleware answered with something that is not a usable response.
    #[error("invalid middleware response: {0}")]
    InvalidResponse(String),
}

/// Failures that abort a resolution run.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Middleware(#[from] MiddlewareError),
}
