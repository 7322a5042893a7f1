//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RouterConfig (validated, immutable)
//!     → handed to the HTTP server at startup
//! ```
//!
//! The deployment manifest (rules, pathnames, outputs) is separate and
//! hot-reloadable; see `crate::deployment`.
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use validation::{validate_config, ValidationError};
pub use schema::RouterConfig;
pub use schema::ListenerConfig;
pub use schema::DeploymentConfig;
pub use schema::OriginConfig;
pub use schema::MiddlewareConfig;
pub use schema::TimeoutConfig;
pub use schema::ObservabilityConfig;
