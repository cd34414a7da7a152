//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc with every connection
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; connections only ever read it
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::GatewayConfig;
pub use schema::{Http1Config, Http2Config, ListenerConfig, NegotiationConfig, TlsConfig};
pub use schema::{ObservabilityConfig, TimeoutConfig};
