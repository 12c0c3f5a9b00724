//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated)
//!     → Client::new
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → Client applies the endpoint list via set_endpoints
//!     → config snapshot swapped atomically
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Only the endpoint list is hot-reloadable; other fields need a new client

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{ClientConfig, ObservabilityConfig, RetryConfig};
pub use validation::{validate_config, ValidationError};
pub use watcher::{ConfigWatcher, WatchHandle};
