#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Configuration for the Tollgate gateway.
//!
//! # Usage
//!
//! ```rust,no_run
//! use tollgate_config::{Config, ConfigOverrides};
//!
//! let config = Config::load(None, &ConfigOverrides::default()).unwrap();
//! println!("listening on {}:{}", config.server.host, config.server.port);
//! ```
//!
//! # Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **Command line** flags and `TOLLGATE_*` environment variables
//! 2. **Config file** given with `--config`
//! 3. **Embedded defaults** (`defaults.toml` compiled into the binary)
//!
//! This crate has no dependencies on other tollgate crates. Values such as
//! the confirmation mode are kept as validated strings and converted to
//! domain types at startup.

pub mod prelude;

/// Configuration error types.
pub mod error;
/// Config file loading and merging.
pub mod loader;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use types::*;

impl Config {
    /// Load defaults, merge `path` if given, apply `overrides`, validate.
    ///
    /// # Errors
    ///
    /// See [`loader::load`].
    pub fn load(
        path: Option<&std::path::Path>,
        overrides: &ConfigOverrides,
    ) -> ConfigResult<Self> {
        loader::load(path, overrides)
    }
}
