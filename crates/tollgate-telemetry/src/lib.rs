//! Tollgate Telemetry - logging setup and request correlation.
//!
//! # Example
//!
//! ```rust,no_run
//! use tollgate_telemetry::{LogConfig, LogFormat, RequestContext, setup_logging};
//!
//! # fn main() -> Result<(), tollgate_telemetry::TelemetryError> {
//! let _guard = setup_logging(
//!     &LogConfig::new("debug")
//!         .with_format(LogFormat::Compact)
//!         .with_directive("hyper=info"),
//! )?;
//!
//! let ctx = RequestContext::new("GET", "/gmail/v1/users/me/labels");
//! let span = ctx.span();
//! let _entered = span.enter();
//! tracing::info!("handling request");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod context;
mod error;
mod logging;

pub use context::RequestContext;
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogGuard, LogTarget, build_subscriber, setup_logging};
