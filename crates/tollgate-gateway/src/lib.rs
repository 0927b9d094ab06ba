//! Tollgate Gateway - the request path from socket to backend.
//!
//! This crate wires the gating stages into a running service:
//! - [`AuthGate`] resolves the caller's API key
//! - [`GatingPipeline`] runs authentication, policy, confirmation and
//!   credential attachment in order, short-circuiting on the first failure
//! - [`HttpBackend`] forwards approved operations with `reqwest`
//! - [`TokenFileCredentialProvider`] keeps the backend OAuth token fresh
//! - [`GatewayServer`] serves the caller surface and, with the web channel,
//!   the operator approval surface on a separate listener
//!
//! # Architecture
//!
//! ```text
//! caller ──> http::router ──> GatingPipeline ──> HttpBackend ──> API
//!                                 │
//!                                 ├── AuthGate ── KeyStore
//!                                 ├── PolicyMatcher
//!                                 ├── ConfirmationManager ── DecisionChannel
//!                                 └── CredentialProvider
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use tokio_util::sync::CancellationToken;
//! use tollgate_config::Config;
//! use tollgate_gateway::{GatewayServer, shutdown_signal};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None, &Default::default())?;
//!     let shutdown = CancellationToken::new();
//!     tokio::spawn(shutdown_signal(shutdown.clone()));
//!
//!     GatewayServer::from_config(&config, shutdown)?.run().await?;
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod approval;
pub mod auth;
pub mod backend;
pub mod credentials;
pub mod error;
pub mod http;
pub mod pipeline;
pub mod server;

pub use auth::AuthGate;
pub use backend::HttpBackend;
pub use credentials::{DEFAULT_TOKEN_URI, TokenFileCredentialProvider};
pub use error::{GatewayError, GatewayResult};
pub use pipeline::{Disposition, GatingPipeline, Outcome, Reply};
pub use server::{BoundGateway, GatewayServer, shutdown_signal};
