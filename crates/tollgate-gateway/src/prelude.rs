//! Prelude module - commonly used types for convenient import.
//!
//! Use `use tollgate_gateway::prelude::*;` to import all essential types.

pub use crate::{
    AuthGate, Disposition, GatewayError, GatewayResult, GatewayServer, GatingPipeline,
    HttpBackend, Outcome, Reply, TokenFileCredentialProvider,
};
