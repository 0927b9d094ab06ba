//! Prelude module - commonly used types for convenient import.
//!
//! Use `use tollgate_core::prelude::*;` to import all essential types.

// Request shape
pub use crate::{Method, OperationDescriptor, RawRequest};

// Identity
pub use crate::{ApiKey, CallerIdentity, KeyRecord};

// Errors
pub use crate::{
    AuthError, BackendError, ConfirmationRefusal, ErrorKind, GateError, GateResult, ProxyError,
    Rejection,
};

// Collaborators
pub use crate::{Backend, BackendResponse, Credential, CredentialProvider, ForwardRequest, KeyStore};
