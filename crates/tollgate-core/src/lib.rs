//! Tollgate Core - shared types for the capability-restricting gateway.
//!
//! Every inbound request is normalized into an [`OperationDescriptor`] once,
//! then flows through authentication, policy classification and optional
//! operator confirmation before it is either forwarded or rejected. This
//! crate holds the types those stages share:
//!
//! - [`OperationDescriptor`] and path canonicalization
//! - [`ApiKey`], [`KeyRecord`] and [`CallerIdentity`]
//! - the error taxonomy ([`GateError`]) and its mapping to [`Rejection`]
//! - collaborator interfaces: [`KeyStore`], [`CredentialProvider`], [`Backend`]
//!
//! # Example
//!
//! ```
//! use tollgate_core::{OperationDescriptor, RawRequest};
//!
//! let raw = RawRequest::new("POST", "/gmail/v1/users/me/messages/%73end");
//! let op = OperationDescriptor::from_raw(&raw).unwrap();
//!
//! // Escapes are decoded, and the deviation is remembered.
//! assert_eq!(op.path(), "/gmail/v1/users/me/messages/send");
//! assert!(!op.is_canonical());
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod descriptor;
pub mod error;
pub mod identity;
pub mod traits;

pub use descriptor::{Method, OperationDescriptor, RawRequest};
pub use error::{
    AuthError, BackendError, ConfirmationRefusal, CoreError, CoreResult, ErrorKind, GateError,
    GateResult, ProxyError, Rejection,
};
pub use identity::{ApiKey, CallerIdentity, KEY_PREFIX, KeyRecord};
pub use traits::{
    Backend, BackendResponse, Credential, CredentialProvider, ForwardRequest, KeyStore,
};
