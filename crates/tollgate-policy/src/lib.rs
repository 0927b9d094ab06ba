//! Tollgate Policy - the allowlist that decides which operations may pass.
//!
//! Policy is a single ordered table of allow rules with an implicit
//! default-deny fallthrough. Rule templates match segment-for-segment and
//! the table is checked for overlapping rules when the matcher is built.
//!
//! # Example
//!
//! ```
//! use tollgate_core::{OperationDescriptor, RawRequest};
//! use tollgate_policy::{ConfirmationClass, PolicyMatcher, PolicyVerdict};
//!
//! let matcher = PolicyMatcher::builtin().unwrap();
//!
//! let read = RawRequest::new("GET", "/gmail/v1/users/me/messages");
//! let op = OperationDescriptor::from_raw(&read).unwrap();
//! assert_eq!(matcher.classify(&op).class(), Some(ConfirmationClass::Read));
//!
//! let send = RawRequest::new("POST", "/gmail/v1/users/me/messages/send");
//! let op = OperationDescriptor::from_raw(&send).unwrap();
//! assert!(matches!(matcher.classify(&op), PolicyVerdict::Denied { .. }));
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod allowlist;
/// Error types for policy construction.
pub mod error;
pub mod matcher;
pub mod rule;
pub mod template;

pub use allowlist::builtin_rules;
pub use error::{PolicyError, PolicyResult};
pub use matcher::{AllowedOperation, NON_CANONICAL_PATH, NOT_IN_ALLOWLIST, PolicyMatcher, PolicyVerdict};
pub use rule::{ConfirmationClass, Rule};
pub use template::{PathTemplate, Segment, ValueClass};
