//! Tollgate Test - shared test doubles for the gateway crates.
//!
//! Add as a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! tollgate-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use tollgate_test::{InMemoryKeyStore, RecordingBackend, ScriptedChannel, Script};
//!
//! let keys = InMemoryKeyStore::new();
//! let key = keys.insert("agent", true);
//! let channel = ScriptedChannel::new().with_script(Script::Reject);
//! let backend = RecordingBackend::new();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod logs;
pub mod mocks;

pub use fixtures::*;
pub use logs::*;
pub use mocks::*;
