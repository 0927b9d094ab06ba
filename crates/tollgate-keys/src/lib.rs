//! Tollgate Keys - the API key file.
//!
//! [`FileKeyStore`] implements [`tollgate_core::KeyStore`] over a JSON file
//! holding SHA-256 digests of issued keys, and provides the administrative
//! operations behind `tollgate keys ...`.
//!
//! # Example
//!
//! ```no_run
//! use tollgate_keys::FileKeyStore;
//!
//! let store = FileKeyStore::new("api_keys.json");
//! let (key, record) = store.create("mail-agent").unwrap();
//! println!("{} -> {}", record.name, key.expose());
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod admin;
/// Error types for the key store.
pub mod error;
pub mod store;

pub use admin::{MAX_NAME_LEN, masked, validate_name};
pub use error::{KeyStoreError, KeyStoreResult};
pub use store::FileKeyStore;
