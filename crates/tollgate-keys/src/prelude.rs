//! Prelude module - commonly used types for convenient import.
//!
//! Use `use tollgate_keys::prelude::*;` to import all essential types.

pub use crate::{FileKeyStore, KeyStoreError, KeyStoreResult};
