//! Prelude module - commonly used types for convenient import.
//!
//! Use `use tollgate_test::prelude::*;` to import all essential types.

pub use crate::{
    CapturedLogs, FailingCredentialProvider, InMemoryKeyStore, RecordingBackend, Script,
    ScriptedChannel, StaticCredentialProvider,
};
