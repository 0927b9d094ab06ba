//! Subcommand implementations.

pub(crate) mod keys;
pub(crate) mod serve;
