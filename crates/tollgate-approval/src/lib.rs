//! Tollgate Approval - operator confirmation for allowed operations.
//!
//! The [`ConfirmationManager`] decides, per the process-wide
//! [`ConfirmationMode`], whether an allowed operation needs an operator
//! decision. Operations that do are serialized through a single slot: at
//! most one prompt is outstanding at any time and waiters are served in
//! arrival order. Decisions come from a pluggable [`DecisionChannel`]:
//!
//! - [`ConsoleChannel`]: prompt on a terminal, answer `y`/`N`
//! - [`WebApprovalQueue`]: prompt exposed to an operator web page
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tollgate_approval::{ConfirmationManager, ConfirmationMode, ConsoleChannel};
//!
//! # async fn demo() {
//! let manager = ConfirmationManager::new(
//!     ConfirmationMode::ModifyOnly,
//!     Arc::new(ConsoleChannel::stdio()),
//! )
//! .with_timeout(Duration::from_secs(120));
//! assert!(manager.pending().is_none());
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod channel;
pub mod console;
/// Error types for the confirmation subsystem.
pub mod error;
pub mod manager;
/// Confirmation modes.
pub mod mode;
pub mod prompt;
pub mod web;

pub use channel::{Decision, DecisionChannel, parse_decision};
pub use console::ConsoleChannel;
pub use error::{ChannelError, ConfirmationError, ConfirmationResult};
pub use manager::{ConfirmationManager, ConfirmationOutcome, DEFAULT_TIMEOUT, PendingConfirmation};
pub use mode::ConfirmationMode;
pub use prompt::{ConfirmationPrompt, PromptDetail};
pub use web::{QueueEvent, QueueEventKind, WebApprovalQueue};
