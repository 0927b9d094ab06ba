//! Prelude module - commonly used types for convenient import.
//!
//! Use `use tollgate_approval::prelude::*;` to import all essential types.

// Manager
pub use crate::{ConfirmationManager, ConfirmationMode, ConfirmationOutcome, PendingConfirmation};

// Channels
pub use crate::{ConsoleChannel, Decision, DecisionChannel, WebApprovalQueue};

// Prompts
pub use crate::ConfirmationPrompt;

// Errors
pub use crate::{ChannelError, ConfirmationError, ConfirmationResult};
