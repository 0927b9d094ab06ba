//! The boundary between the confirmation manager and whoever answers.

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::prompt::ConfirmationPrompt;

/// An operator's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Forward the request.
    Approved,
    /// Refuse the request.
    Rejected,
}

/// Interpret a line of operator input.
///
/// Only `y` or `yes` (any case, surrounding whitespace ignored) approve.
/// Everything else, including an empty line and unrecognised text, rejects.
#[must_use]
pub fn parse_decision(input: &str) -> Decision {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Decision::Approved,
        _ => Decision::Rejected,
    }
}

/// Presents prompts to an operator and returns their decision.
///
/// The manager calls [`present`](DecisionChannel::present) with at most one
/// prompt outstanding at a time and may drop the returned future when the
/// timeout fires or the gateway shuts down.
#[async_trait]
pub trait DecisionChannel: Send + Sync {
    /// Show `prompt` and wait for the operator's decision.
    async fn present(&self, prompt: &ConfirmationPrompt) -> Result<Decision, ChannelError>;

    /// Tell the operator that `prompt` expired unanswered.
    async fn expired(&self, _prompt: &ConfirmationPrompt) {}
}
