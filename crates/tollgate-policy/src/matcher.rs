//! Policy classification.
//!
//! The matcher holds one ordered table of allow rules. Classification is a
//! pure function of the [`OperationDescriptor`]:
//!
//! 1. A raw path that was not already canonical is denied.
//! 2. The first rule whose method and template match yields `Allowed`.
//! 3. Anything else is denied as "not in allowlist".
//!
//! There is no blocklist. New backend endpoints stay closed until a rule is
//! added for them.

use std::fmt;
use tollgate_core::{Method, OperationDescriptor};

use crate::error::{PolicyError, PolicyResult};
use crate::rule::{ConfirmationClass, Rule};

/// Reason reported for requests that match no rule.
pub const NOT_IN_ALLOWLIST: &str = "not in allowlist";

/// Reason reported for encoded, dotted or slash-padded paths.
pub const NON_CANONICAL_PATH: &str = "non-canonical path";

/// An operation the policy permits.
///
/// Only [`PolicyMatcher::classify`] can produce one, so only permitted
/// operations can ever be handed to the confirmation stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedOperation {
    method: Method,
    template: String,
    class: ConfirmationClass,
}

impl AllowedOperation {
    /// Method of the matching rule.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Template of the matching rule.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Confirmation class of the matching rule.
    #[must_use]
    pub fn class(&self) -> ConfirmationClass {
        self.class
    }
}

/// Outcome of classifying an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyVerdict {
    /// The operation matches an allow rule.
    Allowed(AllowedOperation),
    /// The operation is not permitted.
    Denied {
        /// Why it was denied.
        reason: String,
    },
}

impl PolicyVerdict {
    /// Whether the verdict permits the operation.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }

    /// Confirmation class, if allowed.
    #[must_use]
    pub fn class(&self) -> Option<ConfirmationClass> {
        match self {
            Self::Allowed(op) => Some(op.class),
            Self::Denied { .. } => None,
        }
    }

    fn denied(reason: &str) -> Self {
        Self::Denied {
            reason: reason.to_owned(),
        }
    }
}

impl fmt::Display for PolicyVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allowed(op) => write!(f, "allowed ({})", op.class),
            Self::Denied { reason } => write!(f, "denied ({reason})"),
        }
    }
}

/// Ordered allowlist with default-deny fallthrough.
#[derive(Debug, Clone)]
pub struct PolicyMatcher {
    rules: Vec<Rule>,
}

impl PolicyMatcher {
    /// Build a matcher, rejecting rule sets where two rules could match the
    /// same request.
    ///
    /// # Errors
    ///
    /// [`PolicyError::Empty`] for an empty table and
    /// [`PolicyError::AmbiguousRules`] for the first overlapping pair.
    pub fn new(rules: Vec<Rule>) -> PolicyResult<Self> {
        if rules.is_empty() {
            return Err(PolicyError::Empty);
        }
        for (i, first) in rules.iter().enumerate() {
            for second in rules.iter().skip(i.saturating_add(1)) {
                if first.overlaps(second) {
                    return Err(PolicyError::AmbiguousRules {
                        first: first.to_string(),
                        second: second.to_string(),
                    });
                }
            }
        }
        Ok(Self { rules })
    }

    /// The rule table in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Classify an operation. Pure and deterministic.
    #[must_use]
    pub fn classify(&self, op: &OperationDescriptor) -> PolicyVerdict {
        if !op.is_canonical() {
            return PolicyVerdict::denied(NON_CANONICAL_PATH);
        }

        self.rules
            .iter()
            .find(|rule| rule.method() == op.method() && rule.template().matches(op.segments()))
            .map_or_else(
                || PolicyVerdict::denied(NOT_IN_ALLOWLIST),
                |rule| {
                    PolicyVerdict::Allowed(AllowedOperation {
                        method: rule.method().clone(),
                        template: rule.template().to_string(),
                        class: rule.class(),
                    })
                },
            )
    }
}
