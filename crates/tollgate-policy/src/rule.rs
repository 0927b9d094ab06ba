//! Allowlist rules.

use serde::{Deserialize, Serialize};
use std::fmt;
use tollgate_core::Method;

use crate::error::PolicyResult;
use crate::template::PathTemplate;

/// Whether an allowed operation only reads or also changes backend state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationClass {
    /// Reads data only.
    Read,
    /// Changes backend state.
    Modify,
}

impl fmt::Display for ConfirmationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "READ"),
            Self::Modify => write!(f, "MODIFY"),
        }
    }
}

/// One allowed `(method, template)` pair and its class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    method: Method,
    template: PathTemplate,
    class: ConfirmationClass,
}

impl Rule {
    /// Build a rule from a template string.
    ///
    /// # Errors
    ///
    /// Returns an error if the template does not parse.
    pub fn new(method: Method, template: &str, class: ConfirmationClass) -> PolicyResult<Self> {
        Ok(Self {
            method,
            template: PathTemplate::parse(template)?,
            class,
        })
    }

    /// Shorthand for a [`ConfirmationClass::Read`] rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the template does not parse.
    pub fn read(method: Method, template: &str) -> PolicyResult<Self> {
        Self::new(method, template, ConfirmationClass::Read)
    }

    /// Shorthand for a [`ConfirmationClass::Modify`] rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the template does not parse.
    pub fn modify(method: Method, template: &str) -> PolicyResult<Self> {
        Self::new(method, template, ConfirmationClass::Modify)
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path template.
    #[must_use]
    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    /// Confirmation class.
    #[must_use]
    pub fn class(&self) -> ConfirmationClass {
        self.class
    }

    /// Whether some request could match both rules.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.method == other.method && self.template.overlaps(&other.template)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.template)
    }
}
