use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tollgate_policy::ConfirmationClass;

/// Which allowed operations need an operator decision.
///
/// Fixed for the life of the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfirmationMode {
    /// Confirm every allowed operation, reads included.
    #[serde(rename = "all")]
    All,
    /// Confirm only operations that change backend state.
    #[default]
    #[serde(rename = "modify", alias = "modify_only")]
    ModifyOnly,
    /// Never prompt.
    #[serde(rename = "none")]
    None,
}

impl ConfirmationMode {
    /// Whether an operation of `class` needs a decision in this mode.
    #[must_use]
    pub fn requires_confirmation(self, class: ConfirmationClass) -> bool {
        match self {
            Self::All => true,
            Self::ModifyOnly => class == ConfirmationClass::Modify,
            Self::None => false,
        }
    }
}

impl fmt::Display for ConfirmationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::ModifyOnly => write!(f, "modify"),
            Self::None => write!(f, "none"),
        }
    }
}

impl FromStr for ConfirmationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "modify" | "modify_only" | "modify-only" => Ok(Self::ModifyOnly),
            "none" => Ok(Self::None),
            other => Err(format!(
                "unknown confirmation mode '{other}' (expected all, modify or none)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_table() {
        use ConfirmationClass::{Modify, Read};

        assert!(ConfirmationMode::All.requires_confirmation(Read));
        assert!(ConfirmationMode::All.requires_confirmation(Modify));
        assert!(!ConfirmationMode::ModifyOnly.requires_confirmation(Read));
        assert!(ConfirmationMode::ModifyOnly.requires_confirmation(Modify));
        assert!(!ConfirmationMode::None.requires_confirmation(Read));
        assert!(!ConfirmationMode::None.requires_confirmation(Modify));
    }

    #[test]
    fn test_default_is_modify_only() {
        assert_eq!(ConfirmationMode::default(), ConfirmationMode::ModifyOnly);
    }

    #[test]
    fn test_parse_and_display() {
        for mode in [
            ConfirmationMode::All,
            ConfirmationMode::ModifyOnly,
            ConfirmationMode::None,
        ] {
            assert_eq!(mode.to_string().parse::<ConfirmationMode>().unwrap(), mode);
        }
        assert_eq!(
            "modify-only".parse::<ConfirmationMode>().unwrap(),
            ConfirmationMode::ModifyOnly
        );
        assert!("sometimes".parse::<ConfirmationMode>().is_err());
    }

    #[test]
    fn test_serde_names() {
        let mode: ConfirmationMode = serde_json::from_str("\"modify\"").unwrap();
        assert_eq!(mode, ConfirmationMode::ModifyOnly);
        assert_eq!(serde_json::to_string(&ConfirmationMode::None).unwrap(), "\"none\"");
    }
}
