//! Terminal styling for command output.
//!
//! Status lines start with a short bracketed tag, so they stay readable
//! when colour is off (`NO_COLOR`, output piped to a file).

use std::fmt::Display;

use colored::Colorize;

/// Width of the label column in [`Theme::field`] lines.
const LABEL_WIDTH: usize = 14;

/// Output styles shared by the `serve` and `keys` commands.
pub(crate) struct Theme;

impl Theme {
    /// Section title underlined by a rule of the same width.
    pub(crate) fn banner(title: &str) -> String {
        let rule = "─".repeat(title.chars().count());
        format!("{}\n{}", title.bold(), rule.dimmed())
    }

    /// An indented `label: value` line with the labels aligned.
    pub(crate) fn field(label: &str, value: impl Display) -> String {
        let label = format!("{label}:");
        let padded = format!("{label:<width$}", width = LABEL_WIDTH);
        format!("  {} {value}", padded.dimmed())
    }

    /// A URL the operator may want to open or copy.
    pub(crate) fn endpoint(url: &str) -> String {
        url.cyan().underline().to_string()
    }

    /// A secret shown exactly once.
    pub(crate) fn secret(value: &str) -> String {
        format!("  {}", value.bold())
    }

    /// `yes` or `no` for an enabled flag.
    pub(crate) fn switch(enabled: bool) -> String {
        if enabled {
            "yes".green().to_string()
        } else {
            "no".red().to_string()
        }
    }

    pub(crate) fn ok(text: &str) -> String {
        format!("{} {text}", "[ok]".green().bold())
    }

    pub(crate) fn caution(text: &str) -> String {
        format!("{} {}", "[!!]".yellow().bold(), text.yellow())
    }

    pub(crate) fn note(text: &str) -> String {
        format!("{} {text}", "[--]".blue())
    }

    pub(crate) fn hint(text: &str) -> String {
        text.dimmed().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn test_banner_rule_matches_title_width() {
        plain();
        assert_eq!(Theme::banner("API Keys"), "API Keys\n────────");
    }

    #[test]
    fn test_fields_align_values() {
        plain();
        assert_eq!(Theme::field("Key", "tg_...abcd"), "  Key:           tg_...abcd");
        assert_eq!(Theme::field("Last used", "never"), "  Last used:     never");
        // An overlong label still leaves one space before the value.
        assert_eq!(
            Theme::field("Confirmation mode", "all"),
            "  Confirmation mode: all"
        );
    }

    #[test]
    fn test_status_tags_survive_without_colour() {
        plain();
        assert_eq!(Theme::ok("Gateway stopped."), "[ok] Gateway stopped.");
        assert_eq!(Theme::caution("Store this key now."), "[!!] Store this key now.");
        assert_eq!(Theme::note("Aborted."), "[--] Aborted.");
        assert_eq!(Theme::switch(false), "no");
    }
}
