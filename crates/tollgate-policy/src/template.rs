//! Segment-exact path templates.
//!
//! A template such as `/gmail/v1/users/{userId}/messages/{messageId}` is a
//! fixed sequence of segments. Literal segments compare byte-for-byte;
//! placeholders match exactly one non-empty segment whose value belongs to
//! the placeholder's [`ValueClass`]. There is no wildcard, prefix or
//! multi-segment matching.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

use crate::error::{PolicyError, PolicyResult};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("invalid regex")
});
static CALENDAR_EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+#-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("invalid regex")
});
static RESOURCE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("invalid regex"));

/// The set of values a placeholder accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueClass {
    /// `me` or an email address.
    UserId,
    /// `primary` or an email-like calendar id (may contain `#`).
    CalendarId,
    /// Opaque backend identifier: `[A-Za-z0-9_-]+`.
    ResourceId,
}

impl ValueClass {
    /// Class implied by a placeholder name.
    fn for_name(name: &str) -> Self {
        match name {
            "userId" => Self::UserId,
            "calendarId" => Self::CalendarId,
            _ => Self::ResourceId,
        }
    }

    /// Whether `value` is a member of this class.
    #[must_use]
    pub fn accepts(self, value: &str) -> bool {
        if value.is_empty() || value == "." || value == ".." {
            return false;
        }
        match self {
            Self::UserId => value == "me" || EMAIL.is_match(value),
            Self::CalendarId => value == "primary" || CALENDAR_EMAIL.is_match(value),
            Self::ResourceId => RESOURCE_ID.is_match(value),
        }
    }
}

/// One segment of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Must equal the path segment exactly.
    Literal(String),
    /// Matches one segment from the value class.
    Placeholder {
        /// Placeholder name, e.g. `messageId`.
        name: String,
        /// Accepted values.
        class: ValueClass,
    },
}

impl Segment {
    fn matches(&self, value: &str) -> bool {
        match self {
            Self::Literal(lit) => lit == value,
            Self::Placeholder { class, .. } => class.accepts(value),
        }
    }

    /// Whether some single path segment could match both.
    fn intersects(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (Self::Literal(lit), Self::Placeholder { class, .. })
            | (Self::Placeholder { class, .. }, Self::Literal(lit)) => class.accepts(lit),
            (Self::Placeholder { .. }, Self::Placeholder { .. }) => true,
        }
    }
}

/// A parsed path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Parse a template string.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidTemplate`] for relative templates,
    /// empty segments, or malformed placeholders.
    pub fn parse(source: &str) -> PolicyResult<Self> {
        let invalid = |message: &str| PolicyError::InvalidTemplate {
            template: source.to_owned(),
            message: message.to_owned(),
        };

        let rest = source
            .strip_prefix('/')
            .ok_or_else(|| invalid("template must start with '/'"))?;
        if rest.is_empty() {
            return Err(invalid("template has no segments"));
        }

        let mut segments = Vec::new();
        for part in rest.split('/') {
            if part.is_empty() {
                return Err(invalid("empty segment"));
            }
            if let Some(inner) = part.strip_prefix('{') {
                let name = inner
                    .strip_suffix('}')
                    .filter(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_alphanumeric()))
                    .ok_or_else(|| invalid("malformed placeholder"))?;
                segments.push(Segment::Placeholder {
                    name: name.to_owned(),
                    class: ValueClass::for_name(name),
                });
            } else if part.contains(['{', '}']) {
                return Err(invalid("placeholder must span a whole segment"));
            } else {
                segments.push(Segment::Literal(part.to_owned()));
            }
        }

        Ok(Self {
            source: source.to_owned(),
            segments,
        })
    }

    /// The template as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Parsed segments.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Segment-exact match against decoded path segments.
    #[must_use]
    pub fn matches<S: AsRef<str>>(&self, path: &[S]) -> bool {
        self.segments.len() == path.len()
            && self
                .segments
                .iter()
                .zip(path)
                .all(|(seg, value)| seg.matches(value.as_ref()))
    }

    /// Whether some concrete path could match both templates.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| a.intersects(b))
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
