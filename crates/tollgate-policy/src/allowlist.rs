//! Built-in allowlist for the Gmail and Calendar backends.
//!
//! Gmail: read messages, threads and labels; change labels, trash and
//! untrash. Calendar: read calendars and events; create, update and delete
//! events. Sending mail, drafts, import/insert, batch operations, permanent
//! deletes and everything else are denied because they are absent here.

use tollgate_core::Method;

use crate::error::PolicyResult;
use crate::matcher::PolicyMatcher;
use crate::rule::{ConfirmationClass, Rule};

const GMAIL: &str = "/gmail/v1/users/{userId}";
const CALENDAR: &str = "/calendar/v3";

/// The built-in rule table, in evaluation order.
///
/// # Errors
///
/// Returns an error if a built-in template fails to parse.
pub fn builtin_rules() -> PolicyResult<Vec<Rule>> {
    use ConfirmationClass::{Modify, Read};

    let table = [
        // Gmail reads
        (Method::Get, format!("{GMAIL}/messages"), Read),
        (Method::Get, format!("{GMAIL}/messages/{{messageId}}"), Read),
        (Method::Get, format!("{GMAIL}/threads/{{threadId}}"), Read),
        (Method::Get, format!("{GMAIL}/labels"), Read),
        (Method::Get, format!("{GMAIL}/labels/{{labelId}}"), Read),
        // Gmail label changes and trash
        (Method::Post, format!("{GMAIL}/messages/{{messageId}}/modify"), Modify),
        (Method::Post, format!("{GMAIL}/messages/{{messageId}}/trash"), Modify),
        (Method::Post, format!("{GMAIL}/messages/{{messageId}}/untrash"), Modify),
        // Calendar reads
        (Method::Get, format!("{CALENDAR}/users/me/calendarList"), Read),
        (Method::Get, format!("{CALENDAR}/calendars/{{calendarId}}"), Read),
        (Method::Get, format!("{CALENDAR}/calendars/{{calendarId}}/events"), Read),
        (Method::Get, format!("{CALENDAR}/calendars/{{calendarId}}/events/{{eventId}}"), Read),
        // Calendar event writes
        (Method::Post, format!("{CALENDAR}/calendars/{{calendarId}}/events"), Modify),
        (Method::Put, format!("{CALENDAR}/calendars/{{calendarId}}/events/{{eventId}}"), Modify),
        (Method::Patch, format!("{CALENDAR}/calendars/{{calendarId}}/events/{{eventId}}"), Modify),
        (Method::Delete, format!("{CALENDAR}/calendars/{{calendarId}}/events/{{eventId}}"), Modify),
    ];

    table
        .into_iter()
        .map(|(method, template, class)| Rule::new(method, &template, class))
        .collect()
}

impl PolicyMatcher {
    /// Matcher over [`builtin_rules`].
    ///
    /// # Errors
    ///
    /// Returns an error if the built-in table fails its self-check.
    pub fn builtin() -> PolicyResult<Self> {
        Self::new(builtin_rules()?)
    }
}
