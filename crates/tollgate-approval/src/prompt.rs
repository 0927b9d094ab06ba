//! What the operator sees.
//!
//! A prompt carries the method, canonical path and query plus a short list
//! of redacted details picked from the payload: label ids for Gmail label
//! changes, title/attendees/notification setting for Calendar writes, and
//! resource ids. Message bodies, event descriptions and other free text are
//! never copied into a prompt.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write as _;
use tollgate_core::{CallerIdentity, OperationDescriptor};
use tollgate_policy::{AllowedOperation, ConfirmationClass};
use uuid::Uuid;

/// Longest event title shown before truncation.
const MAX_TITLE_CHARS: usize = 80;

/// One labelled line of redacted detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptDetail {
    /// Short label, e.g. `Add labels`.
    pub label: String,
    /// Value shown to the operator.
    pub value: String,
}

/// A confirmation request as presented to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmationPrompt {
    /// Identifier used by the web channel to address this prompt.
    pub id: Uuid,
    /// HTTP method.
    pub method: String,
    /// Canonical path.
    pub path: String,
    /// Query string, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Confirmation class of the matched rule.
    pub class: ConfirmationClass,
    /// Name of the calling key.
    pub caller: String,
    /// Redacted operation details.
    pub details: Vec<PromptDetail>,
    /// When the prompt was created.
    pub created_at: DateTime<Utc>,
}

impl ConfirmationPrompt {
    /// Build the prompt for an allowed operation.
    #[must_use]
    pub fn new(op: &OperationDescriptor, allowed: &AllowedOperation, caller: &CallerIdentity) -> Self {
        Self {
            id: Uuid::new_v4(),
            method: op.method().to_string(),
            path: op.path().to_owned(),
            query: op.query_string(),
            class: allowed.class(),
            caller: caller.name.clone(),
            details: summarize(op, allowed.template()),
            created_at: Utc::now(),
        }
    }

    /// Terminal rendering, ending with the question.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!("[CONFIRM] {} {}\n", self.method, self.path);
        let _ = writeln!(out, "  Caller: {}", self.caller);
        if let Some(query) = &self.query {
            let _ = writeln!(out, "  Query: {query}");
        }
        for detail in &self.details {
            let _ = writeln!(out, "  {}: {}", detail.label, detail.value);
        }
        out.push_str("Allow this request? [y/N]: ");
        out
    }
}

fn summarize(op: &OperationDescriptor, template: &str) -> Vec<PromptDetail> {
    let mut details = Vec::new();
    let mut push = |label: &str, value: String| {
        if !value.is_empty() {
            details.push(PromptDetail {
                label: label.to_owned(),
                value,
            });
        }
    };
    let payload = op.payload();

    if template.starts_with("/gmail/") {
        if let Some(id) = placeholder(op, template, "messageId") {
            push("Message", id.to_owned());
        }
        if template.ends_with("/modify") {
            push("Add labels", string_list(payload, "addLabelIds"));
            push("Remove labels", string_list(payload, "removeLabelIds"));
        }
    } else if template.starts_with("/calendar/") {
        if let Some(id) = placeholder(op, template, "eventId") {
            push("Event ID", id.to_owned());
        }
        if let Some(title) = payload.and_then(|p| p.get("summary")).and_then(Value::as_str) {
            push("Event", truncate(title, MAX_TITLE_CHARS));
        }
        push("Attendees", attendee_emails(payload));
        if let Some(updates) = op.query_value("sendUpdates") {
            push("Send notifications", updates.to_owned());
        }
    }

    details
}

/// Value of the `{name}` placeholder in the request path.
fn placeholder<'a>(op: &'a OperationDescriptor, template: &str, name: &str) -> Option<&'a str> {
    let wanted = format!("{{{name}}}");
    template
        .trim_start_matches('/')
        .split('/')
        .zip(op.segments())
        .find(|(seg, _)| *seg == wanted)
        .map(|(_, value)| value.as_str())
}

fn string_list(payload: Option<&Value>, key: &str) -> String {
    payload
        .and_then(|p| p.get(key))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

fn attendee_emails(payload: Option<&Value>) -> String {
    payload
        .and_then(|p| p.get("attendees"))
        .and_then(Value::as_array)
        .map(|attendees| {
            attendees
                .iter()
                .filter_map(|a| a.get("email").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_owned();
    }
    let head: String = text.chars().take(max).collect();
    format!("{head}...")
}
