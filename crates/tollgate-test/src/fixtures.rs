//! Fixtures for common requests and identities.

use serde_json::json;
use tollgate_core::{ApiKey, CallerIdentity, RawRequest};

/// An enabled caller named `agent`.
#[must_use]
pub fn test_caller() -> CallerIdentity {
    CallerIdentity {
        name: "agent".to_owned(),
        enabled: true,
        last_used_at: None,
    }
}

/// A Gmail list-messages read.
#[must_use]
pub fn list_messages(key: &ApiKey) -> RawRequest {
    RawRequest::new("GET", "/gmail/v1/users/me/messages")
        .with_query("q=is%3Aunread&maxResults=10")
        .with_bearer(key.expose())
}

/// A Gmail label change on message `m1`.
#[must_use]
pub fn modify_labels(key: &ApiKey) -> RawRequest {
    RawRequest::new("POST", "/gmail/v1/users/me/messages/m1/modify")
        .with_bearer(key.expose())
        .with_json(&json!({
            "addLabelIds": ["STARRED"],
            "removeLabelIds": ["UNREAD"],
        }))
}

/// A Gmail send, which no rule allows.
#[must_use]
pub fn send_message(key: &ApiKey) -> RawRequest {
    RawRequest::new("POST", "/gmail/v1/users/me/messages/send")
        .with_bearer(key.expose())
        .with_json(&json!({ "raw": "U3ViamVjdDogaGk=" }))
}

/// A Calendar event creation.
#[must_use]
pub fn create_event(key: &ApiKey) -> RawRequest {
    RawRequest::new("POST", "/calendar/v3/calendars/primary/events")
        .with_query("sendUpdates=all")
        .with_bearer(key.expose())
        .with_json(&json!({
            "summary": "Planning",
            "description": "private notes",
            "attendees": [{ "email": "a@example.com" }],
        }))
}
