//! Normalized request shape consumed by every gating stage.
//!
//! An [`OperationDescriptor`] is built exactly once per inbound request from a
//! [`RawRequest`] and is immutable afterwards. Construction performs path
//! canonicalization:
//!
//! - percent escapes are decoded per segment,
//! - empty segments (duplicate or trailing slashes) are dropped,
//! - any deviation between the raw path and its canonical form is recorded so
//!   that the policy layer can refuse non-canonical spellings outright.
//!
//! Escaping a reserved character (`#`, `@`, `?`, `%`, space, non-ASCII) is
//! the canonical spelling of a segment that contains it, so such segments
//! stay canonical and their decoded value is left to the policy's value
//! classes. Escaping an unreserved character (`A-Za-z0-9-._~`) or writing an
//! escape with lowercase hex digits is a deviation.
//!
//! Paths that cannot be decoded unambiguously (invalid escapes, invalid
//! UTF-8, an escape that decodes to a separator or control character) fail
//! construction with [`ProxyError::MalformedRequest`].

use bytes::Bytes;
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ProxyError;

/// HTTP method of an inbound operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
    /// `HEAD`
    Head,
    /// `OPTIONS`
    Options,
    /// Any other token. Never matched by a policy rule.
    #[serde(untagged)]
    Other(String),
}

impl Method {
    /// The canonical wire spelling of the method.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Other(other) => other,
        }
    }
}

impl FromStr for Method {
    type Err = std::convert::Infallible;

    /// Methods are case-sensitive tokens; `get` is not `GET`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "PATCH" => Self::Patch,
            "DELETE" => Self::Delete,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            other => Self::Other(other.to_owned()),
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inbound request as received from the transport, before any checks.
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    /// Method token exactly as received.
    pub method: String,
    /// Raw (still percent-encoded) path.
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    /// Value of the `Authorization` header, if present.
    pub authorization: Option<String>,
    /// Value of the `Content-Type` header, if present.
    pub content_type: Option<String>,
    /// Request body bytes (empty when absent).
    pub body: Bytes,
}

impl RawRequest {
    /// Create a raw request with no headers, query, or body.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Attach a query string.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Attach an `Authorization` header value.
    #[must_use]
    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    /// Attach a bearer token as the `Authorization` header.
    #[must_use]
    pub fn with_bearer(self, token: &str) -> Self {
        self.with_authorization(format!("Bearer {token}"))
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn with_json(mut self, value: &serde_json::Value) -> Self {
        self.content_type = Some("application/json".to_owned());
        self.body = Bytes::from(value.to_string());
        self
    }

    /// Attach raw body bytes with an explicit content type.
    #[must_use]
    pub fn with_body(mut self, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        self.content_type = Some(content_type.into());
        self.body = body.into();
        self
    }
}

/// Result of canonicalizing a raw path.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CanonicalPath {
    segments: Vec<String>,
    exact: bool,
}

fn canonicalize_path(raw: &str) -> Result<CanonicalPath, ProxyError> {
    let Some(rest) = raw.strip_prefix('/') else {
        return Err(ProxyError::malformed("path must be absolute"));
    };

    let mut segments = Vec::new();
    let mut exact = true;

    if rest.is_empty() {
        return Ok(CanonicalPath { segments, exact });
    }

    for part in rest.split('/') {
        if part.is_empty() {
            exact = false;
            continue;
        }
        if !validate_escapes(part)? {
            exact = false;
        }

        let decoded = percent_decode_str(part)
            .decode_utf8()
            .map_err(|_| ProxyError::malformed("path is not valid UTF-8"))?;

        if decoded
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control())
        {
            return Err(ProxyError::malformed("path segment decodes ambiguously"));
        }
        if decoded == "." || decoded == ".." {
            exact = false;
        }
        segments.push(decoded.into_owned());
    }

    Ok(CanonicalPath { segments, exact })
}

/// Check every escape in `segment` and report whether all of them are in
/// normal form.
///
/// `percent_decode` passes malformed escapes through untouched; refuse them.
/// An escape is out of normal form when it encodes an unreserved character
/// or uses lowercase hex digits.
fn validate_escapes(segment: &str) -> Result<bool, ProxyError> {
    let bytes = segment.as_bytes();
    let mut normal = true;
    for (i, b) in bytes.iter().enumerate() {
        if *b != b'%' {
            continue;
        }
        let hex_pair = bytes.get(i.saturating_add(1)..i.saturating_add(3));
        match hex_pair {
            Some(&[h, l]) if h.is_ascii_hexdigit() && l.is_ascii_hexdigit() => {
                let lowercase = h.is_ascii_lowercase() || l.is_ascii_lowercase();
                if lowercase || is_unreserved(hex_byte(h, l)) {
                    normal = false;
                }
            },
            _ => return Err(ProxyError::malformed("invalid percent escape in path")),
        }
    }
    Ok(normal)
}

fn hex_byte(high: u8, low: u8) -> u8 {
    let nibble = |c: u8| match c {
        b'0'..=b'9' => c.wrapping_sub(b'0'),
        b'a'..=b'f' => c.wrapping_sub(b'a').wrapping_add(10),
        _ => c.wrapping_sub(b'A').wrapping_add(10),
    };
    nibble(high).wrapping_shl(4) | nibble(low)
}

/// RFC 3986 unreserved set; these never need escaping.
fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}

/// The normalized, immutable description of an inbound operation.
#[derive(Debug, Clone)]
pub struct OperationDescriptor {
    method: Method,
    raw_path: String,
    path: String,
    segments: Vec<String>,
    canonical: bool,
    query: Vec<(String, String)>,
    content_type: Option<String>,
    body: Option<Bytes>,
    payload: Option<serde_json::Value>,
}

impl OperationDescriptor {
    /// Build a descriptor from a raw request.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::MalformedRequest`] if the path cannot be decoded
    /// unambiguously or a non-empty body is not valid JSON.
    pub fn from_raw(raw: &RawRequest) -> Result<Self, ProxyError> {
        let method: Method = match raw.method.parse() {
            Ok(m) => m,
            Err(never) => match never {},
        };
        let canonical = canonicalize_path(&raw.path)?;

        let query = raw
            .query
            .as_deref()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();

        let (body, payload) = if raw.body.is_empty() {
            (None, None)
        } else {
            let value: serde_json::Value = serde_json::from_slice(&raw.body)
                .map_err(|_| ProxyError::malformed("request body is not valid JSON"))?;
            (Some(raw.body.clone()), Some(value))
        };

        let path = format!("/{}", canonical.segments.join("/"));

        Ok(Self {
            method,
            raw_path: raw.path.clone(),
            path,
            segments: canonical.segments,
            canonical: canonical.exact,
            query,
            content_type: raw.content_type.clone(),
            body,
            payload,
        })
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path exactly as received.
    #[must_use]
    pub fn raw_path(&self) -> &str {
        &self.raw_path
    }

    /// Canonical (decoded, slash-collapsed) path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Decoded, non-empty path segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether the raw path was already in canonical form.
    ///
    /// `false` when the raw path escaped an unreserved character, used
    /// lowercase hex in an escape, or contained duplicate or trailing slashes
    /// or dot segments.
    #[must_use]
    pub fn is_canonical(&self) -> bool {
        self.canonical
    }

    /// Ordered query pairs, repeated keys preserved.
    #[must_use]
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// First value for a query key.
    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Query string re-encoded from the ordered pairs, if any.
    #[must_use]
    pub fn query_string(&self) -> Option<String> {
        if self.query.is_empty() {
            return None;
        }
        Some(
            url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.query.iter())
                .finish(),
        )
    }

    /// Content type of the request body.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Raw body bytes, forwarded verbatim.
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Parsed JSON body, used only for policy matching and prompt summaries.
    #[must_use]
    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.payload.as_ref()
    }
}

impl fmt::Display for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn build(method: &str, path: &str) -> Result<OperationDescriptor, ProxyError> {
        OperationDescriptor::from_raw(&RawRequest::new(method, path))
    }

    #[test]
    fn test_method_parse_is_case_sensitive() {
        assert_eq!("GET".parse::<Method>().unwrap(), Method::Get);
        assert_eq!(
            "get".parse::<Method>().unwrap(),
            Method::Other("get".to_string())
        );
        assert_eq!(Method::Patch.to_string(), "PATCH");
    }

    #[test]
    fn test_canonical_path_is_exact() {
        let op = build("GET", "/gmail/v1/users/me/messages").unwrap();
        assert!(op.is_canonical());
        assert_eq!(op.path(), "/gmail/v1/users/me/messages");
        assert_eq!(op.segments().len(), 5);
    }

    #[test]
    fn test_trailing_and_duplicate_slashes_are_collapsed_but_flagged() {
        let op = build("POST", "/gmail//v1/users/me/messages/send/").unwrap();
        assert!(!op.is_canonical());
        assert_eq!(op.path(), "/gmail/v1/users/me/messages/send");
    }

    #[test]
    fn test_percent_escapes_are_decoded_and_flagged() {
        let op = build("POST", "/gmail/v1/users/me/messages/%73%65%6e%64").unwrap();
        assert!(!op.is_canonical());
        assert_eq!(op.segments().last().unwrap(), "send");
    }

    #[test]
    fn test_reserved_escapes_stay_canonical() {
        let op = build(
            "GET",
            "/calendar/v3/calendars/en.usa%23holiday@group.v.calendar.google.com/events",
        )
        .unwrap();
        assert!(op.is_canonical());
        assert_eq!(op.segments()[3], "en.usa#holiday@group.v.calendar.google.com");

        let op = build("GET", "/gmail/v1/users/alice%40example.com/labels").unwrap();
        assert!(op.is_canonical());
        assert_eq!(op.segments()[3], "alice@example.com");

        for path in ["/gmail/a%20b", "/gmail/a%3Fb", "/gmail/a%25b", "/gmail/caf%C3%A9"] {
            assert!(build("GET", path).unwrap().is_canonical(), "{path}");
        }
    }

    #[test]
    fn test_unreserved_and_lowercase_escapes_are_flagged() {
        for path in [
            "/gmail/v1/users/me/messages/m1/%6Dodify",
            "/gmail/v1/users/me/messages/m1%2D2",
            "/gmail/v1/users/me%7E",
            "/gmail/v1/users/alice%2fexample.com",
            "/gmail/v1/users/alice%40example.com%2e",
        ] {
            let op = build("GET", path);
            assert!(op.is_err() || !op.unwrap().is_canonical(), "{path}");
        }
        assert!(!build("GET", "/gmail/v1/users/alice%3fx").unwrap().is_canonical());
    }

    #[test]
    fn test_case_is_preserved() {
        let op = build("POST", "/gmail/v1/users/me/messages/SEND").unwrap();
        assert!(op.is_canonical());
        assert_eq!(op.segments().last().unwrap(), "SEND");
    }

    #[test]
    fn test_dot_segments_are_flagged() {
        let op = build("GET", "/gmail/v1/users/me/../me/messages").unwrap();
        assert!(!op.is_canonical());
    }

    #[test]
    fn test_malformed_paths_are_rejected() {
        assert!(build("GET", "gmail/v1").is_err());
        assert!(build("GET", "/gmail/%zz").is_err());
        assert!(build("GET", "/gmail/%2").is_err());
        assert!(build("GET", "/gmail/a%2Fb").is_err());
        assert!(build("GET", "/gmail/a%5Cb").is_err());
        assert!(build("GET", "/gmail/a%00b").is_err());
        assert!(build("GET", "/gmail/%ff%fe").is_err());
    }

    #[test]
    fn test_root_path() {
        let op = build("GET", "/").unwrap();
        assert!(op.is_canonical());
        assert_eq!(op.path(), "/");
        assert!(op.segments().is_empty());
    }

    #[test]
    fn test_query_preserves_order_and_repeats() {
        let raw = RawRequest::new("GET", "/gmail/v1/users/me/messages")
            .with_query("labelIds=INBOX&q=from%3Aboss&labelIds=UNREAD");
        let op = OperationDescriptor::from_raw(&raw).unwrap();
        assert_eq!(
            op.query(),
            &[
                ("labelIds".to_string(), "INBOX".to_string()),
                ("q".to_string(), "from:boss".to_string()),
                ("labelIds".to_string(), "UNREAD".to_string()),
            ]
        );
        assert_eq!(op.query_value("labelIds"), Some("INBOX"));
        assert_eq!(
            op.query_string().unwrap(),
            "labelIds=INBOX&q=from%3Aboss&labelIds=UNREAD"
        );
    }

    #[test]
    fn test_json_body_is_kept_verbatim_and_parsed() {
        let body = json!({"addLabelIds": ["STARRED"]});
        let raw = RawRequest::new("POST", "/gmail/v1/users/me/messages/abc/modify").with_json(&body);
        let op = OperationDescriptor::from_raw(&raw).unwrap();
        assert_eq!(op.body().unwrap(), &Bytes::from(body.to_string()));
        assert_eq!(op.payload().unwrap(), &body);
        assert_eq!(op.content_type(), Some("application/json"));
    }

    #[test]
    fn test_invalid_json_body_is_rejected() {
        let raw = RawRequest::new("POST", "/gmail/v1/users/me/messages/abc/modify")
            .with_body("application/json", "{not json");
        assert!(matches!(
            OperationDescriptor::from_raw(&raw),
            Err(ProxyError::MalformedRequest { .. })
        ));
    }

    #[test]
    fn test_display() {
        let op = build("DELETE", "/calendar/v3/calendars/primary/events/e1").unwrap();
        assert_eq!(op.to_string(), "DELETE /calendar/v3/calendars/primary/events/e1");
    }
}
