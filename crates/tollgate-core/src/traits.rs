//! Interfaces to the gateway's external collaborators.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

use crate::descriptor::{Method, OperationDescriptor};
use crate::error::{BackendError, CoreResult};
use crate::identity::{ApiKey, CallerIdentity};

/// Caller credential lookup.
///
/// Implementations are queried fresh on every request, so a disable or
/// revoke takes effect on the next call without a restart.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Resolve a key to its identity, or `None` if unknown.
    async fn lookup(&self, key: &ApiKey) -> CoreResult<Option<CallerIdentity>>;

    /// Record that `key` was just used.
    async fn touch_last_used(&self, key: &ApiKey) -> CoreResult<()>;

    /// Whether `key` is known and enabled.
    async fn is_enabled(&self, key: &ApiKey) -> CoreResult<bool> {
        Ok(self.lookup(key).await?.is_some_and(|id| id.enabled))
    }
}

/// A backend access token. `Debug` never shows the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap an access token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for the outbound `Authorization` header only.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Source of valid backend credentials.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Return a credential that is valid now, refreshing if needed.
    async fn valid_credential(&self) -> Result<Credential, BackendError>;

    /// Replace a credential the backend just refused with 401.
    ///
    /// Requests that were refused together all pass the same stale
    /// credential; only the first one should reach the token endpoint, and
    /// the rest receive the credential it obtained.
    async fn refresh(&self, _stale: &Credential) -> Result<Credential, BackendError> {
        self.valid_credential().await
    }
}

/// An approved operation with the backend credential attached.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    /// HTTP method.
    pub method: Method,
    /// Canonical path, including the backend family prefix.
    pub path: String,
    /// Ordered query pairs.
    pub query: Vec<(String, String)>,
    /// Content type of the body.
    pub content_type: Option<String>,
    /// Body bytes exactly as received.
    pub body: Option<Bytes>,
    /// Credential to present to the backend.
    pub credential: Credential,
}

impl ForwardRequest {
    /// Attach `credential` to an approved operation.
    #[must_use]
    pub fn new(op: &OperationDescriptor, credential: Credential) -> Self {
        Self {
            method: op.method().clone(),
            path: op.path().to_owned(),
            query: op.query().to_vec(),
            content_type: op.content_type().map(str::to_owned),
            body: op.body().cloned(),
            credential,
        }
    }
}

/// A backend answer passed through to the caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendResponse {
    /// Status code.
    pub status: u16,
    /// Content type, if the backend sent one.
    pub content_type: Option<String>,
    /// Body bytes.
    pub body: Bytes,
}

impl BackendResponse {
    /// A JSON response.
    #[must_use]
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self {
            status,
            content_type: Some("application/json".to_owned()),
            body: Bytes::from(value.to_string()),
        }
    }
}

/// Performs the outbound call for an approved operation.
///
/// Backend 4xx/5xx answers are reported as [`BackendError::Upstream`].
#[async_trait]
pub trait Backend: Send + Sync {
    /// Send `request` to the backend.
    async fn forward(&self, request: &ForwardRequest) -> Result<BackendResponse, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::RawRequest;
    use crate::error::CoreError;
    use serde_json::json;

    struct OneKey(Option<CallerIdentity>);

    #[async_trait]
    impl KeyStore for OneKey {
        async fn lookup(&self, _key: &ApiKey) -> CoreResult<Option<CallerIdentity>> {
            Ok(self.0.clone())
        }

        async fn touch_last_used(&self, _key: &ApiKey) -> CoreResult<()> {
            Err(CoreError::KeyStore("read-only".into()))
        }
    }

    fn identity(enabled: bool) -> CallerIdentity {
        CallerIdentity {
            name: "agent".into(),
            enabled,
            last_used_at: None,
        }
    }

    #[tokio::test]
    async fn test_is_enabled_defaults_to_lookup() {
        let key = ApiKey::generate();
        assert!(OneKey(Some(identity(true))).is_enabled(&key).await.unwrap());
        assert!(!OneKey(Some(identity(false))).is_enabled(&key).await.unwrap());
        assert!(!OneKey(None).is_enabled(&key).await.unwrap());
    }

    #[test]
    fn test_credential_debug_is_masked() {
        let credential = Credential::new("ya29.secret");
        assert_eq!(format!("{credential:?}"), "Credential(***)");
        assert_eq!(credential.token(), "ya29.secret");
    }

    #[test]
    fn test_forward_request_carries_body_verbatim() {
        let body = json!({"removeLabelIds": ["UNREAD"]});
        let raw = RawRequest::new("POST", "/gmail/v1/users/me/messages/m1/modify")
            .with_query("fields=id")
            .with_json(&body);
        let op = OperationDescriptor::from_raw(&raw).unwrap();
        let forward = ForwardRequest::new(&op, Credential::new("t"));

        assert_eq!(forward.method, Method::Post);
        assert_eq!(forward.path, "/gmail/v1/users/me/messages/m1/modify");
        assert_eq!(forward.query, vec![("fields".to_string(), "id".to_string())]);
        assert_eq!(forward.body.unwrap(), Bytes::from(body.to_string()));
    }
}
