//! Caller authentication.
//!
//! The store is queried on every request; nothing about a key is cached, so
//! disabling or revoking a key applies to the very next request.

use std::sync::Arc;

use tollgate_core::{ApiKey, AuthError, CallerIdentity, GateResult, KeyStore, ProxyError};
use tracing::{debug, warn};

/// Resolves the `Authorization` header to a caller.
#[derive(Clone)]
pub struct AuthGate {
    store: Arc<dyn KeyStore>,
}

impl AuthGate {
    /// Gate backed by `store`.
    #[must_use]
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self { store }
    }

    /// Authenticate a request from its `Authorization` header value.
    ///
    /// On success the key's last-used time is updated in the background;
    /// the request does not wait for it.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MissingHeader`] when there is no header
    /// - [`AuthError::MalformedHeader`] for a non-bearer header or a token
    ///   that is not shaped like a key
    /// - [`AuthError::UnknownKey`] when the store has no such key
    /// - [`AuthError::DisabledKey`] when the key exists but is disabled
    /// - [`ProxyError::Internal`] when the store cannot be read
    pub async fn authenticate(&self, authorization: Option<&str>) -> GateResult<CallerIdentity> {
        let key = ApiKey::from_authorization(authorization)?;

        let identity = self.store.lookup(&key).await.map_err(|e| {
            warn!(error = %e, "key store lookup failed");
            ProxyError::internal("failed to verify API key")
        })?;

        let Some(identity) = identity else {
            debug!(key = %key.preview(), "unknown API key");
            return Err(AuthError::UnknownKey.into());
        };
        if !identity.enabled {
            debug!(caller = %identity.name, "disabled API key");
            return Err(AuthError::DisabledKey.into());
        }

        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = store.touch_last_used(&key).await {
                warn!(error = %e, "failed to record key use");
            }
        });

        Ok(identity)
    }
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::GateError;
    use tollgate_test::InMemoryKeyStore;

    fn gate(store: &InMemoryKeyStore) -> AuthGate {
        AuthGate::new(Arc::new(store.clone()))
    }

    fn auth_kind(result: GateResult<CallerIdentity>) -> AuthError {
        match result {
            Err(GateError::Auth(kind)) => kind,
            other => panic!("expected auth error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_and_malformed() {
        let store = InMemoryKeyStore::new();
        let gate = gate(&store);

        assert_eq!(auth_kind(gate.authenticate(None).await), AuthError::MissingHeader);
        assert_eq!(
            auth_kind(gate.authenticate(Some("Basic dXNlcjpwYXNz")).await),
            AuthError::MalformedHeader
        );
        assert_eq!(
            auth_kind(gate.authenticate(Some("Bearer not-a-key")).await),
            AuthError::MalformedHeader
        );
        // Malformed keys never reach the store.
        assert_eq!(store.lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_and_disabled() {
        let store = InMemoryKeyStore::new();
        let gate = gate(&store);
        let disabled = store.insert("old-agent", false);

        assert_eq!(
            auth_kind(gate.authenticate(Some(&format!("Bearer {}", ApiKey::generate().expose()))).await),
            AuthError::UnknownKey
        );
        assert_eq!(
            auth_kind(gate.authenticate(Some(&format!("Bearer {}", disabled.expose()))).await),
            AuthError::DisabledKey
        );
        assert_eq!(store.touch_count(), 0);
    }

    #[tokio::test]
    async fn test_valid_key_is_case_insensitive_scheme_and_touched() {
        let store = InMemoryKeyStore::new();
        let gate = gate(&store);
        let key = store.insert("agent", true);

        let caller = gate
            .authenticate(Some(&format!("bearer {}", key.expose())))
            .await
            .unwrap();
        assert_eq!(caller.name, "agent");

        for _ in 0..50 {
            if store.touch_count() == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(store.touch_count(), 1);
    }

    #[tokio::test]
    async fn test_revocation_applies_to_next_request() {
        let store = InMemoryKeyStore::new();
        let gate = gate(&store);
        let key = store.insert("agent", true);
        let header = format!("Bearer {}", key.expose());

        assert!(gate.authenticate(Some(&header)).await.is_ok());
        store.set_enabled("agent", false);
        assert_eq!(auth_kind(gate.authenticate(Some(&header)).await), AuthError::DisabledKey);
        store.revoke("agent");
        assert_eq!(auth_kind(gate.authenticate(Some(&header)).await), AuthError::UnknownKey);
    }

    #[tokio::test]
    async fn test_store_failure_is_internal() {
        let store = InMemoryKeyStore::new();
        let key = store.insert("agent", true);
        store.break_store();
        let result = gate(&store)
            .authenticate(Some(&format!("Bearer {}", key.expose())))
            .await;
        assert!(matches!(result, Err(GateError::Proxy(ProxyError::Internal { .. }))));
    }
}
