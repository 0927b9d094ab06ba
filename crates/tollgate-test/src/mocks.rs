//! Mock collaborators for pipeline and HTTP tests.
//!
//! All doubles use `std::sync` primitives so builders work without a
//! runtime; none of them hold a lock across an await point.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tollgate_approval::{ChannelError, ConfirmationPrompt, Decision, DecisionChannel};
use tollgate_core::{
    ApiKey, Backend, BackendError, BackendResponse, CallerIdentity, CoreError, CoreResult,
    Credential, CredentialProvider, ForwardRequest, KeyRecord, KeyStore,
};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Key store
// ---------------------------------------------------------------------------

/// In-memory [`KeyStore`] keyed by key digest.
#[derive(Debug, Clone, Default)]
pub struct InMemoryKeyStore {
    records: Arc<RwLock<HashMap<String, KeyRecord>>>,
    touches: Arc<AtomicUsize>,
    lookups: Arc<AtomicUsize>,
    broken: Arc<AtomicBool>,
}

impl InMemoryKeyStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a key named `name`.
    pub fn insert(&self, name: &str, enabled: bool) -> ApiKey {
        let key = ApiKey::generate();
        let mut record = KeyRecord::new(name, &key);
        record.enabled = enabled;
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.digest(), record);
        key
    }

    /// Enable or disable the key named `name`.
    pub fn set_enabled(&self, name: &str, enabled: bool) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        for record in records.values_mut().filter(|r| r.name == name) {
            record.enabled = enabled;
        }
    }

    /// Delete the key named `name`.
    pub fn revoke(&self, name: &str) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, r| r.name != name);
    }

    /// Make every subsequent lookup fail.
    pub fn break_store(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    /// Number of last-used updates received.
    #[must_use]
    pub fn touch_count(&self) -> usize {
        self.touches.load(Ordering::SeqCst)
    }

    /// Number of lookups performed.
    #[must_use]
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn lookup(&self, key: &ApiKey) -> CoreResult<Option<CallerIdentity>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.broken.load(Ordering::SeqCst) {
            return Err(CoreError::KeyStore("store unavailable".into()));
        }
        Ok(self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key.digest())
            .map(KeyRecord::identity))
    }

    async fn touch_last_used(&self, key: &ApiKey) -> CoreResult<()> {
        self.touches.fetch_add(1, Ordering::SeqCst);
        if let Some(record) = self
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&key.digest())
        {
            record.last_used_at = Some(Utc::now());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Decision channel
// ---------------------------------------------------------------------------

/// What a [`ScriptedChannel`] does with the next prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    /// Answer yes.
    Approve,
    /// Answer no.
    Reject,
    /// Never answer.
    Silent,
    /// Fail with [`ChannelError::Closed`].
    Fail,
}

/// [`DecisionChannel`] that answers from a queue and records every prompt.
///
/// With an empty queue it stays silent.
#[derive(Debug, Clone, Default)]
pub struct ScriptedChannel {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    presented: Arc<Mutex<Vec<ConfirmationPrompt>>>,
    expired: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    delay: Duration,
}

impl ScriptedChannel {
    /// A channel with no answers queued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an answer.
    #[must_use]
    pub fn with_script(self, script: Script) -> Self {
        self.push(script);
        self
    }

    /// Queue `n` approvals.
    #[must_use]
    pub fn approving(n: usize) -> Self {
        let channel = Self::new();
        for _ in 0..n {
            channel.push(Script::Approve);
        }
        channel
    }

    /// Hold each prompt for `delay` before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue an answer on a shared handle.
    pub fn push(&self, script: Script) {
        lock(&self.scripts).push_back(script);
    }

    /// Prompts presented so far, in order.
    #[must_use]
    pub fn presented(&self) -> Vec<ConfirmationPrompt> {
        lock(&self.presented).clone()
    }

    /// Number of prompts presented.
    #[must_use]
    pub fn presented_count(&self) -> usize {
        lock(&self.presented).len()
    }

    /// Number of timeout notices received.
    #[must_use]
    pub fn expired_count(&self) -> usize {
        self.expired.load(Ordering::SeqCst)
    }

    /// Highest number of prompts that were ever outstanding at once.
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

/// Decrements the active count even when the present future is dropped.
struct Active<'a>(&'a AtomicUsize);

impl Drop for Active<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DecisionChannel for ScriptedChannel {
    async fn present(&self, prompt: &ConfirmationPrompt) -> Result<Decision, ChannelError> {
        lock(&self.presented).push(prompt.clone());
        let now = self.active.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        let _active = Active(&self.active);
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let script = lock(&self.scripts).pop_front().unwrap_or(Script::Silent);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match script {
            Script::Approve => Ok(Decision::Approved),
            Script::Reject => Ok(Decision::Rejected),
            Script::Fail => Err(ChannelError::Closed),
            Script::Silent => std::future::pending().await,
        }
    }

    async fn expired(&self, _prompt: &ConfirmationPrompt) {
        self.expired.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// [`Backend`] that records requests and replays queued results.
///
/// With an empty queue it answers `200 {"ok": true}`.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    requests: Arc<Mutex<Vec<ForwardRequest>>>,
    results: Arc<Mutex<VecDeque<Result<BackendResponse, BackendError>>>>,
}

impl RecordingBackend {
    /// Create a backend with nothing queued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response.
    #[must_use]
    pub fn with_response(self, response: BackendResponse) -> Self {
        lock(&self.results).push_back(Ok(response));
        self
    }

    /// Queue a failure.
    #[must_use]
    pub fn with_error(self, error: BackendError) -> Self {
        lock(&self.results).push_back(Err(error));
        self
    }

    /// Requests received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<ForwardRequest> {
        lock(&self.requests).clone()
    }

    /// Number of requests received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl Backend for RecordingBackend {
    async fn forward(&self, request: &ForwardRequest) -> Result<BackendResponse, BackendError> {
        lock(&self.requests).push(request.clone());
        lock(&self.results).pop_front().unwrap_or_else(|| {
            Ok(BackendResponse {
                status: 200,
                content_type: Some("application/json".into()),
                body: Bytes::from_static(b"{\"ok\":true}"),
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// [`CredentialProvider`] that always returns the same token.
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    token: String,
    calls: Arc<AtomicUsize>,
}

impl StaticCredentialProvider {
    /// Provider for `token`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of credentials handed out.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for StaticCredentialProvider {
    fn default() -> Self {
        Self::new("backend-test-token")
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn valid_credential(&self) -> Result<Credential, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Credential::new(self.token.clone()))
    }
}

/// [`CredentialProvider`] that always fails.
#[derive(Debug, Clone, Default)]
pub struct FailingCredentialProvider;

#[async_trait]
impl CredentialProvider for FailingCredentialProvider {
    async fn valid_credential(&self) -> Result<Credential, BackendError> {
        Err(BackendError::Credential("token refresh failed".into()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tollgate_core::{OperationDescriptor, RawRequest};
    use tollgate_policy::{PolicyMatcher, PolicyVerdict};

    fn prompt() -> ConfirmationPrompt {
        let op = OperationDescriptor::from_raw(&RawRequest::new(
            "POST",
            "/gmail/v1/users/me/messages/m1/trash",
        ))
        .unwrap();
        let PolicyVerdict::Allowed(allowed) = PolicyMatcher::builtin().unwrap().classify(&op) else {
            panic!("expected allowed");
        };
        let caller = CallerIdentity {
            name: "agent".into(),
            enabled: true,
            last_used_at: None,
        };
        ConfirmationPrompt::new(&op, &allowed, &caller)
    }

    #[tokio::test]
    async fn test_key_store_lifecycle() {
        let store = InMemoryKeyStore::new();
        let key = store.insert("agent", true);
        assert!(store.is_enabled(&key).await.unwrap());

        store.set_enabled("agent", false);
        assert!(!store.is_enabled(&key).await.unwrap());

        store.touch_last_used(&key).await.unwrap();
        assert_eq!(store.touch_count(), 1);
        assert!(store.lookup(&key).await.unwrap().unwrap().last_used_at.is_some());

        store.revoke("agent");
        assert!(store.lookup(&key).await.unwrap().is_none());

        store.break_store();
        assert!(store.lookup(&key).await.is_err());
    }

    #[tokio::test]
    async fn test_scripted_channel_answers_in_order() {
        let channel = ScriptedChannel::new()
            .with_script(Script::Approve)
            .with_script(Script::Reject)
            .with_script(Script::Fail);
        assert_eq!(channel.present(&prompt()).await.unwrap(), Decision::Approved);
        assert_eq!(channel.present(&prompt()).await.unwrap(), Decision::Rejected);
        assert!(channel.present(&prompt()).await.is_err());
        assert_eq!(channel.presented_count(), 3);
        assert_eq!(channel.max_concurrent(), 1);
    }

    #[tokio::test]
    async fn test_recording_backend_defaults_to_ok() {
        let backend = RecordingBackend::new().with_error(BackendError::Transport("down".into()));
        let op = OperationDescriptor::from_raw(&RawRequest::new("GET", "/gmail/v1/users/me/labels"))
            .unwrap();
        let request = ForwardRequest::new(&op, Credential::new("t"));

        assert!(backend.forward(&request).await.is_err());
        assert_eq!(backend.forward(&request).await.unwrap().status, 200);
        assert_eq!(backend.call_count(), 2);
    }
}
