//! Confirmation manager - serializes operator decisions.
//!
//! # Confirmation Flow
//!
//! 1. If the mode does not require a decision for the operation's class,
//!    return `Approved` without touching the slot
//! 2. Wait for the confirmation slot (FIFO; cancellable by shutdown)
//! 3. Publish the pending snapshot and present the prompt
//! 4. Wait for the decision, bounded by the timeout
//! 5. Clear the snapshot and release the slot, whatever happened
//!
//! Only an [`AllowedOperation`] can be passed in, so a denied operation has
//! no way to reach step 2.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tollgate_core::{CallerIdentity, ConfirmationRefusal, OperationDescriptor};
use tollgate_policy::AllowedOperation;
use tracing::{debug, info, warn};

use crate::channel::{Decision, DecisionChannel};
use crate::error::{ConfirmationError, ConfirmationResult};
use crate::mode::ConfirmationMode;
use crate::prompt::ConfirmationPrompt;

/// Default decision timeout (5 minutes).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// How a confirmation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    /// Forward the request.
    Approved,
    /// The operator said no.
    Rejected,
    /// Nobody answered in time.
    TimedOut,
}

impl ConfirmationOutcome {
    /// The refusal to report, or `None` when approved.
    #[must_use]
    pub fn refusal(self) -> Option<ConfirmationRefusal> {
        match self {
            Self::Approved => None,
            Self::Rejected => Some(ConfirmationRefusal::Rejected),
            Self::TimedOut => Some(ConfirmationRefusal::TimedOut),
        }
    }
}

/// Snapshot of the confirmation currently shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingConfirmation {
    /// The prompt being shown.
    pub prompt: ConfirmationPrompt,
    /// When the operator was asked.
    pub presented_at: DateTime<Utc>,
    /// Seconds the operator has to answer.
    pub timeout_secs: u64,
}

/// Clears the pending snapshot when the slot holder leaves, by any path.
struct PendingGuard<'a> {
    pending: &'a RwLock<Option<PendingConfirmation>>,
}

impl<'a> PendingGuard<'a> {
    fn publish(pending: &'a RwLock<Option<PendingConfirmation>>, entry: PendingConfirmation) -> Self {
        *pending.write().unwrap_or_else(PoisonError::into_inner) = Some(entry);
        Self { pending }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        *self.pending.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Applies the confirmation mode and enforces one pending decision at a time.
pub struct ConfirmationManager {
    mode: ConfirmationMode,
    timeout: Duration,
    channel: Arc<dyn DecisionChannel>,
    /// Held for the whole prompt/decision exchange. `tokio::sync::Mutex`
    /// wakes waiters in the order they started waiting.
    slot: Mutex<()>,
    pending: RwLock<Option<PendingConfirmation>>,
    shutdown: CancellationToken,
}

impl ConfirmationManager {
    /// Create a manager with the default timeout.
    #[must_use]
    pub fn new(mode: ConfirmationMode, channel: Arc<dyn DecisionChannel>) -> Self {
        Self {
            mode,
            timeout: DEFAULT_TIMEOUT,
            channel,
            slot: Mutex::new(()),
            pending: RwLock::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    /// Set the decision timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Share a shutdown token with the rest of the process.
    #[must_use]
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Configured mode.
    #[must_use]
    pub fn mode(&self) -> ConfirmationMode {
        self.mode
    }

    /// Configured decision timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The confirmation currently awaiting a decision, if any.
    #[must_use]
    pub fn pending(&self) -> Option<PendingConfirmation> {
        self.pending
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a confirmation is currently awaiting a decision.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Fail the in-flight confirmation and every queued one.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Obtain a decision for an allowed operation.
    ///
    /// # Errors
    ///
    /// [`ConfirmationError::ShuttingDown`] if shutdown is signalled while
    /// waiting, [`ConfirmationError::Channel`] if the prompt could not be
    /// shown or answered. The slot is released in every case.
    pub async fn require_confirmation(
        &self,
        op: &OperationDescriptor,
        allowed: &AllowedOperation,
        caller: &CallerIdentity,
    ) -> ConfirmationResult<ConfirmationOutcome> {
        if !self.mode.requires_confirmation(allowed.class()) {
            debug!(mode = %self.mode, class = %allowed.class(), "confirmation not required");
            return Ok(ConfirmationOutcome::Approved);
        }

        let _slot = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => return Err(ConfirmationError::ShuttingDown),
            guard = self.slot.lock() => guard,
        };

        let prompt = ConfirmationPrompt::new(op, allowed, caller);
        let _pending = PendingGuard::publish(
            &self.pending,
            PendingConfirmation {
                prompt: prompt.clone(),
                presented_at: Utc::now(),
                timeout_secs: self.timeout.as_secs(),
            },
        );
        info!(
            id = %prompt.id,
            method = %prompt.method,
            path = %prompt.path,
            caller = %prompt.caller,
            "awaiting operator confirmation"
        );

        let answer = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => {
                warn!(id = %prompt.id, "confirmation aborted by shutdown");
                return Err(ConfirmationError::ShuttingDown);
            },
            answer = tokio::time::timeout(self.timeout, self.channel.present(&prompt)) => answer,
        };

        let outcome = match answer {
            Ok(Ok(Decision::Approved)) => ConfirmationOutcome::Approved,
            Ok(Ok(Decision::Rejected)) => ConfirmationOutcome::Rejected,
            Ok(Err(err)) => {
                warn!(id = %prompt.id, error = %err, "confirmation channel failed");
                return Err(err.into());
            },
            Err(_elapsed) => {
                self.channel.expired(&prompt).await;
                ConfirmationOutcome::TimedOut
            },
        };

        info!(id = %prompt.id, outcome = ?outcome, "confirmation decided");
        Ok(outcome)
    }
}

impl std::fmt::Debug for ConfirmationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationManager")
            .field("mode", &self.mode)
            .field("timeout", &self.timeout)
            .field("pending", &self.is_pending())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChannelError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tollgate_core::RawRequest;
    use tollgate_policy::{PolicyMatcher, PolicyVerdict};

    /// Answers from a script; `None` entries never answer.
    struct Scripted {
        answers: std::sync::Mutex<VecDeque<Option<Result<Decision, ChannelError>>>>,
        delay: Duration,
        presented: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
        expired: AtomicUsize,
        order: std::sync::Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(answers: Vec<Option<Result<Decision, ChannelError>>>) -> Arc<Self> {
            Arc::new(Self {
                answers: std::sync::Mutex::new(answers.into()),
                delay: Duration::from_millis(5),
                presented: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                expired: AtomicUsize::new(0),
                order: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn approving(n: usize) -> Arc<Self> {
            Self::new((0..n).map(|_| Some(Ok(Decision::Approved))).collect())
        }
    }

    #[async_trait]
    impl DecisionChannel for Scripted {
        async fn present(&self, prompt: &ConfirmationPrompt) -> Result<Decision, ChannelError> {
            self.presented.fetch_add(1, Ordering::SeqCst);
            self.order.lock().unwrap().push(prompt.path.clone());
            let now = self.active.fetch_add(1, Ordering::SeqCst).saturating_add(1);
            self.max_active.fetch_max(now, Ordering::SeqCst);
            let answer = self.answers.lock().unwrap().pop_front().flatten();
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            match answer {
                Some(result) => result,
                None => std::future::pending().await,
            }
        }

        async fn expired(&self, _prompt: &ConfirmationPrompt) {
            self.expired.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn request(method: &str, path: &str) -> (OperationDescriptor, AllowedOperation) {
        let op = OperationDescriptor::from_raw(&RawRequest::new(method, path)).unwrap();
        let PolicyVerdict::Allowed(allowed) = PolicyMatcher::builtin().unwrap().classify(&op) else {
            panic!("expected allowed");
        };
        (op, allowed)
    }

    fn modify() -> (OperationDescriptor, AllowedOperation) {
        request("POST", "/gmail/v1/users/me/messages/m1/trash")
    }

    fn read() -> (OperationDescriptor, AllowedOperation) {
        request("GET", "/gmail/v1/users/me/messages")
    }

    fn caller() -> CallerIdentity {
        CallerIdentity {
            name: "agent".into(),
            enabled: true,
            last_used_at: None,
        }
    }

    // ---------------------------------------------------------------------
    // Mode policy
    // ---------------------------------------------------------------------

    #[tokio::test]
    async fn test_mode_none_never_prompts() {
        let channel = Scripted::new(vec![]);
        let manager = ConfirmationManager::new(ConfirmationMode::None, channel.clone());
        for (op, allowed) in [read(), modify()] {
            let outcome = manager.require_confirmation(&op, &allowed, &caller()).await.unwrap();
            assert_eq!(outcome, ConfirmationOutcome::Approved);
        }
        assert_eq!(channel.presented.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_mode_modify_only_skips_reads() {
        let channel = Scripted::new(vec![Some(Ok(Decision::Rejected))]);
        let manager = ConfirmationManager::new(ConfirmationMode::ModifyOnly, channel.clone());

        let (op, allowed) = read();
        let outcome = manager.require_confirmation(&op, &allowed, &caller()).await.unwrap();
        assert_eq!(outcome, ConfirmationOutcome::Approved);
        assert_eq!(channel.presented.load(Ordering::SeqCst), 0);

        let (op, allowed) = modify();
        let outcome = manager.require_confirmation(&op, &allowed, &caller()).await.unwrap();
        assert_eq!(outcome, ConfirmationOutcome::Rejected);
        assert_eq!(channel.presented.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mode_all_prompts_for_reads() {
        let channel = Scripted::approving(2);
        let manager = ConfirmationManager::new(ConfirmationMode::All, channel.clone());
        for (op, allowed) in [read(), modify()] {
            manager.require_confirmation(&op, &allowed, &caller()).await.unwrap();
        }
        assert_eq!(channel.presented.load(Ordering::SeqCst), 2);
    }

    // ---------------------------------------------------------------------
    // Timeout, failures, shutdown
    // ---------------------------------------------------------------------

    #[tokio::test]
    async fn test_timeout_releases_slot() {
        let channel = Scripted::new(vec![None, Some(Ok(Decision::Approved))]);
        let manager = ConfirmationManager::new(ConfirmationMode::ModifyOnly, channel.clone())
            .with_timeout(Duration::from_millis(50));
        let (op, allowed) = modify();

        let first = manager.require_confirmation(&op, &allowed, &caller()).await.unwrap();
        assert_eq!(first, ConfirmationOutcome::TimedOut);
        assert_eq!(channel.expired.load(Ordering::SeqCst), 1);
        assert!(!manager.is_pending());

        let second = manager.require_confirmation(&op, &allowed, &caller()).await.unwrap();
        assert_eq!(second, ConfirmationOutcome::Approved);
    }

    #[tokio::test]
    async fn test_channel_failure_releases_slot() {
        let channel = Scripted::new(vec![
            Some(Err(ChannelError::Closed)),
            Some(Ok(Decision::Approved)),
        ]);
        let manager = ConfirmationManager::new(ConfirmationMode::ModifyOnly, channel);
        let (op, allowed) = modify();

        let err = manager
            .require_confirmation(&op, &allowed, &caller())
            .await
            .unwrap_err();
        assert_eq!(err, ConfirmationError::Channel(ChannelError::Closed));
        assert!(!manager.is_pending());

        let outcome = manager.require_confirmation(&op, &allowed, &caller()).await.unwrap();
        assert_eq!(outcome, ConfirmationOutcome::Approved);
    }

    #[tokio::test]
    async fn test_shutdown_fails_inflight_and_queued() {
        let channel = Scripted::new(vec![None, None]);
        let token = CancellationToken::new();
        let manager = Arc::new(
            ConfirmationManager::new(ConfirmationMode::ModifyOnly, channel)
                .with_shutdown(token.clone()),
        );

        let mut handles = Vec::new();
        for _ in 0..2 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                let (op, allowed) = modify();
                manager.require_confirmation(&op, &allowed, &caller()).await
            }));
        }

        while !manager.is_pending() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        token.cancel();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Err(ConfirmationError::ShuttingDown));
        }
        assert!(!manager.is_pending());
    }

    #[tokio::test]
    async fn test_pending_snapshot_visible_while_waiting() {
        let channel = Scripted::new(vec![None]);
        let manager = Arc::new(
            ConfirmationManager::new(ConfirmationMode::ModifyOnly, channel)
                .with_timeout(Duration::from_secs(1)),
        );
        assert!(manager.pending().is_none());

        let waiter = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                let (op, allowed) = modify();
                manager.require_confirmation(&op, &allowed, &caller()).await
            })
        };

        while !manager.is_pending() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let pending = manager.pending().unwrap();
        assert_eq!(pending.prompt.path, "/gmail/v1/users/me/messages/m1/trash");
        assert_eq!(pending.timeout_secs, 1);

        assert_eq!(waiter.await.unwrap().unwrap(), ConfirmationOutcome::TimedOut);
        assert!(manager.pending().is_none());
    }

    // ---------------------------------------------------------------------
    // Concurrency
    // ---------------------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_confirmations_never_overlap() {
        const N: usize = 16;
        let channel = Scripted::approving(N);
        let manager = Arc::new(ConfirmationManager::new(
            ConfirmationMode::ModifyOnly,
            channel.clone(),
        ));

        let handles: Vec<_> = (0..N)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move {
                    let (op, allowed) = modify();
                    manager.require_confirmation(&op, &allowed, &caller()).await
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), ConfirmationOutcome::Approved);
        }
        assert_eq!(channel.presented.load(Ordering::SeqCst), N);
        assert_eq!(channel.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slot_is_granted_in_arrival_order() {
        let channel = Scripted::approving(5);
        let manager = Arc::new(ConfirmationManager::new(
            ConfirmationMode::ModifyOnly,
            channel.clone(),
        ));

        let mut handles = Vec::new();
        for i in 0..5 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                let (op, allowed) = request("POST", &format!("/gmail/v1/users/me/messages/m{i}/trash"));
                manager.require_confirmation(&op, &allowed, &caller()).await
            }));
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let expected: Vec<String> = (0..5)
            .map(|i| format!("/gmail/v1/users/me/messages/m{i}/trash"))
            .collect();
        assert_eq!(*channel.order.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_reads_bypass_held_slot() {
        let channel = Scripted::new(vec![None]);
        let manager = Arc::new(
            ConfirmationManager::new(ConfirmationMode::ModifyOnly, channel)
                .with_timeout(Duration::from_secs(60)),
        );

        let blocked = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                let (op, allowed) = modify();
                manager.require_confirmation(&op, &allowed, &caller()).await
            })
        };
        while !manager.is_pending() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let (op, allowed) = read();
        let outcome = tokio::time::timeout(
            Duration::from_secs(1),
            manager.require_confirmation(&op, &allowed, &caller()),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(outcome, ConfirmationOutcome::Approved);

        manager.shutdown();
        assert!(blocked.await.unwrap().is_err());
    }

    #[test]
    fn test_outcome_refusals() {
        assert_eq!(ConfirmationOutcome::Approved.refusal(), None);
        assert_eq!(
            ConfirmationOutcome::Rejected.refusal(),
            Some(ConfirmationRefusal::Rejected)
        );
        assert_eq!(
            ConfirmationOutcome::TimedOut.refusal(),
            Some(ConfirmationRefusal::TimedOut)
        );
    }
}
