//! Browser decision channel.
//!
//! Pending prompts are held in a queue that an operator page polls or
//! subscribes to. Every change is broadcast as a [`QueueEvent`] carrying the
//! full pending list, so subscribers can simply re-render.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tokio::sync::{broadcast, oneshot};
use tracing::info;
use uuid::Uuid;

use crate::channel::{Decision, DecisionChannel};
use crate::error::ChannelError;
use crate::prompt::ConfirmationPrompt;

const EVENT_CAPACITY: usize = 64;

/// What changed in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueEventKind {
    /// Initial snapshot sent to a new subscriber.
    Connected,
    /// A prompt was queued.
    RequestAdded,
    /// The operator approved a prompt.
    RequestApproved,
    /// The operator rejected a prompt.
    RequestRejected,
    /// A prompt left the queue unanswered: timed out, shut down, or the
    /// caller went away.
    RequestWithdrawn,
}

/// A queue change plus the pending list after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEvent {
    /// What happened.
    pub event: QueueEventKind,
    /// Prompts still waiting for a decision.
    pub pending: Vec<ConfirmationPrompt>,
}

struct Entry {
    prompt: ConfirmationPrompt,
    responder: oneshot::Sender<Decision>,
}

/// Pending prompts awaiting a decision from the web surface.
pub struct WebApprovalQueue {
    entries: Mutex<VecDeque<Entry>>,
    events: broadcast::Sender<QueueEvent>,
}

impl Default for WebApprovalQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WebApprovalQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: Mutex::new(VecDeque::new()),
            events,
        }
    }

    /// Prompts waiting for a decision, oldest first.
    #[must_use]
    pub fn pending(&self) -> Vec<ConfirmationPrompt> {
        self.lock().iter().map(|e| e.prompt.clone()).collect()
    }

    /// Current state as a `connected` event.
    #[must_use]
    pub fn snapshot(&self) -> QueueEvent {
        QueueEvent {
            event: QueueEventKind::Connected,
            pending: self.pending(),
        }
    }

    /// Receive every subsequent queue change.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Approve the prompt `id`. Returns `false` if it is not pending.
    pub fn approve(&self, id: Uuid) -> bool {
        self.resolve(id, Decision::Approved)
    }

    /// Reject the prompt `id`. Returns `false` if it is not pending.
    pub fn reject(&self, id: Uuid) -> bool {
        self.resolve(id, Decision::Rejected)
    }

    fn resolve(&self, id: Uuid, decision: Decision) -> bool {
        let Some(entry) = self.take(id) else {
            return false;
        };
        let _ = entry.responder.send(decision);
        let kind = match decision {
            Decision::Approved => QueueEventKind::RequestApproved,
            Decision::Rejected => QueueEventKind::RequestRejected,
        };
        info!(%id, method = %entry.prompt.method, path = %entry.prompt.path, ?decision, "web decision recorded");
        self.publish(kind);
        true
    }

    fn take(&self, id: Uuid) -> Option<Entry> {
        let mut entries = self.lock();
        let idx = entries.iter().position(|e| e.prompt.id == id)?;
        entries.remove(idx)
    }

    fn publish(&self, event: QueueEventKind) {
        let _ = self.events.send(QueueEvent {
            event,
            pending: self.pending(),
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Withdraws a prompt that is dropped before being decided.
struct Withdraw<'a> {
    queue: &'a WebApprovalQueue,
    id: Uuid,
}

impl Drop for Withdraw<'_> {
    fn drop(&mut self) {
        if self.queue.take(self.id).is_some() {
            self.queue.publish(QueueEventKind::RequestWithdrawn);
        }
    }
}

#[async_trait]
impl DecisionChannel for WebApprovalQueue {
    async fn present(&self, prompt: &ConfirmationPrompt) -> Result<Decision, ChannelError> {
        let (tx, rx) = oneshot::channel();
        self.lock().push_back(Entry {
            prompt: prompt.clone(),
            responder: tx,
        });
        let _withdraw = Withdraw {
            queue: self,
            id: prompt.id,
        };
        self.publish(QueueEventKind::RequestAdded);

        rx.await.map_err(|_| ChannelError::Closed)
    }
}
