use chat_core::llm::ChatError;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::session::Session;

/// Background deletes started by abandoned conversations.
#[derive(Clone, Default)]
pub struct PendingCleanups(Arc<Mutex<Vec<JoinHandle<()>>>>);

impl PendingCleanups {
    fn push(&self, handle: JoinHandle<()>) {
        if let Ok(mut v) = self.0.lock() {
            v.retain(|h| !h.is_finished());
            v.push(handle);
        }
    }

    /// Waits for every background delete started so far.
    pub async fn wait(&self) {
        let handles = self
            .0
            .lock()
            .map(|mut v| std::mem::take(&mut *v))
            .unwrap_or_default();
        for h in handles {
            let _ = h.await;
        }
    }
}

/// A live remote conversation. Deleted by [`ConversationGuard::release`], or
/// in the background when the guard is dropped unreleased (for example when
/// the consumer abandons the stream).
pub struct ConversationGuard {
    session: Session,
    id: String,
    live: bool,
    pending: PendingCleanups,
}

impl ConversationGuard {
    pub fn new(session: Session, id: String, pending: PendingCleanups) -> Self {
        debug!(target:"providers::huggingchat","conversation {} created", id);
        Self {
            session,
            id,
            live: true,
            pending,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Deletes the conversation. The DELETE runs as its own task, so
    /// cancelling this future only stops the wait; the request is never
    /// issued twice.
    pub async fn release(mut self) -> Result<(), ChatError> {
        self.live = false;
        let session = self.session.clone();
        let id = self.id.clone();
        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let res = session.delete_conversation(&id).await;
            if let Err(Err(e)) = tx.send(res) {
                warn!(target:"providers::huggingchat","{}", e);
            }
        });
        self.pending.push(task);
        rx.await.unwrap_or_else(|_| {
            Err(ChatError::Cleanup {
                conversation_id: self.id.clone(),
                reason: "delete task ended without a result".into(),
            })
        })
    }
}

impl Drop for ConversationGuard {
    fn drop(&mut self) {
        if !self.live {
            return;
        }
        let session = self.session.clone();
        let id = std::mem::take(&mut self.id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(target:"providers::huggingchat","conversation {} abandoned; deleting in background", id);
                let task = handle.spawn(async move {
                    if let Err(e) = session.delete_conversation(&id).await {
                        warn!(target:"providers::huggingchat","{}", e);
                    }
                });
                self.pending.push(task);
            }
            Err(_) => {
                warn!(target:"providers::huggingchat","no runtime to delete conversation {}", id);
            }
        }
    }
}
