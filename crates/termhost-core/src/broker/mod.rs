//! Correlation-id keyed request/response broker
//!
//! Each request-backed operation registers a pending entry under a unique id
//! and then awaits a [`PendingReply`]. The entry completes exactly once: with
//! the value passed to [`RequestBroker::resolve`], or with the caller's
//! default when the timeout elapses or the broker is cleared.
//!
//! ```ignore
//! let id = generate_id("list-terminals");
//! let pending = broker.register(&id, Duration::from_secs(5))?;
//! send(ControlMessage::ListTerminals { request_id: id, .. });
//! let reply = pending.wait_or(Vec::new()).await;
//! ```

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Produce an identifier unique within this process
pub fn generate_id(prefix: &str) -> String {
    let n = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", prefix, n)
}

/// Registration failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("request broker has been disposed")]
    Disposed,

    #[error("request id '{0}' is already pending")]
    DuplicateId(String),
}

struct BrokerState<R> {
    pending: HashMap<String, oneshot::Sender<R>>,
    disposed: bool,
}

/// Transport-agnostic request correlation engine
pub struct RequestBroker<R> {
    state: Arc<Mutex<BrokerState<R>>>,
}

impl<R> Clone for RequestBroker<R> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<R> Default for RequestBroker<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> RequestBroker<R> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState {
                pending: HashMap::new(),
                disposed: false,
            })),
        }
    }

    /// Register a pending request that gives up after `timeout`
    pub fn register(&self, id: &str, timeout: Duration) -> Result<PendingReply<R>, BrokerError> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(BrokerError::Disposed);
        }
        if state.pending.contains_key(id) {
            return Err(BrokerError::DuplicateId(id.to_string()));
        }

        let (tx, rx) = oneshot::channel();
        state.pending.insert(id.to_string(), tx);

        Ok(PendingReply {
            id: id.to_string(),
            timeout,
            receiver: rx,
            state: Arc::clone(&self.state),
        })
    }

    /// Complete the entry for `id`
    ///
    /// Returns false for unknown, late or duplicate ids.
    pub fn resolve(&self, id: &str, value: R) -> bool {
        let sender = self.state.lock().pending.remove(id);
        match sender {
            Some(sender) => sender.send(value).is_ok(),
            None => {
                tracing::debug!(request_id = %id, "ignoring reply for unknown request");
                false
            }
        }
    }

    /// Give up on one entry; its waiter gets the default immediately
    pub fn cancel(&self, id: &str) -> bool {
        self.state.lock().pending.remove(id).is_some()
    }

    /// Resolve every pending entry with its default; the broker stays usable
    pub fn clear(&self, reason: &str) -> usize {
        let drained: Vec<_> = self.state.lock().pending.drain().collect();
        let count = drained.len();
        if count > 0 {
            tracing::debug!(count, reason, "clearing pending requests");
        }
        // Dropping the senders wakes each waiter with its default
        drop(drained);
        count
    }

    /// Clear and reject any further registration
    pub fn dispose(&self) {
        self.state.lock().disposed = true;
        self.clear("disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }
}

/// Handle awaiting one broker-correlated reply
pub struct PendingReply<R> {
    id: String,
    timeout: Duration,
    receiver: oneshot::Receiver<R>,
    state: Arc<Mutex<BrokerState<R>>>,
}

impl<R> PendingReply<R> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the reply; `None` on timeout, clear or cancel
    pub async fn wait(self) -> Option<R> {
        let Self {
            id,
            timeout,
            receiver,
            state,
        } = self;

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(_)) => None,
            Err(_) => {
                state.lock().pending.remove(&id);
                tracing::debug!(request_id = %id, timeout_ms = timeout.as_millis() as u64, "request timed out");
                None
            }
        }
    }

    /// Wait for the reply, falling back to `default`
    pub async fn wait_or(self, default: R) -> R {
        self.wait().await.unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_is_unique() {
        let a = generate_id("list");
        let b = generate_id("list");
        assert_ne!(a, b);
        assert!(a.starts_with("list-"));
    }

    #[tokio::test]
    async fn test_resolve_in_reverse_order() {
        let broker: RequestBroker<u32> = RequestBroker::new();
        let ids: Vec<String> = (0..5).map(|_| generate_id("req")).collect();
        let pending: Vec<_> = ids
            .iter()
            .map(|id| broker.register(id, Duration::from_secs(5)).unwrap())
            .collect();

        for (i, id) in ids.iter().enumerate().rev() {
            assert!(broker.resolve(id, i as u32));
        }

        let results = futures::future::join_all(pending.into_iter().map(|p| p.wait_or(999))).await;
        assert_eq!(results, vec![0, 1, 2, 3, 4]);
        assert_eq!(broker.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_second_resolve_is_ignored() {
        let broker: RequestBroker<&'static str> = RequestBroker::new();
        let pending = broker.register("r1", Duration::from_secs(1)).unwrap();

        assert!(broker.resolve("r1", "first"));
        assert!(!broker.resolve("r1", "second"));
        assert_eq!(pending.wait_or("default").await, "first");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_default_and_removes_entry() {
        let broker: RequestBroker<Vec<u8>> = RequestBroker::new();
        let pending = broker.register("slow", Duration::from_millis(250)).unwrap();

        assert_eq!(pending.wait_or(Vec::new()).await, Vec::<u8>::new());
        assert_eq!(broker.pending_count(), 0);
        assert!(!broker.resolve("slow", vec![1]));
    }

    #[tokio::test]
    async fn test_clear_uses_per_call_defaults() {
        let broker: RequestBroker<i64> = RequestBroker::new();
        let a = broker.register("a", Duration::from_secs(60)).unwrap();
        let b = broker.register("b", Duration::from_secs(60)).unwrap();

        assert_eq!(broker.clear("restart"), 2);
        assert_eq!(a.wait_or(-1).await, -1);
        assert_eq!(b.wait_or(0).await, 0);

        // Still usable after a clear
        let c = broker.register("c", Duration::from_secs(60)).unwrap();
        broker.resolve("c", 7);
        assert_eq!(c.wait_or(0).await, 7);
    }

    #[tokio::test]
    async fn test_dispose_blocks_registration() {
        let broker: RequestBroker<bool> = RequestBroker::new();
        let pending = broker.register("x", Duration::from_secs(60)).unwrap();

        broker.dispose();
        assert!(!pending.wait_or(false).await);
        assert_eq!(
            broker.register("y", Duration::from_secs(1)).err(),
            Some(BrokerError::Disposed)
        );
        assert!(broker.is_disposed());
    }

    #[tokio::test]
    async fn test_cancel_releases_waiter() {
        let broker: RequestBroker<u8> = RequestBroker::new();
        let pending = broker.register("gone", Duration::from_secs(60)).unwrap();

        assert!(broker.cancel("gone"));
        assert!(!broker.cancel("gone"));
        assert_eq!(pending.wait().await, None);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let broker: RequestBroker<()> = RequestBroker::new();
        let _first = broker.register("dup", Duration::from_secs(1)).unwrap();
        assert_eq!(
            broker.register("dup", Duration::from_secs(1)).err(),
            Some(BrokerError::DuplicateId("dup".into()))
        );
    }
}
