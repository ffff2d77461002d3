//! Request/response correlation: monotonic id issue and a registry of
//! single-use response slots.

use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::debug;

use crate::protocol::jsonrpc::{JsonrpcResponse, RequestId};

/// Owns the pending-request registry for one session.
///
/// Each slot is consumed at most once: a response is either delivered to the
/// registered waiter or dropped because the waiter already gave up.
pub(crate) struct Correlator {
    next_id: AtomicI64,
    waiters: DashMap<RequestId, oneshot::Sender<JsonrpcResponse>>,
}

impl Correlator {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            waiters: DashMap::new(),
        }
    }

    /// Issue the next request id; unique for the life of the session.
    pub(crate) fn next_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Install a fresh waiter slot for `id`.
    pub(crate) fn register(&self, id: RequestId) -> oneshot::Receiver<JsonrpcResponse> {
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(id, tx);
        rx
    }

    /// Deliver a response to its waiter. Returns false for late responses
    /// whose waiter already gave up.
    pub(crate) fn complete(&self, response: JsonrpcResponse) -> bool {
        match self.waiters.remove(&response.id) {
            Some((id, slot)) => {
                if slot.send(response).is_err() {
                    debug!(id = %id, "waiter vanished before delivery");
                    return false;
                }
                true
            }
            None => false,
        }
    }

    /// Drop the waiter for `id` (timeout or caller cancellation).
    pub(crate) fn forget(&self, id: &RequestId) {
        self.waiters.remove(id);
    }

    /// Free every waiter; their receivers observe the closed channel.
    pub(crate) fn abort_all(&self) {
        self.waiters.clear();
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.waiters.len()
    }
}
