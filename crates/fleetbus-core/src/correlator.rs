// ── Request/response correlation ──
//
// Each correlated command gets an id from a per-worker counter and a
// pending entry holding its reply channel. Replies resolve by id, so any
// number of requests can be in flight and complete in any order.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::boundary::{CommandReply, CorrelationId, ReplyData};
use crate::error::BusError;

pub type ReplyReceiver = oneshot::Receiver<Result<ReplyData, BusError>>;

struct PendingRequest {
    reply_tx: oneshot::Sender<Result<ReplyData, BusError>>,
    issued_at: Instant,
}

/// Pending-request table for one command worker.
pub struct Correlator {
    next_id: AtomicU64,
    pending: DashMap<CorrelationId, PendingRequest>,
    closed: AtomicBool,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Allocate an id and a pending entry for a new request.
    pub fn register(&self) -> Result<(CorrelationId, ReplyReceiver), BusError> {
        if self.is_closed() {
            return Err(BusError::Shutdown);
        }
        let id = CorrelationId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.insert(
            id,
            PendingRequest {
                reply_tx,
                issued_at: Instant::now(),
            },
        );
        // A concurrent close may have drained the table before our insert.
        if self.is_closed() {
            self.pending.remove(&id);
            return Err(BusError::Shutdown);
        }
        Ok((id, reply_rx))
    }

    /// Complete the request a reply belongs to. Returns `false` when the
    /// reply matched nothing (late after a timeout, or uncorrelated).
    pub fn resolve(&self, reply: CommandReply) -> bool {
        let Some(id) = reply.correlation_id else {
            debug!("dropping uncorrelated reply");
            return false;
        };
        let Some((_, pending)) = self.pending.remove(&id) else {
            debug!(correlation_id = %id, "dropping reply for unknown correlation id");
            return false;
        };
        debug!(
            correlation_id = %id,
            success = reply.success,
            elapsed_ms = pending.issued_at.elapsed().as_millis(),
            "reply resolved"
        );
        // The caller may have stopped waiting; nothing left to notify.
        let _ = pending.reply_tx.send(reply.into_result());
        true
    }

    /// Forget a request without completing it.
    pub fn expire(&self, id: CorrelationId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Stop accepting new requests.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Reject every pending request with `Shutdown`. Each entry is removed
    /// before it is rejected, so no request is rejected twice.
    pub fn reject_all(&self) -> usize {
        let ids: Vec<CorrelationId> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut rejected = 0;
        for id in ids {
            if let Some((_, pending)) = self.pending.remove(&id) {
                let _ = pending.reply_tx.send(Err(BusError::Shutdown));
                rejected += 1;
            }
        }
        rejected
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Wait for the reply to `id`, giving up after `deadline` if one is set.
    pub async fn wait(
        &self,
        id: CorrelationId,
        mut reply_rx: ReplyReceiver,
        deadline: Option<Duration>,
    ) -> Result<ReplyData, BusError> {
        let Some(limit) = deadline else {
            return reply_rx.await.unwrap_or(Err(BusError::Shutdown));
        };
        match tokio::time::timeout(limit, &mut reply_rx).await {
            Ok(outcome) => outcome.unwrap_or(Err(BusError::Shutdown)),
            Err(_) => {
                if self.expire(id) {
                    warn!(correlation_id = %id, timeout_ms = limit.as_millis(), "request timed out");
                    return Err(BusError::Timeout { timeout: limit });
                }
                // Resolved or rejected between the deadline and the expiry.
                reply_rx
                    .try_recv()
                    .unwrap_or(Err(BusError::Timeout { timeout: limit }))
            }
        }
    }
}
