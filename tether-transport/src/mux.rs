//! Request multiplexing for concurrent calls over a single connection.
//!
//! Each call gets a unique id. Unary calls wait on a oneshot; stream-out
//! calls own an [`Inbound`] fed by every `StreamData` frame until the server
//! ends or fails the stream.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::oneshot;

use tether_core::{Envelope, Inbound, InboundSender, MessageKind, TetherError, TransportError};

type UnaryReply = oneshot::Sender<Result<Vec<u8>, TetherError>>;

enum Pending {
    Unary(UnaryReply),
    Stream(InboundSender),
}

/// Correlates response frames with in-flight calls.
pub struct Multiplexer {
    pending: DashMap<u64, Pending>,
    next_id: AtomicU64,
}

impl Multiplexer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a call awaiting a single reply.
    pub fn register_unary(&self) -> (u64, oneshot::Receiver<Result<Vec<u8>, TetherError>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        self.pending.insert(id, Pending::Unary(tx));

        (id, rx)
    }

    /// Register a call receiving a stream of replies.
    pub fn register_stream(&self) -> (u64, Inbound) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, inbound) = Inbound::channel();

        self.pending.insert(id, Pending::Stream(tx));

        (id, inbound)
    }

    /// Route an inbound frame to its call. Returns `false` if no call
    /// was waiting for it.
    pub async fn dispatch(&self, envelope: Envelope) -> bool {
        let id = envelope.id;
        match envelope.kind {
            MessageKind::Response | MessageKind::Pong => match self.pending.remove(&id) {
                Some((_, Pending::Unary(tx))) => {
                    let _ = tx.send(Ok(envelope.payload));
                    true
                }
                Some((_, Pending::Stream(_))) => true,
                None => {
                    tracing::warn!(request_id = id, "no pending request found for response");
                    false
                }
            },
            MessageKind::Error => self.dispatch_error(id, envelope.to_error()).await,
            MessageKind::StreamData => {
                let Some(tx) = self.stream_sender(id) else {
                    tracing::warn!(request_id = id, "no pending stream found for item");
                    return false;
                };
                if tx.send(Ok(envelope.payload)).await.is_err() {
                    // Receiver dropped; stop buffering for it.
                    self.pending.remove(&id);
                }
                true
            }
            MessageKind::StreamEnd => self.pending.remove(&id).is_some(),
            MessageKind::Request | MessageKind::StreamStart | MessageKind::Ping => {
                tracing::warn!(request_id = id, kind = ?envelope.kind, "unexpected frame from server");
                false
            }
        }
    }

    /// Fail one call with `error`.
    pub async fn dispatch_error(&self, request_id: u64, error: TetherError) -> bool {
        match self.pending.remove(&request_id) {
            Some((_, Pending::Unary(tx))) => {
                let _ = tx.send(Err(error));
                true
            }
            Some((_, Pending::Stream(tx))) => {
                let _ = tx.send(Err(error)).await;
                true
            }
            None => false,
        }
    }

    /// Drop a call without notifying it further.
    pub fn cancel(&self, request_id: u64) {
        if let Some((_, Pending::Unary(tx))) = self.pending.remove(&request_id) {
            let _ = tx.send(Err(TetherError::Cancelled));
        }
    }

    /// Fail every in-flight call with `ConnectionClosed`.
    pub fn cancel_all(&self) {
        let keys: Vec<u64> = self.pending.iter().map(|e| *e.key()).collect();

        let error = TetherError::Transport(TransportError::ConnectionClosed);
        for id in keys {
            match self.pending.remove(&id) {
                Some((_, Pending::Unary(tx))) => {
                    let _ = tx.send(Err(error.clone()));
                }
                Some((_, Pending::Stream(tx))) => {
                    let _ = tx.try_send(Err(error.clone()));
                }
                None => {}
            }
        }
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn stream_sender(&self, id: u64) -> Option<InboundSender> {
        match self.pending.get(&id)?.value() {
            Pending::Stream(tx) => Some(tx.clone()),
            Pending::Unary(_) => None,
        }
    }
}

impl Default for Multiplexer {
    fn default() -> Self {
        Self::new()
    }
}
