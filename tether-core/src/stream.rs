//! Stream handles passed to and returned from streaming calls.

use std::marker::PhantomData;

use rkyv::api::high::{HighDeserializer, HighSerializer, HighValidator};
use rkyv::bytecheck::CheckBytes;
use rkyv::rancor;
use rkyv::ser::allocator::ArenaHandle;
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{TetherError, TransportError};
use crate::wire;

/// Items buffered per stream before the producer waits.
pub const STREAM_BUFFER: usize = 32;

/// Receiving half of a raw byte stream.
#[derive(Debug)]
pub struct Inbound {
    rx: mpsc::Receiver<Result<Vec<u8>, TetherError>>,
}

/// Sending half feeding an [`Inbound`].
pub type InboundSender = mpsc::Sender<Result<Vec<u8>, TetherError>>;

impl Inbound {
    /// Create a connected sender/inbound pair.
    #[must_use]
    pub fn channel() -> (InboundSender, Self) {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        (tx, Self { rx })
    }

    /// Next raw item, `None` once the peer ended the stream.
    pub async fn recv(&mut self) -> Option<Result<Vec<u8>, TetherError>> {
        self.rx.recv().await
    }
}

/// Sending half of a raw byte stream.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<Vec<u8>>,
}

impl Outbound {
    /// Create a connected outbound/receiver pair.
    #[must_use]
    pub fn channel() -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        (Self { tx }, rx)
    }

    /// Send one raw item; fails once the receiving side is gone.
    pub async fn send(&self, item: Vec<u8>) -> Result<(), TetherError> {
        self.tx
            .send(item)
            .await
            .map_err(|_| TetherError::Transport(TransportError::ConnectionClosed))
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Typed view over an [`Inbound`] stream.
#[derive(Debug)]
pub struct Streaming<T> {
    inner: Inbound,
    _item: PhantomData<fn() -> T>,
}

impl<T> Streaming<T>
where
    T: Archive,
    T::Archived: for<'a> CheckBytes<HighValidator<'a, rancor::Error>>
        + Deserialize<T, HighDeserializer<rancor::Error>>,
{
    #[must_use]
    pub fn new(inner: Inbound) -> Self {
        Self {
            inner,
            _item: PhantomData,
        }
    }

    /// Next item, `None` at end of stream.
    pub async fn next(&mut self) -> Option<Result<T, TetherError>> {
        let item = self.inner.recv().await?;
        Some(item.and_then(|bytes| wire::from_bytes(&bytes).map_err(TetherError::from)))
    }

    /// Drain the stream into a vector, stopping at the first error.
    pub async fn collect(mut self) -> Result<Vec<T>, TetherError> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await {
            items.push(item?);
        }
        Ok(items)
    }
}

/// Typed view over an [`Outbound`] stream.
#[derive(Debug, Clone)]
pub struct Sender<T> {
    inner: Outbound,
    _item: PhantomData<fn(T)>,
}

impl<T> Sender<T>
where
    T: for<'a> Serialize<HighSerializer<AlignedVec, ArenaHandle<'a>, rancor::Error>>,
{
    #[must_use]
    pub fn new(inner: Outbound) -> Self {
        Self {
            inner,
            _item: PhantomData,
        }
    }

    pub async fn send(&self, item: &T) -> Result<(), TetherError> {
        self.inner.send(wire::to_bytes(item)?).await
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Archive, Serialize, Deserialize, Debug, PartialEq)]
    struct Tick(u32);

    #[tokio::test]
    async fn test_typed_stream_roundtrip() {
        let (outbound, mut rx) = Outbound::channel();
        let (tx, inbound) = Inbound::channel();

        let sender = Sender::<Tick>::new(outbound);
        sender.send(&Tick(1)).await.unwrap();
        sender.send(&Tick(2)).await.unwrap();
        drop(sender);

        while let Some(bytes) = rx.recv().await {
            tx.send(Ok(bytes)).await.unwrap();
        }
        drop(tx);

        let items = Streaming::<Tick>::new(inbound).collect().await.unwrap();
        assert_eq!(items, vec![Tick(1), Tick(2)]);
    }

    #[tokio::test]
    async fn test_error_item_stops_collect() {
        let (tx, inbound) = Inbound::channel();
        tx.send(Err(TetherError::Cancelled)).await.unwrap();
        drop(tx);

        let result = Streaming::<Tick>::new(inbound).collect().await;
        assert!(matches!(result, Err(TetherError::Cancelled)));
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let (outbound, rx) = Outbound::channel();
        drop(rx);
        assert!(outbound.is_closed());
        assert!(outbound.send(vec![1]).await.is_err());
    }
}
