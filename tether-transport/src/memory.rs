//! In-process transport.
//!
//! Listeners live in a [`ListenerRegistry`] owned by the caller and shared by
//! every [`MemoryTransport`] that should see them. `listen(addr)` registers a
//! virtual listener under `addr`; `dial(addr)` looks it up and hands the
//! server half of an in-memory duplex pipe to the listener's accept queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tether_core::TransportError;

use crate::transport::{
    Accepted, BoxedIo, DialOptions, Listener, ListenOptions, Transport, TransportOptions,
};

/// Bytes buffered in each direction of an in-memory connection.
pub const MEMORY_PIPE_BUFFER: usize = 64 * 1024;

/// Connections queued on a listener before dialers wait.
pub const MEMORY_BACKLOG: usize = 128;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
struct ListenerHandle {
    id: u64,
    queue: mpsc::Sender<DuplexStream>,
    closed: CancellationToken,
}

impl ListenerHandle {
    async fn dial(&self, addr: &str) -> Result<DuplexStream, TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::ListenerClosed(addr.to_string()));
        }

        let (client, server) = tokio::io::duplex(MEMORY_PIPE_BUFFER);
        tokio::select! {
            () = self.closed.cancelled() => Err(TransportError::ListenerClosed(addr.to_string())),
            sent = self.queue.send(server) => match sent {
                Ok(()) => Ok(client),
                Err(_) => Err(TransportError::ListenerClosed(addr.to_string())),
            },
        }
    }
}

/// Address-keyed table of in-process listeners.
///
/// All access goes through one lock, so a server registering a listener and
/// a client dialing it never race.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<HashMap<String, ListenerHandle>>,
}

impl ListenerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new listener under `addr`, replacing any previous one.
    pub fn add_listener(self: &Arc<Self>, addr: &str) -> MemoryListener {
        let (tx, rx) = mpsc::channel(MEMORY_BACKLOG);
        let handle = ListenerHandle {
            id: NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed),
            queue: tx,
            closed: CancellationToken::new(),
        };

        tracing::debug!(addr, "adding memory listener");
        let previous = self
            .listeners
            .lock()
            .insert(addr.to_string(), handle.clone());
        if let Some(previous) = previous {
            previous.closed.cancel();
        }

        MemoryListener {
            addr: addr.to_string(),
            id: handle.id,
            incoming: tokio::sync::Mutex::new(rx),
            closed: handle.closed,
            registry: Arc::clone(self),
        }
    }

    fn get_listener(&self, addr: &str) -> Result<ListenerHandle, TransportError> {
        let listeners = self.listeners.lock();
        if let Some(handle) = listeners.get(addr) {
            return Ok(handle.clone());
        }

        let mut available: Vec<String> = listeners.keys().cloned().collect();
        available.sort_unstable();
        tracing::debug!(
            addr,
            count = available.len(),
            ?available,
            "memory listener not available"
        );
        Err(TransportError::ListenerNotFound {
            addr: addr.to_string(),
            available,
        })
    }

    fn remove(&self, addr: &str, id: u64) {
        let mut listeners = self.listeners.lock();
        if listeners.get(addr).is_some_and(|h| h.id == id) {
            listeners.remove(addr);
        }
    }

    /// Registered addresses, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.listeners.lock().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn contains(&self, addr: &str) -> bool {
        self.listeners.lock().contains_key(addr)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.names())
            .finish()
    }
}

/// Server side of an in-process listener.
pub struct MemoryListener {
    addr: String,
    id: u64,
    incoming: tokio::sync::Mutex<mpsc::Receiver<DuplexStream>>,
    closed: CancellationToken,
    registry: Arc<ListenerRegistry>,
}

#[async_trait]
impl Listener for MemoryListener {
    async fn accept(&self) -> Result<Accepted, TransportError> {
        let mut incoming = self.incoming.lock().await;
        tokio::select! {
            () = self.closed.cancelled() => Err(TransportError::ListenerClosed(self.addr.clone())),
            conn = incoming.recv() => match conn {
                Some(conn) => Ok(Accepted::ready(conn, "memory")),
                None => Err(TransportError::ListenerClosed(self.addr.clone())),
            },
        }
    }

    fn addr(&self) -> String {
        self.addr.clone()
    }

    fn close(&self) {
        tracing::debug!(addr = %self.addr, "closing memory listener");
        self.closed.cancel();
        self.registry.remove(&self.addr, self.id);
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        self.close();
    }
}

/// Transport that connects peers inside one process.
///
/// TLS settings are accepted but have no effect: nothing leaves the process.
pub struct MemoryTransport {
    registry: Arc<ListenerRegistry>,
    options: TransportOptions,
}

impl MemoryTransport {
    #[must_use]
    pub fn new(registry: Arc<ListenerRegistry>) -> Self {
        Self {
            registry,
            options: TransportOptions::default(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn init(&mut self, options: TransportOptions) {
        self.options = options;
    }

    fn options(&self) -> &TransportOptions {
        &self.options
    }

    async fn connect(&self, addr: &str, options: &DialOptions) -> Result<BoxedIo, TransportError> {
        let handle = self.registry.get_listener(addr)?;
        let timeout = options.timeout.unwrap_or(self.options.timeout);

        let conn = tokio::time::timeout(timeout, handle.dial(addr))
            .await
            .map_err(|_| TransportError::DialTimeout {
                addr: addr.to_string(),
                timeout,
            })??;
        Ok(Box::new(conn))
    }

    async fn listen(
        &self,
        addr: &str,
        _options: ListenOptions,
    ) -> Result<Box<dyn Listener>, TransportError> {
        Ok(Box::new(self.registry.add_listener(addr)))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_listen_then_dial() {
        let registry = Arc::new(ListenerRegistry::new());
        let transport = MemoryTransport::new(registry.clone());

        let listener = transport
            .listen("greeter:0", ListenOptions::default())
            .await
            .unwrap();
        assert!(registry.contains("greeter:0"));

        let mut client = transport
            .connect("greeter:0", &DialOptions::default())
            .await
            .unwrap();
        let mut server = listener.accept().await.unwrap().establish().await.unwrap();

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn test_dial_unknown_lists_registered() {
        let registry = Arc::new(ListenerRegistry::new());
        let transport = MemoryTransport::new(registry);
        let _a = transport.listen("a:0", ListenOptions::default()).await.unwrap();
        let _b = transport.listen("b:0", ListenOptions::default()).await.unwrap();

        let err = transport
            .connect("missing:0", &DialOptions::default())
            .await
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "memory transport can't find listener missing:0, registered listeners: [a:0, b:0]"
        );
    }

    #[tokio::test]
    async fn test_close_unregisters_and_fails_accept() {
        let registry = Arc::new(ListenerRegistry::new());
        let transport = MemoryTransport::new(registry.clone());
        let listener = transport.listen("svc:0", ListenOptions::default()).await.unwrap();

        listener.close();
        assert!(registry.is_empty());
        assert!(matches!(
            listener.accept().await,
            Err(TransportError::ListenerClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_replaced_listener_keeps_new_entry() {
        let registry = Arc::new(ListenerRegistry::new());
        let old = registry.add_listener("svc:0");
        let _new = registry.add_listener("svc:0");

        drop(old);
        assert!(registry.contains("svc:0"));
    }

    #[tokio::test]
    async fn test_transports_share_registry() {
        let registry = Arc::new(ListenerRegistry::new());
        let server_side = MemoryTransport::new(registry.clone());
        let client_side = MemoryTransport::new(registry);

        let listener = server_side.listen("shared:0", ListenOptions::default()).await.unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.map(|_| ()) });

        client_side
            .connect("shared:0", &DialOptions::default())
            .await
            .unwrap();
        accept.await.unwrap().unwrap();
    }
}
