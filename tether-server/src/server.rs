//! Server lifecycle: port allocation, registration, serving and teardown.

use std::sync::Arc;

use parking_lot::Mutex;

use tether_codec::Codec;
use tether_core::{
    DeregisterOptions, Endpoint, Env, Handler, Node, Registry, Service, TetherError,
    TransportError,
};
use tether_transport::ListenOptions;

use crate::dispatch::{Dispatcher, PREFACE_TIMEOUT};
use crate::handler::RegisteredHandler;
use crate::net;
use crate::options::{HandlerOptions, ServerOptions};
use crate::signal::shutdown_signal;

/// Node metadata key naming the registry implementation.
pub const REGISTRY_METADATA_KEY: &str = "registry";
/// Node metadata key naming the wire protocol.
pub const PROTOCOL_METADATA_KEY: &str = "protocol";
/// Node metadata key naming the transport implementation.
pub const TRANSPORT_METADATA_KEY: &str = "transport";
pub const PROTOCOL: &str = "tether";

struct Inner {
    id: String,
    options: ServerOptions,
    dispatcher: Arc<Dispatcher>,
    port: Mutex<Option<u16>>,
    published: Mutex<Option<Service>>,
}

/// An RPC server.
///
/// Handlers are added with [`Server::add_handler`]; [`Server::run`] binds,
/// registers and serves until [`Server::stop`] is called or the process
/// receives SIGINT/SIGTERM. Cloning is cheap and clones control the same
/// server.
///
/// ```rust,no_run
/// use tether_server::{Server, ServerOptions};
///
/// # async fn example() -> Result<(), tether_core::TetherError> {
/// let server = Server::new(ServerOptions::new("greeter").port(9000));
/// // server.add_handler(Greeter, HandlerOptions::new());
/// server.run().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

impl Server {
    #[must_use]
    pub fn new(options: ServerOptions) -> Self {
        let dispatcher = Dispatcher::new(options.codecs.clone(), options.interceptors.clone());
        Self {
            inner: Arc::new(Inner {
                id: net::generate_id(&options.service_name),
                dispatcher: Arc::new(dispatcher),
                options,
                port: Mutex::new(None),
                published: Mutex::new(None),
            }),
        }
    }

    /// Instance id used as the registry node id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    #[must_use]
    pub fn options(&self) -> &ServerOptions {
        &self.inner.options
    }

    /// Serve `handler`. A handler registered under an existing name replaces it.
    pub fn add_handler(&self, handler: impl Handler, options: HandlerOptions) {
        self.add_shared_handler(Arc::new(handler), options);
    }

    pub fn add_shared_handler(&self, handler: Arc<dyn Handler>, options: HandlerOptions) {
        let registered = RegisteredHandler::new(handler, options);
        tracing::debug!(
            handler = registered.name(),
            endpoints = registered.endpoints().len(),
            internal = registered.is_internal(),
            "handler added"
        );
        if let Some(previous) = self.inner.dispatcher.insert(registered) {
            tracing::warn!(handler = previous.name(), "handler replaced");
        }
    }

    /// Endpoints published to the registry: every non-internal handler's,
    /// grouped by handler name, in method order within a handler.
    #[must_use]
    pub fn endpoints(&self) -> Vec<Endpoint> {
        let mut handlers = self.inner.dispatcher.handlers();
        handlers.retain(|h| !h.is_internal());
        handlers.sort_by(|a, b| a.name().cmp(b.name()));
        handlers
            .iter()
            .flat_map(|h| h.endpoints().iter().cloned())
            .collect()
    }

    /// Port the server was bound to, once [`Server::run`] has chosen it.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        *self.inner.port.lock()
    }

    /// Record published to the registry, while registered.
    #[must_use]
    pub fn service(&self) -> Option<Service> {
        self.inner.published.lock().clone()
    }

    /// Codec for `content_type`, from the server's overrides or the defaults.
    pub fn new_codec(&self, content_type: &str) -> Result<Arc<dyn Codec>, TetherError> {
        self.inner.dispatcher.new_codec(content_type)
    }

    /// Bind, register and serve until stopped.
    ///
    /// A port of 0 is replaced with a free one unless the transport is
    /// in-process; the chosen port is visible through [`Server::port`] before
    /// the first connection is accepted.
    ///
    /// # Errors
    ///
    /// Fails if no port can be allocated, registration fails, or the
    /// transport cannot listen. Teardown errors are logged, not returned.
    pub async fn run(&self) -> Result<(), TetherError> {
        let options = &self.inner.options;
        let dispatcher = &self.inner.dispatcher;
        if dispatcher.shutdown().is_cancelled() {
            return Err(TetherError::Cancelled);
        }

        let in_process = options.transport.name() == "memory";
        let port = if options.port == 0 && !in_process {
            net::free_port()?
        } else {
            options.port
        };

        let (listen_addr, advertised) = if in_process {
            let host = if net::is_unspecified(&options.host) {
                options.service_name.as_str()
            } else {
                options.host.as_str()
            };
            let addr = net::host_port(host, port);
            (addr.clone(), addr)
        } else {
            (
                net::host_port(&options.host, port),
                net::host_port(&net::extract_host(&options.host), port),
            )
        };
        *self.inner.port.lock() = Some(port);
        tracing::info!(
            service = %options.service_name,
            port,
            transport = options.transport.name(),
            "server port bound"
        );

        if let Some(registry) = &options.registry {
            self.register(registry.as_ref(), advertised).await?;
        }

        let listen_options = ListenOptions {
            tls: options.tls.clone(),
        };
        let listener = match options.transport.listen(&listen_addr, listen_options).await {
            Ok(listener) => listener,
            Err(e) => {
                self.disconnect().await;
                return Err(e.into());
            }
        };
        tracing::info!(service = %options.service_name, addr = %listener.addr(), "serving");

        if options.handle_signals {
            let server = self.clone();
            tokio::spawn(async move { server.watch_signals().await });
        }

        let shutdown = dispatcher.shutdown().clone();
        loop {
            let accepted = tokio::select! {
                () = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok(accepted) => {
                    tracing::debug!(peer = accepted.peer(), "accepted connection");
                    dispatcher
                        .tracker()
                        .spawn(dispatcher.clone().serve_connection(accepted, PREFACE_TIMEOUT));
                }
                Err(TransportError::ListenerClosed(_)) => break,
                Err(e) => tracing::warn!(error = %e, "accept failed"),
            }
        }

        listener.close();
        self.stop().await;
        Ok(())
    }

    /// Deregister and drain in-flight calls. Safe to call more than once and
    /// concurrently with signal-triggered teardown.
    pub async fn stop(&self) {
        self.disconnect().await;

        let dispatcher = &self.inner.dispatcher;
        dispatcher.shutdown().cancel();
        let tracker = dispatcher.tracker();
        tracker.close();

        let drain = self.inner.options.drain_timeout;
        if tokio::time::timeout(drain, tracker.wait()).await.is_err() {
            tracing::warn!(in_flight = tracker.len(), ?drain, "drain timed out");
        }
    }

    async fn register(&self, registry: &dyn Registry, address: String) -> Result<(), TetherError> {
        let options = &self.inner.options;

        let mut node = Node::new(self.inner.id.clone(), address);
        node.metadata.clone_from(&options.metadata);
        node.metadata
            .insert(REGISTRY_METADATA_KEY.to_string(), registry.name().to_string());
        node.metadata
            .insert(PROTOCOL_METADATA_KEY.to_string(), PROTOCOL.to_string());
        node.metadata.insert(
            TRANSPORT_METADATA_KEY.to_string(),
            options.transport.name().to_string(),
        );

        let service = Service {
            name: options.service_name.clone(),
            version: options.version.clone(),
            nodes: vec![node],
            endpoints: self.endpoints(),
        };
        registry.register(&service).await?;

        tracing::info!(
            service = %service.name,
            version = %service.version,
            node = %self.inner.id,
            registry = registry.name(),
            "registered"
        );
        *self.inner.published.lock() = Some(service);
        Ok(())
    }

    /// Withdraw the published record. Taking the record makes this
    /// at-most-once per registration.
    async fn disconnect(&self) {
        let Some(registry) = &self.inner.options.registry else {
            return;
        };
        let Some(service) = self.inner.published.lock().take() else {
            return;
        };

        let timeout = self.inner.options.deregister_timeout;
        let deregister = registry.deregister(&service, DeregisterOptions::with_timeout(timeout));
        match tokio::time::timeout(timeout, deregister).await {
            Ok(Ok(())) => tracing::info!(service = %service.name, node = %self.inner.id, "deregistered"),
            Ok(Err(e)) => tracing::error!(service = %service.name, error = %e, "deregister failed"),
            Err(_) => tracing::error!(service = %service.name, ?timeout, "deregister timed out"),
        }
    }

    async fn watch_signals(&self) {
        let shutdown = self.inner.dispatcher.shutdown().clone();
        tokio::select! {
            () = shutdown.cancelled() => return,
            () = shutdown_signal() => {}
        }

        self.stop().await;
        if Env::current() != Env::Test {
            std::process::exit(0);
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("id", &self.inner.id)
            .field("options", &self.inner.options)
            .field("port", &self.port())
            .field("dispatcher", &self.inner.dispatcher)
            .finish()
    }
}
