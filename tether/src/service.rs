//! A named service: one server plus the components it was built from.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use tether_client::{Client, ClientOptions};
use tether_core::{Env, Handler, TetherError};
use tether_server::{HandlerOptions, Server, ServerOptions};

use crate::builder::Builder;
use crate::config::TetherConfig;

/// Interval between [`Service::port`] checks.
pub const PORT_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Bound on [`Service::port`].
pub const PORT_POLL_TIMEOUT: Duration = Duration::from_secs(120);

/// Teardown callback run by [`Service::close`].
pub type Closer = Box<dyn FnOnce() + Send>;

/// Build version, from `TETHER_VERSION` at compile time.
#[must_use]
pub fn version() -> &'static str {
    option_env!("TETHER_VERSION").unwrap_or("dev")
}

/// Build commit, from `TETHER_COMMIT` at compile time.
#[must_use]
pub fn commit() -> &'static str {
    option_env!("TETHER_COMMIT").unwrap_or("dev")
}

/// A server assembled through a [`Builder`], with clients that share its
/// transport and registry.
#[derive(Clone)]
pub struct Service {
    name: String,
    builder: Builder,
    transport: String,
    registry: String,
    server: Server,
    closers: Arc<Mutex<Vec<Closer>>>,
}

impl Service {
    /// Service `name` with default server options.
    ///
    /// # Errors
    ///
    /// Fails when `registry` cannot be built.
    pub fn new(
        builder: &Builder,
        name: impl Into<String>,
        transport: &str,
        registry: &str,
    ) -> Result<Self, TetherError> {
        let name = name.into();
        Self::with_options(builder, ServerOptions::new(name), transport, registry)
    }

    /// Service from explicit server options. The transport and registry set
    /// on `options` are replaced with the named ones.
    ///
    /// # Errors
    ///
    /// Fails when `registry` cannot be built.
    pub fn with_options(
        builder: &Builder,
        options: ServerOptions,
        transport: &str,
        registry: &str,
    ) -> Result<Self, TetherError> {
        let options = options
            .transport(builder.transport(transport))
            .registry(builder.registry(registry)?);

        Ok(Self {
            name: options.service_name.clone(),
            builder: builder.clone(),
            transport: transport.to_string(),
            registry: registry.to_string(),
            server: Server::new(options),
            closers: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Service configured from `config`.
    ///
    /// # Errors
    ///
    /// Fails when the configured registry cannot be built.
    pub fn from_config(
        builder: &Builder,
        name: impl Into<String>,
        config: &TetherConfig,
    ) -> Result<Self, TetherError> {
        Self::with_options(
            builder,
            config.server_options(name),
            &config.transport,
            &config.registry,
        )
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn add_handler(&self, handler: impl Handler, options: HandlerOptions) {
        self.server.add_handler(handler, options);
    }

    /// Register a callback to run when the service closes.
    pub fn on_close(&self, closer: impl FnOnce() + Send + 'static) {
        self.closers.lock().push(Box::new(closer));
    }

    /// Serve until closed or signalled.
    ///
    /// # Errors
    ///
    /// See [`Server::run`].
    pub async fn run(&self) -> Result<(), TetherError> {
        tracing::info!(
            service = %self.name,
            env = %Env::current(),
            version = version(),
            commit = commit(),
            transport = %self.transport,
            registry = %self.registry,
            "starting service"
        );
        self.server.run().await
    }

    /// Run the close callbacks, then stop the server.
    pub async fn close(&self) {
        let closers: Vec<Closer> = std::mem::take(&mut *self.closers.lock());
        for closer in closers {
            closer();
        }
        self.server.stop().await;
        tracing::info!(service = %self.name, "service closed");
    }

    /// Port the running server bound, waiting for [`Service::run`] to pick it.
    ///
    /// # Errors
    ///
    /// [`TetherError::Timeout`] if no port is chosen within two minutes.
    pub async fn port(&self) -> Result<u16, TetherError> {
        let wait = async {
            loop {
                if let Some(port) = self.server.port() {
                    return port;
                }
                tokio::time::sleep(PORT_POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(PORT_POLL_TIMEOUT, wait)
            .await
            .map_err(|_| TetherError::Timeout(PORT_POLL_TIMEOUT))
    }

    /// Client using this service's transport and registry, resolving through
    /// `selector`. Other settings come from `options`.
    ///
    /// # Errors
    ///
    /// Fails when the selector cannot be built.
    pub fn client(&self, selector: &str, options: ClientOptions) -> Result<Client, TetherError> {
        let components = self
            .builder
            .components(&self.transport, &self.registry, selector)?;
        let options = options.transport(components.transport);
        let options = match components.selector {
            Some(selector) => options.selector(selector),
            None => options,
        };
        Ok(Client::new(options))
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("transport", &self.transport)
            .field("registry", &self.registry)
            .field("closers", &self.closers.lock().len())
            .finish_non_exhaustive()
    }
}
