//! Shared fixtures for the tether benchmarks.

use std::time::Duration;

use tether::prelude::*;
use tether::ServerOptions;

/// Handler that returns its request body.
pub struct Echo;

#[handler]
impl Echo {
    pub async fn echo(&self, _ctx: Context, body: Vec<u8>) -> Result<Vec<u8>, TetherError> {
        Ok(body)
    }

    pub async fn sink(&self, chunks: Streaming<Vec<u8>>) -> Result<u64, TetherError> {
        let chunks = chunks.collect().await?;
        Ok(chunks.iter().map(|c| c.len() as u64).sum())
    }
}

/// A running echo service and a connected client over the memory transport.
pub struct EchoHarness {
    pub service: Service,
    pub client: Client,
}

impl EchoHarness {
    /// Start the service and connect to it.
    ///
    /// # Errors
    ///
    /// Fails if the service cannot be built or the client cannot connect.
    pub async fn start() -> Result<Self, TetherError> {
        let builder = Builder::new();
        let service = Service::with_options(
            &builder,
            ServerOptions::new("echo").handle_signals(false),
            "memory",
            "memory",
        )?;
        service.add_handler(Echo, HandlerOptions::new());

        let running = service.clone();
        tokio::spawn(async move { running.run().await });
        service.port().await?;
        while !builder.listeners().contains("echo:0") {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let client = service.client("memory", ClientOptions::new())?;
        client.connect("echo").await?;
        Ok(Self { service, client })
    }

    pub async fn stop(self) {
        self.client.close().await;
        self.service.close().await;
    }
}
