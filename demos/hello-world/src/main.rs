//! Hello World example for tether.
//!
//! A greeter service and a client in one process, wired through the
//! memory transport and the memory registry:
//! - the service publishes its endpoints to the registry
//! - the client resolves the service through a registry-backed selector
//! - unary, client-streaming and server-streaming calls

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tether::prelude::*;
use tether::tether_core::status;
use tether::{Registry, ServerOptions};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum GreetError {
    #[error("name cannot be empty")]
    EmptyName,
    #[error("name too long: {0} characters (max 100)")]
    NameTooLong(usize),
}

impl From<GreetError> for TetherError {
    fn from(err: GreetError) -> Self {
        TetherError::service(status::INVALID_ARGUMENT, err.to_string())
    }
}

#[derive(Debug, Archive, Serialize, Deserialize, Schema)]
pub struct GreetRequest {
    pub name: String,
}

#[derive(Debug, Archive, Serialize, Deserialize, Schema)]
pub struct GreetReply {
    pub message: String,
    pub count: u64,
}

#[derive(Debug, Archive, Serialize, Deserialize, Schema)]
pub struct RepeatRequest {
    pub name: String,
    pub times: u32,
}

#[derive(Default)]
pub struct Greeter {
    count: Arc<AtomicU64>,
}

#[handler]
impl Greeter {
    pub async fn greet(&self, _ctx: Context, req: GreetRequest) -> Result<GreetReply, GreetError> {
        if req.name.is_empty() {
            return Err(GreetError::EmptyName);
        }
        if req.name.len() > 100 {
            return Err(GreetError::NameTooLong(req.name.len()));
        }

        let count = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(GreetReply {
            message: format!("Hello, {}!", req.name),
            count,
        })
    }

    pub async fn greet_all(&self, names: Streaming<String>) -> Result<String, TetherError> {
        let names = names.collect().await?;
        self.count.fetch_add(names.len() as u64, Ordering::Relaxed);
        Ok(format!("Hello, {}!", names.join(" and ")))
    }

    pub async fn repeat(&self, req: RepeatRequest, tx: Sender<String>) -> Result<(), TetherError> {
        for i in 1..=req.times {
            tx.send(&format!("Hello #{i}, {}!", req.name)).await?;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tether::logging::init("info,tether=debug")?;

    let builder = Builder::new();
    let service = Service::with_options(
        &builder,
        ServerOptions::new("greeter").version("v1.0.0"),
        "memory",
        "memory",
    )?;
    service.add_handler(Greeter::default(), HandlerOptions::new());
    service.on_close(|| tracing::info!("greeter closed"));

    let running = service.clone();
    let server = tokio::spawn(async move { running.run().await });
    service.port().await?;
    while !builder.listeners().contains("greeter:0") {
        tokio::task::yield_now().await;
    }

    let registry = builder.registry("memory")?;
    for record in registry.get_service("greeter").await? {
        for endpoint in &record.endpoints {
            tracing::info!(service = %record.name, endpoint = %endpoint.name, "published");
        }
    }

    let client = service.client("registry", ClientOptions::new())?;
    client.connect("greeter").await?;

    let reply: GreetReply = client
        .call(
            Context::new(),
            "Greeter.Greet",
            &GreetRequest {
                name: "World".into(),
            },
        )
        .await?;
    tracing::info!(message = %reply.message, count = reply.count, "unary");

    match client
        .call::<_, GreetReply>(Context::new(), "Greeter.Greet", &GreetRequest { name: String::new() })
        .await
    {
        Ok(_) => tracing::warn!("empty name was accepted"),
        Err(e) => tracing::info!(error = %e, code = e.code(), "rejected"),
    }

    let mut names = client.stream_in(Context::new(), "Greeter.GreetAll").await?;
    for name in ["Ada", "Grace", "Barbara"] {
        names.send_item(&name.to_string()).await?;
    }
    let message: String = Client::finish(names).await?;
    tracing::info!(%message, "client stream");

    let mut greetings: Streaming<String> = client
        .stream_out(
            Context::new(),
            "Greeter.Repeat",
            &RepeatRequest {
                name: "tether".into(),
                times: 3,
            },
        )
        .await?;
    while let Some(greeting) = greetings.next().await {
        tracing::info!(greeting = %greeting?, "server stream");
    }

    client.close().await;
    service.close().await;
    server.await??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_greet() {
        let greeter = Greeter::default();
        let reply = greeter
            .greet(Context::new(), GreetRequest { name: "Test".into() })
            .await
            .unwrap();
        assert_eq!(reply.message, "Hello, Test!");
        assert_eq!(reply.count, 1);
    }

    #[tokio::test]
    async fn test_greet_errors() {
        let greeter = Greeter::default();

        let result = greeter
            .greet(Context::new(), GreetRequest { name: String::new() })
            .await;
        assert!(matches!(result, Err(GreetError::EmptyName)));

        let result = greeter
            .greet(Context::new(), GreetRequest { name: "x".repeat(200) })
            .await;
        assert!(matches!(result, Err(GreetError::NameTooLong(200))));
    }

    #[test]
    fn test_error_maps_to_invalid_argument() {
        let err = TetherError::from(GreetError::EmptyName);
        assert_eq!(err.code(), status::INVALID_ARGUMENT);
    }
}
