use std::sync::Arc;
use std::time::Duration;

use rkyv::{Archive, Deserialize, Serialize};
use tether_client::{Client, ClientOptions};
use tether_core::{status, Context, Sender, Streaming, TetherError};
use tether_discovery::MemorySelector;
use tether_macros::{handler, Schema};
use tether_server::{HandlerOptions, Server, ServerOptions};
use tether_transport::{ListenerRegistry, MemoryTransport, Transport};

#[derive(Archive, Serialize, Deserialize, Schema, Debug, PartialEq)]
pub struct HelloRequest {
    pub name: String,
}

#[derive(Archive, Serialize, Deserialize, Schema, Debug, PartialEq)]
pub struct HelloReply {
    pub message: String,
}

#[derive(Archive, Serialize, Deserialize, Schema, Debug)]
pub struct CountRequest {
    pub upto: u32,
}

pub struct Greeter;

#[handler]
impl Greeter {
    pub async fn say_hello(&self, ctx: Context, req: HelloRequest) -> Result<HelloReply, TetherError> {
        let greeting = ctx.get_metadata("greeting").unwrap_or("hello");
        Ok(HelloReply {
            message: format!("{greeting} {}", req.name),
        })
    }

    pub async fn sum(&self, numbers: Streaming<u32>) -> Result<u64, TetherError> {
        let numbers = numbers.collect().await?;
        Ok(numbers.into_iter().map(u64::from).sum())
    }

    pub async fn count(&self, req: CountRequest, tx: Sender<u32>) -> Result<(), TetherError> {
        for i in 0..req.upto {
            tx.send(&i).await?;
        }
        Ok(())
    }

    pub async fn fail(&self, _ctx: Context, _req: HelloRequest) -> Result<HelloReply, TetherError> {
        Err(TetherError::service(status::NOT_FOUND, "nobody home"))
    }

    pub async fn slow(&self, _ctx: Context, _req: HelloRequest) -> Result<HelloReply, TetherError> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Err(TetherError::Cancelled)
    }
}

struct Harness {
    server: Server,
    client: Client,
    run: tokio::task::JoinHandle<Result<(), TetherError>>,
}

async fn start() -> Harness {
    let listeners = Arc::new(ListenerRegistry::new());
    let transport: Arc<dyn Transport> = Arc::new(MemoryTransport::new(listeners.clone()));

    let server = Server::new(
        ServerOptions::new("greeter")
            .transport(transport.clone())
            .handle_signals(false),
    );
    server.add_handler(Greeter, HandlerOptions::new());
    let running = server.clone();
    let run = tokio::spawn(async move { running.run().await });

    for _ in 0..200 {
        if listeners.contains("greeter:0") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let client = Client::new(
        ClientOptions::new()
            .transport(transport)
            .selector(Arc::new(MemorySelector::new())),
    );
    client.connect("greeter").await.unwrap();

    Harness {
        server,
        client,
        run,
    }
}

impl Harness {
    async fn shutdown(self) {
        self.client.close().await;
        self.server.stop().await;
        self.run.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn test_unary_call() {
    let h = start().await;

    let reply: HelloReply = h
        .client
        .call(
            Context::new().with_metadata("greeting", "hi"),
            "Greeter.SayHello",
            &HelloRequest {
                name: "ada".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(reply.message, "hi ada");

    h.shutdown().await;
}

#[tokio::test]
async fn test_client_stream() {
    let h = start().await;

    let mut stream = h.client.stream_in(Context::new(), "Greeter.Sum").await.unwrap();
    for n in [1u32, 2, 3, 4] {
        stream.send_item(&n).await.unwrap();
    }
    let total: u64 = Client::finish(stream).await.unwrap();
    assert_eq!(total, 10);

    h.shutdown().await;
}

#[tokio::test]
async fn test_server_stream() {
    let h = start().await;

    let stream: Streaming<u32> = h
        .client
        .stream_out(Context::new(), "Greeter.Count", &CountRequest { upto: 5 })
        .await
        .unwrap();
    assert_eq!(stream.collect().await.unwrap(), vec![0, 1, 2, 3, 4]);

    h.shutdown().await;
}

#[tokio::test]
async fn test_errors_cross_the_wire() {
    let h = start().await;
    let request = HelloRequest {
        name: "ada".into(),
    };

    let err = h
        .client
        .call::<_, HelloReply>(Context::new(), "Greeter.Fail", &request)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TetherError::Service { code: status::NOT_FOUND, ref message } if message == "nobody home"
    ));

    let err = h
        .client
        .call::<_, HelloReply>(Context::new(), "Greeter.Missing", &request)
        .await
        .unwrap_err();
    assert_eq!(err.code(), status::UNIMPLEMENTED);

    let err = h
        .client
        .call::<_, HelloReply>(Context::new(), "Nobody.SayHello", &request)
        .await
        .unwrap_err();
    assert_eq!(err.code(), status::UNIMPLEMENTED);

    h.shutdown().await;
}

#[tokio::test]
async fn test_deadline_propagates_to_server() {
    let h = start().await;

    let err = h
        .client
        .call::<_, HelloReply>(
            Context::with_timeout(Duration::from_millis(100)),
            "Greeter.Slow",
            &HelloRequest {
                name: "ada".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TetherError::Timeout(_) | TetherError::Service { .. }));

    h.shutdown().await;
}

#[tokio::test]
async fn test_ping() {
    let h = start().await;
    let channel = h.client.channel().await.unwrap();
    channel.ping().await.unwrap();
    h.shutdown().await;
}
