//! Server side of a tether connection.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use tether_codec::{read_preface, resolve, Codec, CodecTable, EnvelopeCodec};
use tether_core::{
    Context, EndpointKind, Envelope, Inbound, InboundSender, MessageKind, Outbound, Payload,
    TetherError, TransportError,
};
use tether_middleware::{CallInfo, Interceptors};
use tether_transport::Accepted;

use crate::handler::RegisteredHandler;

const OUTBOUND_BUFFER: usize = 256;

/// Time a new connection gets to send its preface.
pub(crate) const PREFACE_TIMEOUT: Duration = Duration::from_secs(10);

/// Body of an incoming call before the handler is resolved.
enum Incoming {
    /// `Request` frame: unary or stream-out.
    Request(Vec<u8>),
    /// `StreamStart` frame: stream-in.
    Stream(Inbound),
}

/// Routes frames from accepted connections to registered handlers.
pub(crate) struct Dispatcher {
    handlers: RwLock<HashMap<String, Arc<RegisteredHandler>>>,
    codecs: CodecTable,
    interceptors: Interceptors,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Dispatcher {
    pub(crate) fn new(codecs: CodecTable, interceptors: Interceptors) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            codecs,
            interceptors,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Register `handler`, replacing any handler with the same name.
    pub(crate) fn insert(&self, handler: RegisteredHandler) -> Option<Arc<RegisteredHandler>> {
        self.handlers
            .write()
            .insert(handler.name().to_string(), Arc::new(handler))
    }

    pub(crate) fn handlers(&self) -> Vec<Arc<RegisteredHandler>> {
        self.handlers.read().values().cloned().collect()
    }

    fn handler(&self, name: &str) -> Option<Arc<RegisteredHandler>> {
        self.handlers.read().get(name).cloned()
    }

    pub(crate) fn new_codec(&self, content_type: &str) -> Result<Arc<dyn Codec>, TetherError> {
        Ok(resolve(&self.codecs, content_type)?)
    }

    pub(crate) fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub(crate) fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Serve one accepted connection until the peer leaves or the server
    /// shuts down. Calls already running finish on their own tasks.
    ///
    /// Setup (handshake and preface) is abandoned on shutdown or after
    /// `preface_timeout`.
    pub(crate) async fn serve_connection(
        self: Arc<Self>,
        accepted: Accepted,
        preface_timeout: Duration,
    ) {
        let peer = accepted.peer().to_string();
        let setup = async {
            let mut io = accepted.establish().await?;
            let content_type = tokio::time::timeout(preface_timeout, read_preface(&mut io))
                .await
                .map_err(|_| TetherError::Timeout(preface_timeout))??;
            Ok::<_, TetherError>((io, content_type))
        };
        let (io, content_type) = tokio::select! {
            () = self.shutdown.cancelled() => {
                tracing::debug!(%peer, "shutdown before connection setup finished");
                return;
            }
            setup = setup => match setup {
                Ok(established) => established,
                Err(e) => {
                    tracing::debug!(%peer, error = %e, "connection setup failed");
                    return;
                }
            },
        };
        let codec = match self.new_codec(&content_type) {
            Ok(codec) => codec,
            Err(e) => {
                tracing::warn!(%peer, %content_type, error = %e, "closing connection");
                return;
            }
        };
        tracing::debug!(%peer, %content_type, "connection established");

        let (mut sink, mut stream) = Framed::new(io, EnvelopeCodec::new(codec)).split();
        let (tx, mut rx) = mpsc::channel::<Envelope>(OUTBOUND_BUFFER);

        let writer_peer = peer.clone();
        self.tracker.spawn(async move {
            while let Some(envelope) = rx.recv().await {
                if let Err(e) = sink.send(envelope).await {
                    tracing::debug!(peer = %writer_peer, error = %e, "connection write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let mut streams: HashMap<u64, InboundSender> = HashMap::new();
        loop {
            let frame = tokio::select! {
                () = self.shutdown.cancelled() => break,
                frame = stream.next() => frame,
            };
            let envelope = match frame {
                Some(Ok(envelope)) => envelope,
                Some(Err(e)) => {
                    tracing::warn!(%peer, error = %e, "connection read failed");
                    break;
                }
                None => break,
            };

            let id = envelope.id;
            match envelope.kind {
                MessageKind::Request => {
                    let Envelope {
                        service,
                        method,
                        headers,
                        payload,
                        ..
                    } = envelope;
                    let dispatcher = self.clone();
                    let tx = tx.clone();
                    self.tracker.spawn(async move {
                        dispatcher
                            .handle_call(id, service, method, headers, Incoming::Request(payload), tx)
                            .await;
                    });
                }
                MessageKind::StreamStart => {
                    let (sender, inbound) = Inbound::channel();
                    streams.insert(id, sender);
                    let Envelope {
                        service,
                        method,
                        headers,
                        ..
                    } = envelope;
                    let dispatcher = self.clone();
                    let tx = tx.clone();
                    self.tracker.spawn(async move {
                        dispatcher
                            .handle_call(id, service, method, headers, Incoming::Stream(inbound), tx)
                            .await;
                    });
                }
                MessageKind::StreamData => match streams.get(&id) {
                    Some(sender) => {
                        if sender.send(Ok(envelope.payload)).await.is_err() {
                            streams.remove(&id);
                        }
                    }
                    None => tracing::debug!(%peer, request_id = id, "item for unknown stream"),
                },
                MessageKind::StreamEnd => {
                    streams.remove(&id);
                }
                MessageKind::Error => {
                    if let Some(sender) = streams.remove(&id) {
                        let _ = sender.send(Err(envelope.to_error())).await;
                    }
                }
                MessageKind::Ping => {
                    if tx.send(Envelope::pong(id)).await.is_err() {
                        break;
                    }
                }
                MessageKind::Response | MessageKind::Pong => {
                    tracing::warn!(%peer, request_id = id, kind = ?envelope.kind, "unexpected frame from client");
                }
            }
        }

        for (_, sender) in streams {
            let _ = sender.try_send(Err(TransportError::ConnectionClosed.into()));
        }
        tracing::debug!(%peer, "connection closed");
    }

    async fn handle_call(
        &self,
        id: u64,
        service: String,
        method: String,
        headers: HashMap<String, String>,
        incoming: Incoming,
        tx: mpsc::Sender<Envelope>,
    ) {
        let Some(handler) = self.handler(&service) else {
            let _ = tx.send(error_envelope(id, &TetherError::ServiceNotFound(service))).await;
            return;
        };
        let Some(kind) = handler.kind(&method) else {
            let error = TetherError::MethodNotFound(format!("{service}.{method}"));
            let _ = tx.send(error_envelope(id, &error)).await;
            return;
        };

        let payload = match (kind, incoming) {
            (EndpointKind::Unary, Incoming::Request(body)) => Payload::Unary(body),
            (EndpointKind::StreamIn, Incoming::Stream(inbound)) => Payload::StreamIn(inbound),
            (EndpointKind::StreamOut, Incoming::Request(body)) => {
                let (outbound, items) = Outbound::channel();
                return self
                    .handle_stream_out(id, &handler, &method, headers, body, outbound, items, tx)
                    .await;
            }
            _ => {
                let error = TetherError::InvalidRequest(format!(
                    "{service}.{method} called with the wrong streaming mode"
                ));
                let _ = tx.send(error_envelope(id, &error)).await;
                return;
            }
        };

        let call = CallInfo::new(&service, &method, kind);
        let chain = self.interceptors.for_kind(kind);
        let mut ctx = Context::from_headers(headers);

        let result: Result<Vec<u8>, TetherError> = async {
            chain.intercept_request(&mut ctx, &call)?;
            let mut body =
                with_deadline(&ctx, handler.handler().call(&method, ctx.clone(), payload)).await?;
            chain.intercept_response(&ctx, &call, &mut body)?;
            Ok(body)
        }
        .await;

        let reply = match result {
            Ok(body) => Envelope::response(id, body),
            Err(e) => {
                chain.on_error(&ctx, &call, &e);
                error_envelope(id, &e)
            }
        };
        let _ = tx.send(reply).await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_stream_out(
        &self,
        id: u64,
        handler: &RegisteredHandler,
        method: &str,
        headers: HashMap<String, String>,
        body: Vec<u8>,
        outbound: Outbound,
        mut items: mpsc::Receiver<Vec<u8>>,
        tx: mpsc::Sender<Envelope>,
    ) {
        let call = CallInfo::new(handler.name(), method, EndpointKind::StreamOut);
        let chain = self.interceptors.for_kind(EndpointKind::StreamOut);
        let mut ctx = Context::from_headers(headers);

        if let Err(e) = chain.intercept_request(&mut ctx, &call) {
            let e = TetherError::from(e);
            chain.on_error(&ctx, &call, &e);
            let _ = tx.send(error_envelope(id, &e)).await;
            return;
        }

        let run = with_deadline(
            &ctx,
            handler
                .handler()
                .call(method, ctx.clone(), Payload::StreamOut(body, outbound)),
        );
        let forward = async {
            while let Some(mut item) = items.recv().await {
                chain.intercept_response(&ctx, &call, &mut item)?;
                if tx.send(Envelope::stream_data(id, item)).await.is_err() {
                    return Err(TetherError::Transport(TransportError::ConnectionClosed));
                }
            }
            Ok::<(), TetherError>(())
        };

        // The handler future owns the outbound sender, so `forward` drains
        // once the handler returns.
        let (result, forwarded) = tokio::join!(run, forward);
        let reply = match result.and(forwarded) {
            Ok(_) => Envelope::stream_end(id),
            Err(e) => {
                chain.on_error(&ctx, &call, &e);
                error_envelope(id, &e)
            }
        };
        let _ = tx.send(reply).await;
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort_unstable();
        f.debug_struct("Dispatcher")
            .field("handlers", &names)
            .field("in_flight", &self.tracker.len())
            .finish_non_exhaustive()
    }
}

async fn with_deadline<F>(ctx: &Context, call: F) -> Result<Vec<u8>, TetherError>
where
    F: Future<Output = Result<Vec<u8>, TetherError>>,
{
    if ctx.deadline.is_none() {
        return call.await;
    }
    let remaining = ctx.remaining().unwrap_or(Duration::ZERO);
    tokio::time::timeout(remaining, call)
        .await
        .map_err(|_| TetherError::Timeout(remaining))?
}

/// Error frame for `error`. Service errors keep their code and bare message.
fn error_envelope(id: u64, error: &TetherError) -> Envelope {
    match error {
        TetherError::Service { code, message } => Envelope::error(id, *code, message.clone()),
        other => Envelope::error(id, other.code(), other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::status;

    #[test]
    fn test_error_envelope_keeps_service_message() {
        let envelope = error_envelope(7, &TetherError::service(status::NOT_FOUND, "no such user"));
        assert_eq!(envelope.kind, MessageKind::Error);
        assert_eq!(envelope.code, status::NOT_FOUND);
        assert_eq!(envelope.payload, b"no such user");

        let envelope = error_envelope(8, &TetherError::MethodNotFound("Greeter.Bye".into()));
        assert_eq!(envelope.code, status::UNIMPLEMENTED);
        assert!(String::from_utf8(envelope.payload).unwrap().contains("Greeter.Bye"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_the_call() {
        let ctx = Context::with_timeout(Duration::from_millis(50));
        let result = with_deadline(&ctx, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        })
        .await;
        assert!(matches!(result, Err(TetherError::Timeout(_))));

        let ctx = Context::new();
        let result = with_deadline(&ctx, async { Ok(vec![1]) }).await;
        assert_eq!(result.unwrap(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_connection_times_out() {
        let dispatcher = Arc::new(Dispatcher::new(CodecTable::new(), Interceptors::default()));
        let (_client, server) = tokio::io::duplex(64);

        let started = tokio::time::Instant::now();
        dispatcher
            .serve_connection(Accepted::ready(server, "test"), Duration::from_millis(100))
            .await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_shutdown_abandons_connection_setup() {
        let dispatcher = Arc::new(Dispatcher::new(CodecTable::new(), Interceptors::default()));
        let (_client, server) = tokio::io::duplex(64);

        let serving = tokio::spawn(
            dispatcher
                .clone()
                .serve_connection(Accepted::ready(server, "test"), Duration::from_secs(60)),
        );
        dispatcher.shutdown().cancel();
        tokio::time::timeout(Duration::from_secs(1), serving)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_unknown_content_type() {
        let dispatcher = Dispatcher::new(CodecTable::new(), Interceptors::default());
        assert!(dispatcher.new_codec("application/json").is_ok());
        assert!(matches!(
            dispatcher.new_codec("text/xml"),
            Err(TetherError::Config(_))
        ));
    }
}
