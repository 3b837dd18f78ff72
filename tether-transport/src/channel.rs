//! Client side of a tether connection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use rkyv::api::high::{HighDeserializer, HighSerializer, HighValidator};
use rkyv::bytecheck::CheckBytes;
use rkyv::rancor;
use rkyv::ser::allocator::ArenaHandle;
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use tether_codec::{write_preface, EnvelopeCodec};
use tether_core::{
    wire, Context, EndpointKind, Envelope, Inbound, Streaming, TetherError, TransportError,
};
use tether_middleware::{CallInfo, InterceptorChain, Interceptors};

use crate::mux::Multiplexer;
use crate::transport::{BoxedIo, DialOptions};

const OUTBOUND_BUFFER: usize = 256;
const PING_TIMEOUT: Duration = Duration::from_secs(5);

struct Shared {
    peer: String,
    content_type: String,
    outbound: mpsc::Sender<Envelope>,
    mux: Arc<Multiplexer>,
    interceptors: Interceptors,
    call_timeout: Option<Duration>,
    closed: CancellationToken,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

/// A multiplexed call channel to one server.
///
/// Cloning is cheap; clones share the connection. The connection closes when
/// [`Channel::close`] is called or the last clone is dropped.
#[derive(Clone)]
pub struct Channel {
    shared: Arc<Shared>,
}

impl Channel {
    /// Send the connection preface over `io` and start the reader and writer
    /// tasks.
    pub async fn establish(
        mut io: BoxedIo,
        peer: impl Into<String>,
        options: DialOptions,
    ) -> Result<Self, TetherError> {
        let content_type = options.codec.content_type().to_string();
        write_preface(&mut io, &content_type).await?;

        let framed = Framed::new(io, EnvelopeCodec::new(options.codec));
        let (mut sink, mut stream) = framed.split();

        let (tx, mut rx) = mpsc::channel::<Envelope>(OUTBOUND_BUFFER);
        let mux = Arc::new(Multiplexer::new());
        let closed = CancellationToken::new();
        let peer = peer.into();

        let writer_closed = closed.clone();
        tokio::spawn(async move {
            loop {
                let envelope = tokio::select! {
                    () = writer_closed.cancelled() => break,
                    envelope = rx.recv() => match envelope {
                        Some(envelope) => envelope,
                        None => break,
                    },
                };
                if let Err(e) = sink.send(envelope).await {
                    tracing::debug!(error = %e, "channel write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader_mux = mux.clone();
        let reader_closed = closed.clone();
        let reader_peer = peer.clone();
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    () = reader_closed.cancelled() => break,
                    frame = stream.next() => frame,
                };
                match frame {
                    Some(Ok(envelope)) => {
                        reader_mux.dispatch(envelope).await;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(peer = %reader_peer, error = %e, "channel read failed");
                        break;
                    }
                    None => break,
                }
            }
            reader_closed.cancel();
            reader_mux.cancel_all();
        });

        Ok(Self {
            shared: Arc::new(Shared {
                peer,
                content_type,
                outbound: tx,
                mux,
                interceptors: options.interceptors,
                call_timeout: options.call_timeout,
                closed,
            }),
        })
    }

    /// Address this channel was dialed at.
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.shared.peer
    }

    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.shared.content_type
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled()
    }

    /// Close the connection. In-flight calls fail with `ConnectionClosed`.
    pub fn close(&self) {
        self.shared.closed.cancel();
        self.shared.mux.cancel_all();
    }

    /// Whether two handles share one connection.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.shared, &b.shared)
    }

    /// Number of calls awaiting a reply.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.shared.mux.pending_count()
    }

    /// Round-trip a ping frame.
    pub async fn ping(&self) -> Result<Duration, TetherError> {
        let started = Instant::now();
        let (id, rx) = self.shared.mux.register_unary();
        self.send(id, Envelope::ping(id)).await?;
        let ctx = Context::with_timeout(self.shared.call_timeout.unwrap_or(PING_TIMEOUT));
        self.await_reply(&ctx, id, rx).await?;
        Ok(started.elapsed())
    }

    /// Unary call with raw request and response bodies.
    pub async fn unary(
        &self,
        ctx: Context,
        service: &str,
        method: &str,
        request: Vec<u8>,
    ) -> Result<Vec<u8>, TetherError> {
        let call = CallInfo::new(service, method, EndpointKind::Unary);
        let chain = self.shared.interceptors.for_kind(EndpointKind::Unary);
        let ctx = self.prepare(ctx, chain, &call)?;

        let result: Result<Vec<u8>, TetherError> = async {
            let (id, rx) = self.shared.mux.register_unary();
            let envelope = Envelope::request(id, service, method, ctx.to_headers(), request);
            self.send(id, envelope).await?;

            let mut body = self.await_reply(&ctx, id, rx).await?;
            chain.intercept_response(&ctx, &call, &mut body)?;
            Ok(body)
        }
        .await;

        if let Err(e) = &result {
            chain.on_error(&ctx, &call, e);
        }
        result
    }

    /// Typed unary call.
    pub async fn call<Req, Resp>(
        &self,
        ctx: Context,
        service: &str,
        method: &str,
        request: &Req,
    ) -> Result<Resp, TetherError>
    where
        Req: for<'a> Serialize<HighSerializer<AlignedVec, ArenaHandle<'a>, rancor::Error>>,
        Resp: Archive,
        Resp::Archived: for<'a> CheckBytes<HighValidator<'a, rancor::Error>>
            + Deserialize<Resp, HighDeserializer<rancor::Error>>,
    {
        let body = self
            .unary(ctx, service, method, wire::to_bytes(request)?)
            .await?;
        Ok(wire::from_bytes(&body)?)
    }

    /// Open a client stream. Items are sent with [`ClientStream::send`]; the
    /// server answers once [`ClientStream::finish`] ends the stream.
    pub async fn client_stream(
        &self,
        ctx: Context,
        service: &str,
        method: &str,
    ) -> Result<ClientStream, TetherError> {
        let call = CallInfo::new(service, method, EndpointKind::StreamIn);
        let chain = self.shared.interceptors.for_kind(EndpointKind::StreamIn);
        let ctx = self.prepare(ctx, chain, &call)?;

        let (id, rx) = self.shared.mux.register_unary();
        let envelope = Envelope::stream_start(id, service, method, ctx.to_headers());
        if let Err(e) = self.send(id, envelope).await {
            chain.on_error(&ctx, &call, &e);
            return Err(e);
        }

        Ok(ClientStream {
            channel: self.clone(),
            id,
            ctx,
            service: service.to_string(),
            method: method.to_string(),
            reply: Some(rx),
        })
    }

    /// Open a server stream: one request, then a stream of raw responses.
    pub async fn server_stream(
        &self,
        ctx: Context,
        service: &str,
        method: &str,
        request: Vec<u8>,
    ) -> Result<Inbound, TetherError> {
        let call = CallInfo::new(service, method, EndpointKind::StreamOut);
        let chain = self.shared.interceptors.for_kind(EndpointKind::StreamOut);
        let ctx = self.prepare(ctx, chain, &call)?;

        let (id, inbound) = self.shared.mux.register_stream();
        let envelope = Envelope::request(id, service, method, ctx.to_headers(), request);
        if let Err(e) = self.send(id, envelope).await {
            chain.on_error(&ctx, &call, &e);
            return Err(e);
        }

        if chain.is_empty() {
            return Ok(inbound);
        }

        let (tx, intercepted) = Inbound::channel();
        let chain = chain.clone();
        let (service, method) = (service.to_string(), method.to_string());
        tokio::spawn(async move {
            let call = CallInfo::new(&service, &method, EndpointKind::StreamOut);
            let mut inbound = inbound;
            while let Some(item) = inbound.recv().await {
                let item = item.and_then(|mut body| {
                    chain.intercept_response(&ctx, &call, &mut body)?;
                    Ok(body)
                });
                if let Err(e) = &item {
                    chain.on_error(&ctx, &call, e);
                }
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
        Ok(intercepted)
    }

    /// Typed server stream.
    pub async fn stream<Req, Resp>(
        &self,
        ctx: Context,
        service: &str,
        method: &str,
        request: &Req,
    ) -> Result<Streaming<Resp>, TetherError>
    where
        Req: for<'a> Serialize<HighSerializer<AlignedVec, ArenaHandle<'a>, rancor::Error>>,
        Resp: Archive,
        Resp::Archived: for<'a> CheckBytes<HighValidator<'a, rancor::Error>>
            + Deserialize<Resp, HighDeserializer<rancor::Error>>,
    {
        let inbound = self
            .server_stream(ctx, service, method, wire::to_bytes(request)?)
            .await?;
        Ok(Streaming::new(inbound))
    }

    fn prepare(
        &self,
        mut ctx: Context,
        chain: &InterceptorChain,
        call: &CallInfo<'_>,
    ) -> Result<Context, TetherError> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed.into());
        }
        if ctx.deadline.is_none() {
            if let Some(timeout) = self.shared.call_timeout {
                ctx = ctx.timeout(timeout);
            }
        }
        if let Err(e) = chain.intercept_request(&mut ctx, call) {
            let e = TetherError::from(e);
            chain.on_error(&ctx, call, &e);
            return Err(e);
        }
        Ok(ctx)
    }

    async fn send(&self, id: u64, envelope: Envelope) -> Result<(), TetherError> {
        if self.shared.outbound.send(envelope).await.is_err() {
            self.shared.mux.cancel(id);
            return Err(TransportError::ConnectionClosed.into());
        }
        Ok(())
    }

    async fn await_reply(
        &self,
        ctx: &Context,
        id: u64,
        rx: oneshot::Receiver<Result<Vec<u8>, TetherError>>,
    ) -> Result<Vec<u8>, TetherError> {
        let reply = match ctx.deadline {
            None => rx.await,
            Some(_) => {
                let remaining = ctx.remaining().unwrap_or(Duration::ZERO);
                match tokio::time::timeout(remaining, rx).await {
                    Ok(reply) => reply,
                    Err(_) => {
                        self.shared.mux.cancel(id);
                        return Err(TetherError::Timeout(remaining));
                    }
                }
            }
        };
        reply.map_err(|_| TetherError::Transport(TransportError::ConnectionClosed))?
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("peer", &self.shared.peer)
            .field("content_type", &self.shared.content_type)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Sending half of a client-streaming call.
pub struct ClientStream {
    channel: Channel,
    id: u64,
    ctx: Context,
    service: String,
    method: String,
    reply: Option<oneshot::Receiver<Result<Vec<u8>, TetherError>>>,
}

impl ClientStream {
    /// Send one raw item.
    pub async fn send(&mut self, item: Vec<u8>) -> Result<(), TetherError> {
        if self.reply.is_none() {
            return Err(TetherError::InvalidRequest("stream already finished".into()));
        }
        self.channel
            .send(self.id, Envelope::stream_data(self.id, item))
            .await
    }

    /// Typed variant of [`ClientStream::send`].
    pub async fn send_item<T>(&mut self, item: &T) -> Result<(), TetherError>
    where
        T: for<'a> Serialize<HighSerializer<AlignedVec, ArenaHandle<'a>, rancor::Error>>,
    {
        self.send(wire::to_bytes(item)?).await
    }

    /// End the stream and wait for the server's reply.
    pub async fn finish(mut self) -> Result<Vec<u8>, TetherError> {
        let Some(rx) = self.reply.take() else {
            return Err(TetherError::InvalidRequest("stream already finished".into()));
        };

        let call = CallInfo::new(&self.service, &self.method, EndpointKind::StreamIn);
        let chain = self.channel.shared.interceptors.for_kind(EndpointKind::StreamIn);

        let result: Result<Vec<u8>, TetherError> = async {
            self.channel
                .send(self.id, Envelope::stream_end(self.id))
                .await?;
            let mut body = self.channel.await_reply(&self.ctx, self.id, rx).await?;
            chain.intercept_response(&self.ctx, &call, &mut body)?;
            Ok(body)
        }
        .await;

        if let Err(e) = &result {
            chain.on_error(&self.ctx, &call, e);
        }
        result
    }
}

impl std::fmt::Debug for ClientStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientStream")
            .field("id", &self.id)
            .field("service", &self.service)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}
