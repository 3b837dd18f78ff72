//! Client connectivity: host resolution, bounded dial retry, cached channel.

use std::sync::Arc;

use rkyv::api::high::{HighDeserializer, HighSerializer, HighValidator};
use rkyv::bytecheck::CheckBytes;
use rkyv::rancor;
use rkyv::ser::allocator::ArenaHandle;
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use tether_codec::{resolve, Codec};
use tether_core::{wire, Context, Streaming, TetherError};
use tether_middleware::RetryError;
use tether_transport::{Channel, ClientStream, DialOptions};

use crate::options::ClientOptions;

/// A client bound to one service.
///
/// The first successful [`Client::connect`] caches its channel; later calls
/// return the same channel without dialing again.
pub struct Client {
    id: String,
    options: ClientOptions,
    service_name: parking_lot::Mutex<Option<String>>,
    connection: Mutex<Option<Channel>>,
    /// Cancels the dial of the `connect` in progress, if any.
    dialing: parking_lot::Mutex<Option<CancellationToken>>,
}

impl Client {
    #[must_use]
    pub fn new(options: ClientOptions) -> Self {
        let connection = options.connection.clone();
        Self {
            id: format!("client-{}", uuid::Uuid::new_v4()),
            options,
            service_name: parking_lot::Mutex::new(None),
            connection: Mutex::new(connection),
            dialing: parking_lot::Mutex::new(None),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Service passed to the last [`Client::connect`].
    #[must_use]
    pub fn service_name(&self) -> Option<String> {
        self.service_name.lock().clone()
    }

    /// Connect to `service_name`, or return the cached channel.
    ///
    /// The host is the configured override if any, else the address of the
    /// node the selector picks, else the service name itself. Failed dials
    /// are retried against that same host according to the retry policy.
    ///
    /// # Errors
    ///
    /// Selection failures are returned as-is. A failed dial with retries
    /// disabled returns the dial error; with retries enabled and every
    /// attempt failing, [`TetherError::ConnectionExhausted`].
    pub async fn connect(&self, service_name: &str) -> Result<Channel, TetherError> {
        *self.service_name.lock() = Some(service_name.to_string());
        tracing::info!(client = %self.id, service = service_name, "dialing");

        let mut connection = self.connection.lock().await;
        if let Some(channel) = connection.as_ref() {
            tracing::warn!(
                service = service_name,
                "not creating connection, one already exists"
            );
            return Ok(channel.clone());
        }

        let host = self.resolve_host(service_name).await?;
        let dial = self.dial_options()?;
        let transport = self.options.transport.clone();
        let retry = &self.options.retry;

        tracing::info!(
            service = service_name,
            %host,
            transport = transport.name(),
            unary_interceptors = dial.interceptors.unary.len(),
            "client dials"
        );

        let cancel = CancellationToken::new();
        *self.dialing.lock() = Some(cancel.clone());

        let result = retry
            .run(&cancel, |attempt| {
                let transport = Arc::clone(&transport);
                let dial = dial.clone();
                let host = host.clone();
                async move {
                    if attempt == 1 {
                        tracing::info!(
                            service = service_name,
                            interval = ?retry.delay_for_retry(1),
                            max_attempts = retry.max_retries,
                            "retrying connection"
                        );
                    }
                    let result = transport.dial(&host, dial).await;
                    if let Err(e) = &result {
                        tracing::debug!(attempt, %host, error = %e, "dial failed");
                    }
                    result
                }
            })
            .await;
        self.dialing.lock().take();

        let channel = match result {
            Ok(channel) => channel,
            Err(RetryError::Exhausted { retries, last }) => {
                tracing::warn!(service = service_name, error = %last, "giving up");
                return Err(TetherError::ConnectionExhausted {
                    service: service_name.to_string(),
                    attempts: retries,
                });
            }
            Err(RetryError::Failed(e)) => {
                tracing::debug!(service = service_name, "did not attempt to reconnect");
                return Err(e);
            }
            Err(RetryError::Cancelled) => return Err(TetherError::Cancelled),
        };

        *connection = Some(channel.clone());
        Ok(channel)
    }

    /// Host to dial for `service_name`.
    async fn resolve_host(&self, service_name: &str) -> Result<String, TetherError> {
        if let Some(host) = &self.options.host {
            tracing::info!(%host, "overriding host name");
            return Ok(host.clone());
        }

        let Some(selector) = &self.options.selector else {
            return Ok(service_name.to_string());
        };

        tracing::debug!(selector = selector.name(), "client using selector");
        let next = selector
            .select(service_name, self.options.select_options.clone())
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    selector = selector.name(),
                    service = service_name,
                    error = %e,
                    "selector could not select a node"
                );
            })?;
        let node = next()?;

        tracing::debug!(service = service_name, host = %node.address, "resolved host");
        Ok(node.address)
    }

    fn dial_options(&self) -> Result<DialOptions, TetherError> {
        let mut dial = DialOptions::default()
            .codec(self.new_codec(&self.options.content_type)?)
            .interceptors(self.options.interceptors.clone());
        if let Some(tls) = &self.options.tls {
            dial = dial.tls(tls.clone());
        }
        if let Some(timeout) = self.options.dial_timeout {
            dial = dial.timeout(timeout);
        }
        if let Some(timeout) = self.options.call_timeout {
            dial = dial.call_timeout(timeout);
        }
        Ok(dial)
    }

    /// Codec for `content_type`: per-client overrides first, then the
    /// default table.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown content type.
    pub fn new_codec(&self, content_type: &str) -> Result<Arc<dyn Codec>, TetherError> {
        Ok(resolve(&self.options.codecs, content_type)?)
    }

    /// The cached channel.
    ///
    /// # Errors
    ///
    /// Returns [`TetherError::NoConnection`] before a successful connect.
    pub async fn channel(&self) -> Result<Channel, TetherError> {
        self.connection.lock().await.clone().ok_or_else(|| {
            TetherError::NoConnection(self.service_name().unwrap_or_default())
        })
    }

    /// Typed unary call to `"Handler.Method"`.
    pub async fn call<Req, Resp>(
        &self,
        ctx: Context,
        endpoint: &str,
        request: &Req,
    ) -> Result<Resp, TetherError>
    where
        Req: for<'a> Serialize<HighSerializer<AlignedVec, ArenaHandle<'a>, rancor::Error>>,
        Resp: Archive,
        Resp::Archived: for<'a> CheckBytes<HighValidator<'a, rancor::Error>>
            + Deserialize<Resp, HighDeserializer<rancor::Error>>,
    {
        let (service, method) = split_endpoint(endpoint)?;
        self.channel()
            .await?
            .call(ctx, service, method, request)
            .await
    }

    /// Open a client stream to `"Handler.Method"`.
    pub async fn stream_in(&self, ctx: Context, endpoint: &str) -> Result<ClientStream, TetherError> {
        let (service, method) = split_endpoint(endpoint)?;
        self.channel()
            .await?
            .client_stream(ctx, service, method)
            .await
    }

    /// Open a server stream from `"Handler.Method"`.
    pub async fn stream_out<Req, Resp>(
        &self,
        ctx: Context,
        endpoint: &str,
        request: &Req,
    ) -> Result<Streaming<Resp>, TetherError>
    where
        Req: for<'a> Serialize<HighSerializer<AlignedVec, ArenaHandle<'a>, rancor::Error>>,
        Resp: Archive,
        Resp::Archived: for<'a> CheckBytes<HighValidator<'a, rancor::Error>>
            + Deserialize<Resp, HighDeserializer<rancor::Error>>,
    {
        let (service, method) = split_endpoint(endpoint)?;
        self.channel()
            .await?
            .stream(ctx, service, method, request)
            .await
    }

    /// Finish a client stream and decode the reply.
    pub async fn finish<Resp>(stream: ClientStream) -> Result<Resp, TetherError>
    where
        Resp: Archive,
        Resp::Archived: for<'a> CheckBytes<HighValidator<'a, rancor::Error>>
            + Deserialize<Resp, HighDeserializer<rancor::Error>>,
    {
        let body = stream.finish().await?;
        Ok(wire::from_bytes(&body)?)
    }

    /// Abort any dial in progress and close the cached channel. The client
    /// can connect again afterwards.
    pub async fn close(&self) {
        if let Some(dialing) = self.dialing.lock().take() {
            dialing.cancel();
        }
        if let Some(channel) = self.connection.lock().await.take() {
            channel.close();
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("service_name", &self.service_name())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn split_endpoint(endpoint: &str) -> Result<(&str, &str), TetherError> {
    endpoint
        .split_once('.')
        .filter(|(service, method)| !service.is_empty() && !method.is_empty())
        .ok_or_else(|| {
            TetherError::InvalidRequest(format!(
                "endpoint must look like Handler.Method, got {endpoint:?}"
            ))
        })
}
