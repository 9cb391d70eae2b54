//! Line-delimited JSON-RPC channel over TCP or TLS
//!
//! One socket, split in two:
//!
//! - **Writes** happen in the calling task, under a lock on the framed sink,
//!   so a write error is returned to the call that caused it.
//! - **Reads** happen in a spawned reader task that decodes each line and
//!   either completes a pending call, forwards a notification, or logs and
//!   drops anything else.
//!
//! When the reader hits EOF or an error, every pending call fails with
//! `Error::ConnectionClosed` and a `ChannelEvent::Closed` is emitted. A local
//! `close()` stops the reader first, so it emits nothing.

use crate::channel::{batch_entry_params, ChannelEvent, ChannelEvents, RpcChannel};
use crate::config::{Protocol, TransportConfig};
use crate::request::RequestManager;
use async_trait::async_trait;
use electrow_core::{codec, Error, Id, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, Result};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_rustls::rustls::{pki_types::ServerName, ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

type BoxedStream = Box<dyn AsyncStream>;
type LineReader = FramedRead<ReadHalf<BoxedStream>, LinesCodec>;
type LineWriter = FramedWrite<WriteHalf<BoxedStream>, LinesCodec>;
type PendingResponse = oneshot::Receiver<Result<JsonRpcResponse>>;

struct Connection {
    writer: Arc<Mutex<LineWriter>>,
    reader: JoinHandle<()>,
}

/// Channel speaking newline-framed JSON-RPC to an Electrum server
///
/// ```rust,no_run
/// use electrow_client::{Protocol, RpcChannel, TcpChannel, TransportConfig};
///
/// # async fn example() -> electrow_core::Result<()> {
/// let channel = TcpChannel::new(TransportConfig::new("electrum.example.org", 50002).with_protocol(Protocol::Tls));
/// let _events = channel.open().await?;
/// let banner = channel.call("server.banner", vec![]).await?;
/// println!("{}", banner);
/// # Ok(())
/// # }
/// ```
pub struct TcpChannel {
    config: TransportConfig,
    requests: RequestManager,
    connection: Mutex<Option<Connection>>,
    open: Arc<AtomicBool>,
}

impl TcpChannel {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            requests: RequestManager::new(),
            connection: Mutex::new(None),
            open: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    async fn connect_stream(&self) -> Result<BoxedStream> {
        let address = self.config.address();
        let tcp = TcpStream::connect(&address)
            .await
            .map_err(|e| Error::Transport(format!("connect {}: {}", address, e)))?;
        if let Err(e) = tcp.set_nodelay(true) {
            tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
        }

        match self.config.protocol {
            Protocol::Tcp => Ok(Box::new(tcp)),
            Protocol::Tls => {
                let server_name =
                    ServerName::try_from(self.config.host.clone()).map_err(|e| {
                        Error::Tls(format!("invalid server name {}: {}", self.config.host, e))
                    })?;
                let tls = tls_connector()?
                    .connect(server_name, tcp)
                    .await
                    .map_err(|e| Error::Tls(e.to_string()))?;
                Ok(Box::new(tls))
            }
        }
    }

    /// Register `ids`, then write `line`; the receivers resolve in `ids` order
    async fn submit(&self, ids: &[Id], line: String) -> Result<Vec<PendingResponse>> {
        let writer = match self.connection.lock().await.as_ref() {
            Some(connection) if self.is_open() => Arc::clone(&connection.writer),
            _ => return Err(Error::ConnectionClosed),
        };

        let mut receivers = Vec::with_capacity(ids.len());
        for id in ids {
            receivers.push(self.requests.register(id.clone()).await);
        }

        // The reader may have failed everything between the check above and registration
        if !self.is_open() {
            for id in ids {
                self.requests.fail(id, Error::ConnectionClosed).await;
            }
            return Err(Error::ConnectionClosed);
        }

        if let Err(e) = writer.lock().await.send(line).await {
            for id in ids {
                self.requests.fail(id, Error::ConnectionClosed).await;
            }
            return Err(Error::Transport(e.to_string()));
        }

        Ok(receivers)
    }

    async fn await_result(rx: PendingResponse) -> Result<Value> {
        let response = rx.await.map_err(|_| Error::ConnectionClosed)??;
        response.into_result().map_err(Error::JsonRpc)
    }
}

#[async_trait]
impl RpcChannel for TcpChannel {
    #[tracing::instrument(
        skip(self),
        fields(address = %self.config.address(), protocol = ?self.config.protocol)
    )]
    async fn open(&self) -> Result<ChannelEvents> {
        self.close().await;

        let stream = self.connect_stream().await?;
        let (read_half, write_half) = tokio::io::split(stream);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let lines = FramedRead::new(
            read_half,
            LinesCodec::new_with_max_length(self.config.max_line_length),
        );
        self.open.store(true, Ordering::SeqCst);
        let reader = tokio::spawn(read_loop(
            lines,
            self.requests.clone(),
            events_tx,
            Arc::clone(&self.open),
        ));

        *self.connection.lock().await = Some(Connection {
            writer: Arc::new(Mutex::new(FramedWrite::new(write_half, LinesCodec::new()))),
            reader,
        });

        tracing::info!("Channel opened");
        Ok(events_rx)
    }

    async fn close(&self) {
        let connection = self.connection.lock().await.take();
        if let Some(connection) = connection {
            connection.reader.abort();
            let _ = connection.reader.await;
            self.open.store(false, Ordering::SeqCst);
            self.requests.fail_all(Error::ConnectionClosed).await;
            tracing::debug!(address = %self.config.address(), "Channel closed locally");
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let id = self.requests.next_id();
        let line = codec::encode_request(&JsonRpcRequest::new(method, params, id.clone()))?;

        let mut receivers = self.submit(std::slice::from_ref(&id), line).await?;
        let rx = receivers
            .pop()
            .ok_or_else(|| Error::Internal("missing pending response".to_string()))?;
        Self::await_result(rx).await
    }

    async fn call_batch(
        &self,
        method: &str,
        params: Vec<Value>,
        extra: Option<Value>,
    ) -> Result<Vec<Value>> {
        if params.is_empty() {
            return Ok(Vec::new());
        }

        let requests: Vec<JsonRpcRequest> = params
            .into_iter()
            .map(|entry| {
                JsonRpcRequest::new(
                    method,
                    batch_entry_params(entry, extra.as_ref()),
                    self.requests.next_id(),
                )
            })
            .collect();
        let ids: Vec<Id> = requests.iter().map(|request| request.id.clone()).collect();
        let line = codec::encode_batch(&requests)?;

        let receivers = self.submit(&ids, line).await?;
        let mut results = Vec::with_capacity(receivers.len());
        for rx in receivers {
            results.push(Self::await_result(rx).await?);
        }
        Ok(results)
    }
}

async fn read_loop(
    mut lines: LineReader,
    requests: RequestManager,
    events: mpsc::UnboundedSender<ChannelEvent>,
    open: Arc<AtomicBool>,
) {
    let reason = loop {
        match lines.next().await {
            Some(Ok(line)) => {
                if !line.trim().is_empty() {
                    handle_line(&line, &requests, &events).await;
                }
            }
            Some(Err(e)) => break e.to_string(),
            None => break "connection closed by server".to_string(),
        }
    };

    open.store(false, Ordering::SeqCst);
    tracing::warn!(reason = %reason, "Channel lost");
    requests.fail_all(Error::ConnectionClosed).await;
    let _ = events.send(ChannelEvent::Closed { reason });
}

async fn handle_line(
    line: &str,
    requests: &RequestManager,
    events: &mpsc::UnboundedSender<ChannelEvent>,
) {
    match codec::decode(line) {
        Ok(JsonRpcMessage::Response(response)) => requests.complete(response).await,
        Ok(JsonRpcMessage::Batch(items)) => {
            tracing::debug!(batch_size = items.len(), "Batch response received");
            for response in codec::decode_batch_responses(items) {
                requests.complete(response).await;
            }
        }
        Ok(JsonRpcMessage::Notification(notification)) => {
            let _ = events.send(ChannelEvent::Notification {
                method: notification.method,
                params: notification.params,
            });
        }
        Ok(JsonRpcMessage::Request(request)) => {
            tracing::warn!(method = %request.method, "Ignoring request sent by server");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to decode line");
        }
    }
}

fn tls_connector() -> Result<TlsConnector> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder_with_provider(Arc::new(
        tokio_rustls::rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| Error::Tls(e.to_string()))?
    .with_root_certificates(roots)
    .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}
