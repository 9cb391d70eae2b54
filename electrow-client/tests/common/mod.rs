//! Common test utilities for electrow-client integration tests
//!
//! `MockChannel` is a scriptable in-memory [`RpcChannel`] for lifecycle tests
//! under paused time. `MockElectrumServer` speaks line-delimited JSON-RPC
//! over a real TCP socket for the built-in channel.

#![allow(dead_code)]

use async_trait::async_trait;
use electrow_client::{batch_entry_params, ChannelEvent, ChannelEvents, RpcChannel};
use electrow_core::{Error, JsonRpcErrorData, Result};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

/// In-memory channel recording every dispatched call
pub struct MockChannel {
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    batches: Mutex<Vec<(String, Vec<Value>, Option<Value>)>>,
    opens: AtomicUsize,
    failing_opens: AtomicUsize,
    hanging: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
    server_version: Mutex<Value>,
    events: Mutex<Option<mpsc::UnboundedSender<ChannelEvent>>>,
    open: AtomicBool,
}

impl MockChannel {
    pub fn new() -> Arc<Self> {
        Self::with_server_version(json!(["MockElectrum 1.0", "1.4"]))
    }

    /// Channel answering the handshake with `result`
    pub fn with_server_version(result: Value) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            batches: Mutex::new(Vec::new()),
            opens: AtomicUsize::new(0),
            failing_opens: AtomicUsize::new(0),
            hanging: Mutex::new(HashSet::new()),
            failing: Mutex::new(HashSet::new()),
            server_version: Mutex::new(result),
            events: Mutex::new(None),
            open: AtomicBool::new(false),
        })
    }

    /// Every `(method, params)` passed to `call`, in order
    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().unwrap().clone()
    }

    /// Params of every call to `method`
    pub fn calls_to(&self, method: &str) -> Vec<Vec<Value>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls_to(method).len()
    }

    pub fn last_params(&self, method: &str) -> Option<Vec<Value>> {
        self.calls_to(method).pop()
    }

    /// Every `(method, params, extra)` passed to `call_batch`
    pub fn batches(&self) -> Vec<(String, Vec<Value>, Option<Value>)> {
        self.batches.lock().unwrap().clone()
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Make the next `count` opens fail with a transport error
    pub fn fail_next_opens(&self, count: usize) {
        self.failing_opens.store(count, Ordering::SeqCst);
    }

    /// Calls to `method` never complete
    pub fn hang(&self, method: &str) {
        self.hanging.lock().unwrap().insert(method.to_string());
    }

    pub fn hang_pings(&self) {
        self.hang("server.ping");
    }

    /// Calls to `method` are rejected by the "server"
    pub fn fail(&self, method: &str) {
        self.failing.lock().unwrap().insert(method.to_string());
    }

    /// Deliver a push notification on the current connection
    pub fn notify(&self, method: &str, params: Value) -> bool {
        match self.events.lock().unwrap().as_ref() {
            Some(tx) => tx
                .send(ChannelEvent::Notification {
                    method: method.to_string(),
                    params,
                })
                .is_ok(),
            None => false,
        }
    }

    /// The remote side closes the current connection
    pub fn drop_connection(&self) -> bool {
        self.open.store(false, Ordering::SeqCst);
        match self.events.lock().unwrap().take() {
            Some(tx) => tx
                .send(ChannelEvent::Closed {
                    reason: "connection reset by peer".to_string(),
                })
                .is_ok(),
            None => false,
        }
    }

    fn record(&self, method: &str, params: &[Value]) {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params.to_vec()));
    }

    fn is_hanging(&self, method: &str) -> bool {
        self.hanging.lock().unwrap().contains(method)
    }

    fn is_failing(&self, method: &str) -> bool {
        self.failing.lock().unwrap().contains(method)
    }
}

#[async_trait]
impl RpcChannel for MockChannel {
    async fn open(&self) -> Result<ChannelEvents> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_opens.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_opens.store(failing - 1, Ordering::SeqCst);
            return Err(Error::Transport("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.events.lock().unwrap() = Some(tx);
        self.open.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.events.lock().unwrap().take();
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        self.record(method, &params);
        if !self.is_open() {
            return Err(Error::ConnectionClosed);
        }
        if self.is_hanging(method) {
            std::future::pending::<()>().await;
        }
        if self.is_failing(method) {
            return Err(Error::JsonRpc(JsonRpcErrorData::new(
                -32603,
                format!("{} rejected", method),
            )));
        }

        match method {
            "server.version" => Ok(self.server_version.lock().unwrap().clone()),
            "server.ping" => Ok(Value::Null),
            _ => Ok(json!({ "method": method, "params": params })),
        }
    }

    async fn call_batch(
        &self,
        method: &str,
        params: Vec<Value>,
        extra: Option<Value>,
    ) -> Result<Vec<Value>> {
        self.batches
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone(), extra.clone()));
        if !self.is_open() {
            return Err(Error::ConnectionClosed);
        }

        Ok(params
            .into_iter()
            .map(|entry| {
                let params = batch_entry_params(entry, extra.as_ref());
                json!({ "method": method, "params": params })
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
enum ServerCommand {
    Push(String),
    Disconnect,
}

/// Line-delimited Electrum server over real TCP
///
/// Answers `server.version` with `["MockElectrum 1.0", "1.4"]`,
/// `server.ping` with `null`, rejects `blockchain.transaction.broadcast`
/// and echoes `{"method", "params"}` for everything else.
pub struct MockElectrumServer {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    commands: broadcast::Sender<ServerCommand>,
}

impl MockElectrumServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let (commands, _) = broadcast::channel(16);

        let accepted = Arc::clone(&connections);
        let command_tx = commands.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                let mut command_rx = command_tx.subscribe();

                tokio::spawn(async move {
                    let (read_half, mut write_half) = stream.into_split();
                    let mut lines = BufReader::new(read_half).lines();

                    loop {
                        tokio::select! {
                            line = lines.next_line() => match line {
                                Ok(Some(line)) => {
                                    let reply = format!("{}\n", respond_line(&line));
                                    if write_half.write_all(reply.as_bytes()).await.is_err() {
                                        break;
                                    }
                                }
                                _ => break,
                            },
                            command = command_rx.recv() => match command {
                                Ok(ServerCommand::Push(line)) => {
                                    let line = format!("{}\n", line);
                                    if write_half.write_all(line.as_bytes()).await.is_err() {
                                        break;
                                    }
                                }
                                Ok(ServerCommand::Disconnect) | Err(_) => break,
                            },
                        }
                    }
                });
            }
        });

        Self {
            addr,
            connections,
            commands,
        }
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Connections accepted so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Push a notification to every open connection
    pub fn push(&self, method: &str, params: Value) {
        let line = json!({ "jsonrpc": "2.0", "method": method, "params": params }).to_string();
        let _ = self.commands.send(ServerCommand::Push(line));
    }

    /// Drop every open connection; the listener keeps accepting
    pub fn disconnect_all(&self) {
        let _ = self.commands.send(ServerCommand::Disconnect);
    }
}

fn respond_line(line: &str) -> String {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Array(requests)) => {
            Value::Array(requests.iter().map(respond).collect()).to_string()
        }
        Ok(request) => respond(&request).to_string(),
        Err(_) => json!({
            "jsonrpc": "2.0",
            "id": null,
            "error": { "code": -32700, "message": "Parse error" }
        })
        .to_string(),
    }
}

fn respond(request: &Value) -> Value {
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let method = request.get("method").and_then(Value::as_str).unwrap_or_default();
    let params = request.get("params").cloned().unwrap_or_else(|| json!([]));

    match method {
        "server.version" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": ["MockElectrum 1.0", "1.4"]
        }),
        "server.ping" => json!({ "jsonrpc": "2.0", "id": id, "result": null }),
        "blockchain.transaction.broadcast" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": 1, "message": "the transaction was rejected by network rules" }
        }),
        _ => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": { "method": method, "params": params }
        }),
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` passes
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Shared log for listener invocations
pub fn recorder() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

/// Session over `channel`, handshake done with `policy`
pub async fn start_session(
    channel: &Arc<MockChannel>,
    policy: Option<electrow_client::PersistencePolicy>,
) -> electrow_client::ElectrumSession {
    let session = electrow_client::ElectrumSession::new(channel.clone());
    session
        .init_session(
            electrow_client::HandshakeParams::new("electrow-test", "1.4"),
            policy,
        )
        .await
        .unwrap();
    session
}
