//! JSON-RPC method dispatcher (component H).
//!
//! Owns three sinks — inbound parser, handler invocation, outbound writer —
//! and speaks the bespoke streaming/cancellation protocol: each handler
//! pushes JSON-Patch operations into a [`PatchSink`]; if the client
//! advertised streaming support at `initialize`, every operation is also
//! sent eagerly as a `$/partialResult` notification.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use json_patch::PatchOperation;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, CoreResult};
use crate::patch;
use crate::transport::MessageTransport;

/// A JSON-RPC request id: either a number or a string, per the spec.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

/// Channel a handler pushes JSON-Patch operations into as it produces
/// partial results. Dropping the sink (letting the handler's future
/// complete) signals the dispatcher that the result is final.
#[derive(Clone)]
pub struct PatchSink {
    tx: mpsc::UnboundedSender<PatchOperation>,
}

impl PatchSink {
    /// Emits one operation. A send failure means the dispatcher has stopped
    /// listening (the request was cancelled); silently dropped, matching
    /// "no further `$/partialResult` emissions" after cancellation.
    pub fn emit(&self, op: PatchOperation) {
        let _ = self.tx.send(op);
    }
}

/// One JSON-RPC method handler. Methods beginning with `_` are never
/// routed to a handler (checked by the dispatcher before lookup).
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, params: Value, sink: PatchSink, cancel: CancellationToken) -> CoreResult<()>;
}

#[derive(Debug, Deserialize)]
struct InboundMessage {
    #[serde(default)]
    id: Option<RequestId>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct OutboundResponse<'a> {
    jsonrpc: &'static str,
    id: &'a RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ResponseError>,
}

#[derive(Debug, Serialize)]
struct ResponseError {
    code: i64,
    message: String,
}

#[derive(Debug, Serialize)]
struct OutboundNotification<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: PartialResultParams<'a>,
}

#[derive(Debug, Serialize)]
struct PartialResultParams<'a> {
    id: &'a RequestId,
    patch: [PatchOperation; 1],
}

/// Routes inbound JSON-RPC messages to registered [`Handler`]s and writes
/// responses/partial-result notifications back out.
pub struct Dispatcher {
    handlers: FxHashMap<String, Arc<dyn Handler>>,
    streaming: AtomicBool,
    initialized: AtomicBool,
    shutdown_requested: AtomicBool,
    in_flight: Mutex<HashMap<RequestId, CancellationToken>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher {
            handlers: FxHashMap::default(),
            streaming: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            shutdown_requested: AtomicBool::new(false),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&mut self, method: impl Into<String>, handler: Arc<dyn Handler>) {
        self.handlers.insert(method.into(), handler);
    }

    /// Enables `$/partialResult` emission; called once the `initialize`
    /// handler observes the client advertised streaming support.
    pub fn enable_streaming(&self) {
        self.streaming.store(true, Ordering::SeqCst);
    }

    pub fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::SeqCst);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Reads and dispatches messages from `transport` until EOF or an
    /// `exit` notification. Each request runs as its own task so that
    /// completion order across requests is unspecified, matching §5.
    pub async fn run(self: &Arc<Self>, transport: &mut dyn MessageTransport) -> CoreResult<()> {
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        loop {
            tokio::select! {
                incoming = transport.read_message() => {
                    match incoming? {
                        None => break,
                        Some(bytes) => {
                            if self.handle_bytes(bytes, outbound_tx.clone()).await {
                                break;
                            }
                        }
                    }
                }
                Some(out) = outbound_rx.recv() => {
                    transport.write_message(&out).await?;
                }
            }
        }
        if self.initialized.load(Ordering::SeqCst) && !self.shutdown_requested.load(Ordering::SeqCst) {
            self.run_shutdown_on_exit().await;
        }
        while let Ok(out) = outbound_rx.try_recv() {
            transport.write_message(&out).await?;
        }
        let mut in_flight = self.in_flight.lock().await;
        for (_, token) in in_flight.drain() {
            token.cancel();
        }
        Ok(())
    }

    /// Returns `true` if the caller should stop the read loop (`exit`).
    async fn handle_bytes(self: &Arc<Self>, bytes: Vec<u8>, outbound: mpsc::UnboundedSender<Vec<u8>>) -> bool {
        let msg: InboundMessage = match serde_json::from_slice(&bytes) {
            Ok(m) => m,
            Err(err) => {
                tracing::warn!(error = %err, "dropping malformed JSON-RPC message body");
                return false;
            }
        };
        let Some(method) = msg.method else {
            // A message with no method is a response; this server never
            // issues outbound requests, so responses are ignored.
            return false;
        };

        if method == "exit" {
            return true;
        }
        if method == "$/cancelRequest" {
            if let Some(id) = msg.params.get("id").and_then(|v| serde_json::from_value::<RequestId>(v.clone()).ok()) {
                if let Some(token) = self.in_flight.lock().await.get(&id) {
                    token.cancel();
                }
            }
            return false;
        }

        match msg.id {
            None => {
                if let Some(handler) = self.handlers.get(&method).cloned() {
                    let sink_cancel = CancellationToken::new();
                    let (tx, mut rx) = mpsc::unbounded_channel();
                    let sink = PatchSink { tx };
                    tokio::spawn(async move {
                        while rx.recv().await.is_some() {}
                    });
                    if let Err(err) = handler.handle(msg.params, sink, sink_cancel).await {
                        tracing::warn!(%method, error = %err, "notification handler failed");
                    }
                }
                false
            }
            Some(id) => {
                self.spawn_request(id, method, msg.params, outbound).await;
                false
            }
        }
    }

    async fn spawn_request(self: &Arc<Self>, id: RequestId, method: String, params: Value, outbound: mpsc::UnboundedSender<Vec<u8>>) {
        if method.starts_with('_') || !self.handlers.contains_key(&method) {
            send_error(&outbound, &id, CoreError::MethodNotFound(method));
            return;
        }
        if !self.initialized.load(Ordering::SeqCst) && method != "initialize" {
            send_error(&outbound, &id, CoreError::NotInitialized);
            return;
        }
        if method == "initialize" && self.initialized.swap(true, Ordering::SeqCst) {
            send_error(&outbound, &id, CoreError::AlreadyInitialized);
            return;
        }
        if method == "shutdown" {
            self.shutdown_requested.store(true, Ordering::SeqCst);
        }

        let handler = self.handlers.get(&method).cloned().expect("checked above");
        let cancel = CancellationToken::new();
        self.in_flight.lock().await.insert(id.clone(), cancel.clone());

        let dispatcher = self.clone();
        let streaming = self.streaming.load(Ordering::SeqCst);
        let method_for_task = method;
        tokio::spawn(async move {
            let (tx, mut rx) = mpsc::unbounded_channel::<PatchOperation>();
            let sink = PatchSink { tx };
            let id_for_forward = id.clone();
            let outbound_for_forward = outbound.clone();
            let forward = tokio::spawn(async move {
                let mut result = Value::Null;
                while let Some(op) = rx.recv().await {
                    if streaming {
                        send_partial_result(&outbound_for_forward, &id_for_forward, &op);
                    }
                    if let Err(err) = patch::apply_all(&mut result, std::slice::from_ref(&op)) {
                        tracing::error!(error = %err, "handler produced an invalid patch operation");
                        return Err(CoreError::PatchFailed(err.to_string()));
                    }
                }
                Ok(result)
            });

            tokio::select! {
                outcome = handler.handle(params, sink, cancel.child_token()) => {
                    let forwarded = forward.await.unwrap_or(Ok(Value::Null));
                    match outcome.and_then(|()| forwarded) {
                        Ok(result) => {
                            // The `initialize` handler advertises streaming support by
                            // setting this field on its result; once observed, every
                            // later request's patches are also mirrored as
                            // `$/partialResult` notifications.
                            if method_for_task == "initialize"
                                && result.get("supportsStreaming").and_then(serde_json::Value::as_bool).unwrap_or(false)
                            {
                                dispatcher.enable_streaming();
                            }
                            send_result(&outbound, &id, result)
                        }
                        Err(err) => send_error(&outbound, &id, err),
                    }
                }
                () = cancel.cancelled() => {
                    forward.abort();
                    send_error(&outbound, &id, CoreError::RequestCancelled);
                }
            }
            dispatcher.in_flight.lock().await.remove(&id);
        });
    }

    /// Invokes the registered `shutdown` handler directly, bypassing the
    /// normal request lifecycle (no response is sent; there is no client
    /// left to receive one by the time `exit` has been observed).
    async fn run_shutdown_on_exit(&self) {
        if let Some(handler) = self.handlers.get("shutdown").cloned() {
            let (tx, mut rx) = mpsc::unbounded_channel::<PatchOperation>();
            let sink = PatchSink { tx };
            tokio::spawn(async move {
                while rx.recv().await.is_some() {}
            });
            if let Err(err) = handler.handle(Value::Null, sink, CancellationToken::new()).await {
                tracing::warn!(error = %err, "shutdown handler failed during exit teardown");
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Dispatcher::new()
    }
}

fn encode(value: &impl Serialize) -> Vec<u8> {
    serde_json::to_vec(value).expect("response types are always serializable")
}

fn send_result(outbound: &mpsc::UnboundedSender<Vec<u8>>, id: &RequestId, result: Value) {
    let response = OutboundResponse {
        jsonrpc: "2.0",
        id,
        result: Some(result),
        error: None,
    };
    let _ = outbound.send(encode(&response));
}

fn send_error(outbound: &mpsc::UnboundedSender<Vec<u8>>, id: &RequestId, err: CoreError) {
    let response = OutboundResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(ResponseError {
            code: err.rpc_code(),
            message: err.to_string(),
        }),
    };
    let _ = outbound.send(encode(&response));
}

fn send_partial_result(outbound: &mpsc::UnboundedSender<Vec<u8>>, id: &RequestId, op: &PatchOperation) {
    let notification = OutboundNotification {
        jsonrpc: "2.0",
        method: "$/partialResult",
        params: PartialResultParams {
            id,
            patch: [op.clone()],
        },
    };
    let _ = outbound.send(encode(&notification));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FramedTransport;
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    struct EchoHandler;

    #[async_trait]
    impl Handler for EchoHandler {
        async fn handle(&self, params: Value, sink: PatchSink, _cancel: CancellationToken) -> CoreResult<()> {
            sink.emit(patch::replace_root(json!([])));
            sink.emit(patch::append(params));
            Ok(())
        }
    }

    struct HangingHandler;

    #[async_trait]
    impl Handler for HangingHandler {
        async fn handle(&self, _params: Value, _sink: PatchSink, cancel: CancellationToken) -> CoreResult<()> {
            cancel.cancelled().await;
            Err(CoreError::Cancelled)
        }
    }

    fn frame(body: &str) -> Vec<u8> {
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        [header.into_bytes(), body.as_bytes().to_vec()].concat()
    }

    #[tokio::test]
    async fn initialize_then_request_round_trips_a_result() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("initialize", Arc::new(EchoHandler));
        dispatcher.register("echo", Arc::new(EchoHandler));
        let dispatcher = Arc::new(dispatcher);

        let (client, server) = tokio::io::duplex(8192);
        let (client_read, mut client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);
        let mut server_transport = FramedTransport::new(server_read, server_write);

        client_write
            .write_all(&frame(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":1}"#))
            .await
            .unwrap();
        client_write
            .write_all(&frame(r#"{"jsonrpc":"2.0","id":2,"method":"echo","params":42}"#))
            .await
            .unwrap();

        let run = tokio::spawn(async move { dispatcher.run(&mut server_transport).await });

        let mut client_transport = FramedTransport::new(client_read, client_write);
        let first = client_transport.read_message().await.unwrap().unwrap();
        let second = client_transport.read_message().await.unwrap().unwrap();
        let first: Value = serde_json::from_slice(&first).unwrap();
        let second: Value = serde_json::from_slice(&second).unwrap();
        assert_eq!(first["result"], json!([1]));
        assert_eq!(second["result"], json!([42]));

        drop(client_transport);
        let _ = tokio::time::timeout(Duration::from_millis(200), run).await;
    }

    #[tokio::test]
    async fn unregistered_method_is_rejected_before_the_initialized_gate() {
        // `echo` is registered but `initialize` never runs, so this exercises
        // the `NotInitialized` path. `nope` has no handler at all, so it is
        // rejected as `MethodNotFound` regardless of initialization state.
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("echo", Arc::new(EchoHandler));
        let dispatcher = Arc::new(dispatcher);

        let (client, server) = tokio::io::duplex(8192);
        let (client_read, mut client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);
        let mut server_transport = FramedTransport::new(server_read, server_write);

        client_write
            .write_all(&frame(r#"{"jsonrpc":"2.0","id":1,"method":"echo","params":null}"#))
            .await
            .unwrap();
        client_write
            .write_all(&frame(r#"{"jsonrpc":"2.0","id":2,"method":"nope","params":null}"#))
            .await
            .unwrap();

        let run = tokio::spawn(async move { dispatcher.run(&mut server_transport).await });
        let mut client_transport = FramedTransport::new(client_read, client_write);
        let first = client_transport.read_message().await.unwrap().unwrap();
        let second = client_transport.read_message().await.unwrap().unwrap();
        let first: Value = serde_json::from_slice(&first).unwrap();
        let second: Value = serde_json::from_slice(&second).unwrap();
        assert_eq!(first["error"]["code"], json!(CoreError::NotInitialized.rpc_code()));
        assert_eq!(second["error"]["code"], json!(CoreError::MethodNotFound(String::new()).rpc_code()));

        drop(client_transport);
        let _ = tokio::time::timeout(Duration::from_millis(200), run).await;
    }

    #[tokio::test]
    async fn cancel_request_produces_request_cancelled() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register("initialize", Arc::new(EchoHandler));
        dispatcher.register("hang", Arc::new(HangingHandler));
        let dispatcher = Arc::new(dispatcher);

        let (client, server) = tokio::io::duplex(8192);
        let (client_read, mut client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);
        let mut server_transport = FramedTransport::new(server_read, server_write);

        client_write
            .write_all(&frame(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":null}"#))
            .await
            .unwrap();
        client_write
            .write_all(&frame(r#"{"jsonrpc":"2.0","id":2,"method":"hang","params":null}"#))
            .await
            .unwrap();

        let run = tokio::spawn(async move { dispatcher.run(&mut server_transport).await });
        let mut client_transport = FramedTransport::new(client_read, client_write);
        let init_response = client_transport.read_message().await.unwrap().unwrap();
        let _: Value = serde_json::from_slice(&init_response).unwrap();

        client_transport
            .write_message(br#"{"jsonrpc":"2.0","method":"$/cancelRequest","params":{"id":2}}"#)
            .await
            .unwrap();

        let cancelled = client_transport.read_message().await.unwrap().unwrap();
        let cancelled: Value = serde_json::from_slice(&cancelled).unwrap();
        assert_eq!(cancelled["id"], json!(2));
        assert_eq!(cancelled["error"]["code"], json!(CoreError::RequestCancelled.rpc_code()));

        drop(client_transport);
        let _ = tokio::time::timeout(Duration::from_millis(200), run).await;
    }
}
