use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use ts_ls_core::dispatcher::{Handler, PatchSink};
use ts_ls_core::patch;
use ts_ls_core::CoreResult;

/// Negotiates capabilities and advertises the server's side of the streaming
/// protocol. Streaming is considered supported if the client's params
/// requested it via `capabilities.streaming` — this server has no concept of
/// a standard LSP client capabilities struct, so it reads that one field and
/// nothing else.
pub struct InitializeHandler;

#[async_trait]
impl Handler for InitializeHandler {
    async fn handle(&self, params: Value, sink: PatchSink, _cancel: CancellationToken) -> CoreResult<()> {
        let client_wants_streaming = params
            .get("capabilities")
            .and_then(|c| c.get("streaming"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let result = json!({
            "capabilities": {
                "textDocumentSync": "full",
                "hoverProvider": true,
                "definitionProvider": true,
                "referencesProvider": true,
                "documentSymbolProvider": true,
                "workspaceSymbolProvider": true,
                "completionProvider": { "triggerCharacters": ["."], "resolveProvider": false },
                "signatureHelpProvider": { "triggerCharacters": ["(", ","] },
            },
            "supportsStreaming": client_wants_streaming,
        });
        sink.emit(patch::replace_root(result));
        Ok(())
    }
}

/// A no-op: `shutdown` has nothing of its own to tear down. The dispatcher
/// also invokes this handler directly when `exit` arrives without a prior
/// `shutdown`, so it must succeed unconditionally.
pub struct ShutdownHandler;

#[async_trait]
impl Handler for ShutdownHandler {
    async fn handle(&self, _params: Value, sink: PatchSink, _cancel: CancellationToken) -> CoreResult<()> {
        sink.emit(patch::replace_root(Value::Null));
        Ok(())
    }
}
