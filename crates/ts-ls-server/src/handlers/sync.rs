//! `textDocument/didOpen` `didChange` `didClose` `didSave`: mutate the VFS
//! overlay and bump the file's version (§5 — these notifications take
//! effect in arrival order, before any subsequently-started handler runs).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use ts_ls_core::dispatcher::{Handler, PatchSink};
use ts_ls_core::uri::Uri;
use ts_ls_core::CoreResult;

use crate::workspace::Workspace;

fn doc_uri(params: &Value, doc_key: &str) -> Option<Uri> {
    params[doc_key]["uri"].as_str().and_then(|s| Uri::parse(s).ok())
}

pub struct DidOpenHandler {
    pub workspace: Arc<Workspace>,
}

#[async_trait]
impl Handler for DidOpenHandler {
    async fn handle(&self, params: Value, _sink: PatchSink, _cancel: CancellationToken) -> CoreResult<()> {
        if let Some(uri) = doc_uri(&params, "textDocument") {
            let text = params["textDocument"]["text"].as_str().unwrap_or_default().to_string();
            self.workspace.projects.did_open(uri, text);
        }
        Ok(())
    }
}

pub struct DidChangeHandler {
    pub workspace: Arc<Workspace>,
}

#[async_trait]
impl Handler for DidChangeHandler {
    async fn handle(&self, params: Value, _sink: PatchSink, _cancel: CancellationToken) -> CoreResult<()> {
        if let Some(uri) = doc_uri(&params, "textDocument") {
            // Full-document sync only (§6 `textDocumentSync=full`): the last
            // content-change entry carries the whole document text.
            let text = params["contentChanges"]
                .as_array()
                .and_then(|changes| changes.last())
                .and_then(|change| change["text"].as_str())
                .unwrap_or_default()
                .to_string();
            self.workspace.projects.did_change(uri, text);
        }
        Ok(())
    }
}

pub struct DidCloseHandler {
    pub workspace: Arc<Workspace>,
}

#[async_trait]
impl Handler for DidCloseHandler {
    async fn handle(&self, params: Value, _sink: PatchSink, _cancel: CancellationToken) -> CoreResult<()> {
        if let Some(uri) = doc_uri(&params, "textDocument") {
            self.workspace.projects.did_close(&uri);
        }
        Ok(())
    }
}

pub struct DidSaveHandler {
    pub workspace: Arc<Workspace>,
}

#[async_trait]
impl Handler for DidSaveHandler {
    async fn handle(&self, params: Value, _sink: PatchSink, _cancel: CancellationToken) -> CoreResult<()> {
        if let Some(uri) = doc_uri(&params, "textDocument") {
            self.workspace.projects.did_save(&uri);
        }
        Ok(())
    }
}
