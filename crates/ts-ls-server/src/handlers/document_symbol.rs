use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use ts_ls_core::analysis::NavigationTree;
use ts_ls_core::dispatcher::{Handler, PatchSink};
use ts_ls_core::patch;
use ts_ls_core::uri::Uri;
use ts_ls_core::CoreResult;

use super::{analyzer_path, ensure_ready, range_json, symbol_kind_str};
use crate::workspace::Workspace;

pub struct DocumentSymbolHandler {
    pub workspace: Arc<Workspace>,
}

fn tree_to_json(workspace: &Workspace, path: &str, tree: &NavigationTree) -> Value {
    json!({
        "name": tree.text,
        "kind": symbol_kind_str(tree.kind),
        "range": range_json(workspace, path, tree.span),
        "children": tree.children.iter().map(|c| tree_to_json(workspace, path, c)).collect::<Vec<_>>(),
    })
}

#[async_trait]
impl Handler for DocumentSymbolHandler {
    async fn handle(&self, params: Value, sink: PatchSink, _cancel: CancellationToken) -> CoreResult<()> {
        let uri_str = params["textDocument"]["uri"]
            .as_str()
            .ok_or_else(|| ts_ls_core::CoreError::InvalidRequest("missing textDocument.uri".to_string()))?;
        let uri = Uri::parse(uri_str)?;
        let (_, project_id) = ensure_ready(&self.workspace, &uri).await?;
        let path = analyzer_path(&uri);

        let tree = self.workspace.analysis.get_navigation_tree(project_id, &path)?;
        let children: Vec<Value> = tree.children.iter().map(|c| tree_to_json(&self.workspace, &path, c)).collect();
        sink.emit(patch::replace_root(json!(children)));
        Ok(())
    }
}
