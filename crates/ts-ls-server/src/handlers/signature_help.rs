use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use ts_ls_core::dispatcher::{Handler, PatchSink};
use ts_ls_core::patch;
use ts_ls_core::CoreResult;

use super::{analyzer_path, ensure_ready, position_from_params};
use crate::workspace::Workspace;

pub struct SignatureHelpHandler {
    pub workspace: Arc<Workspace>,
}

#[async_trait]
impl Handler for SignatureHelpHandler {
    async fn handle(&self, params: Value, sink: PatchSink, _cancel: CancellationToken) -> CoreResult<()> {
        let (uri, offset) = position_from_params(&self.workspace, &params)?;
        let (_, project_id) = ensure_ready(&self.workspace, &uri).await?;
        let path = analyzer_path(&uri);

        let result = match self.workspace.analysis.get_signature_help(project_id, &path, offset)? {
            Some(help) => json!({
                "signatures": help.items.iter().map(|item| json!({
                    "label": item.label,
                    "parameters": item.parameters.iter().map(|p| json!({ "label": p })).collect::<Vec<_>>(),
                })).collect::<Vec<_>>(),
                "activeSignature": help.active_signature,
                "activeParameter": help.active_parameter,
            }),
            None => Value::Null,
        };
        sink.emit(patch::replace_root(result));
        Ok(())
    }
}
