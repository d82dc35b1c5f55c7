use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use ts_ls_core::dispatcher::{Handler, PatchSink};
use ts_ls_core::patch;
use ts_ls_core::CoreResult;

use super::{analyzer_path, ensure_ready, position_from_params, range_json};
use crate::workspace::Workspace;

pub struct HoverHandler {
    pub workspace: Arc<Workspace>,
}

#[async_trait]
impl Handler for HoverHandler {
    async fn handle(&self, params: Value, sink: PatchSink, _cancel: CancellationToken) -> CoreResult<()> {
        let (uri, offset) = position_from_params(&self.workspace, &params)?;
        let (_, project_id) = ensure_ready(&self.workspace, &uri).await?;
        let path = analyzer_path(&uri);

        let result = match self.workspace.analysis.get_quick_info_at(project_id, &path, offset)? {
            Some(info) => json!({
                "contents": { "kind": "plaintext", "value": info.display_text },
                "range": range_json(&self.workspace, &path, info.span),
            }),
            None => Value::Null,
        };
        sink.emit(patch::replace_root(result));
        Ok(())
    }
}
