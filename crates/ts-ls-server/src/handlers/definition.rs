use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use ts_ls_core::dispatcher::{Handler, PatchSink};
use ts_ls_core::patch;
use ts_ls_core::CoreResult;

use super::{analyzer_path, ensure_ready, location_json, position_from_params};
use crate::workspace::Workspace;

pub struct DefinitionHandler {
    pub workspace: Arc<Workspace>,
}

#[async_trait]
impl Handler for DefinitionHandler {
    async fn handle(&self, params: Value, sink: PatchSink, _cancel: CancellationToken) -> CoreResult<()> {
        let (uri, offset) = position_from_params(&self.workspace, &params)?;
        let (_, project_id) = ensure_ready(&self.workspace, &uri).await?;
        let path = analyzer_path(&uri);
        let entries = self.workspace.analysis.get_definition_at(project_id, &path, offset)?;

        let locations: Vec<Value> = entries
            .into_iter()
            .map(|entry| location_json(&self.workspace, &entry.file, entry.span))
            .collect();
        sink.emit(patch::replace_root(json!(locations)));
        Ok(())
    }
}
