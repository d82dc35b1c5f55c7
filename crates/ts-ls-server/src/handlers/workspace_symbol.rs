//! `workspace/symbol`: two modes (§4.I step 5). A plain string `query`
//! delegates straight to the analyzer's navigate-to search; a structured
//! `symbol` ([`SymbolDescriptor`]-shaped) query additionally filters by kind
//! and containing package, with a `definitely-typed`-specific restriction to
//! the matching `@types/<name>` subdirectory when the workspace root
//! package is named `"definitely-typed"`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use ts_ls_core::analysis::AnalyzerProjectId;
use ts_ls_core::dispatcher::{Handler, PatchSink};
use ts_ls_core::patch;
use ts_ls_core::project::ProjectConfigKind;
use ts_ls_core::CoreResult;

use super::{location_json, symbol_kind_str};
use crate::workspace::Workspace;

pub struct WorkspaceSymbolHandler {
    pub workspace: Arc<Workspace>,
}

async fn root_project_id(workspace: &Workspace) -> CoreResult<AnalyzerProjectId> {
    let config_id = workspace
        .projects
        .get_configuration(&workspace.root, Some(ProjectConfigKind::Ts))
        .await?;
    workspace.projects.ensure_all_config_files(config_id).await?;
    workspace
        .projects
        .analyzer_project_id(config_id)
        .await
        .ok_or_else(|| ts_ls_core::CoreError::NoConfig(workspace.root.as_str().to_string()))
}

/// `true` if `file` lives under `@types/<want>` relative to the workspace
/// root, matching the `definitely-typed` special case.
fn in_types_package(workspace: &Workspace, file: &str, want: &str) -> bool {
    let uri = super::uri_for_analyzer_path(file);
    let segments = uri.segments();
    let root_segments = workspace.root.segments();
    let rel = &segments[root_segments.len().min(segments.len())..];
    rel.first().map(String::as_str) == Some("types") && rel.get(1).map(String::as_str) == Some(want)
}

#[async_trait]
impl Handler for WorkspaceSymbolHandler {
    async fn handle(&self, params: Value, sink: PatchSink, _cancel: CancellationToken) -> CoreResult<()> {
        self.workspace.projects.ensure_module_structure().await?;

        let project_id = root_project_id(&self.workspace).await?;

        if let Some(query) = params.get("query").and_then(Value::as_str) {
            if query.is_empty() {
                sink.emit(patch::replace_root(json!([])));
                return Ok(());
            }
            let items = self.workspace.analysis.get_navigate_to_items(project_id, query)?;
            let symbols: Vec<Value> = items
                .into_iter()
                .map(|item| {
                    json!({
                        "name": item.name,
                        "kind": symbol_kind_str(item.kind),
                        "location": location_json(&self.workspace, &item.file, item.span),
                        "containerName": item.container_name,
                    })
                })
                .collect();
            sink.emit(patch::replace_root(json!(symbols)));
            return Ok(());
        }

        let Some(descriptor) = params.get("symbol") else {
            sink.emit(patch::replace_root(json!([])));
            return Ok(());
        };
        let name = descriptor.get("name").and_then(Value::as_str).unwrap_or_default();
        if name.is_empty() {
            sink.emit(patch::replace_root(json!([])));
            return Ok(());
        }
        let want_kind = descriptor.get("kind").and_then(Value::as_str);
        let want_package = descriptor.get("package").and_then(|p| p.get("name")).and_then(Value::as_str);

        let root_package_name = match self.workspace.packages.root_package_json_uri() {
            Some(uri) => self
                .workspace
                .packages
                .get_package_json(&uri)
                .await
                .ok()
                .and_then(|json| json.get("name").and_then(Value::as_str).map(str::to_string)),
            None => None,
        };
        let is_definitely_typed = root_package_name.as_deref() == Some("definitely-typed");

        let items = self.workspace.analysis.get_navigate_to_items(project_id, name)?;
        let symbols: Vec<Value> = items
            .into_iter()
            .filter(|item| item.name == name)
            .filter(|item| want_kind.is_none_or(|k| k == symbol_kind_str(item.kind)))
            .filter(|item| {
                let Some(want) = want_package else { return true };
                if is_definitely_typed {
                    let wanted_types_dir = want.strip_prefix("@types/").unwrap_or(want);
                    in_types_package(&self.workspace, &item.file, wanted_types_dir)
                } else {
                    root_package_name.as_deref() == Some(want)
                }
            })
            .map(|item| {
                json!({
                    "name": item.name,
                    "kind": symbol_kind_str(item.kind),
                    "location": location_json(&self.workspace, &item.file, item.span),
                    "containerName": item.container_name,
                })
            })
            .collect();
        sink.emit(patch::replace_root(json!(symbols)));
        Ok(())
    }
}
