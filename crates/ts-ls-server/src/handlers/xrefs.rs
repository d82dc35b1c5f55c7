//! Metadata-level workspace queries (§6): `workspace/xreferences`,
//! `xdefinition`, `xdependencies`, `xpackages`. These answer cross-repository
//! questions a code-intelligence client asks about packages and symbols
//! rather than about open files, so they lean on the package manager instead
//! of a single document's analyzer configuration.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use ts_ls_core::dispatcher::{Handler, PatchSink};
use ts_ls_core::patch;
use ts_ls_core::CoreResult;

use super::{analyzer_path, ensure_ready, location_json, position_from_params};
use crate::workspace::Workspace;

/// Like `textDocument/references`, but each result is wrapped with the
/// `package.json` closest to the file it was found in, per the `xreferences`
/// cross-repository contract.
pub struct XReferencesHandler {
    pub workspace: Arc<Workspace>,
}

#[async_trait]
impl Handler for XReferencesHandler {
    async fn handle(&self, params: Value, sink: PatchSink, _cancel: CancellationToken) -> CoreResult<()> {
        let (uri, offset) = position_from_params(&self.workspace, &params)?;
        let (_, project_id) = ensure_ready(&self.workspace, &uri).await?;
        let path = analyzer_path(&uri);
        let entries = self.workspace.analysis.get_references_at(project_id, &path, offset)?;

        let mut results = Vec::new();
        for entry in entries {
            let file_uri = super::uri_for_analyzer_path(&entry.file);
            let package = self
                .workspace
                .packages
                .get_closest_package_json_uri(&file_uri)
                .map(|uri| uri.as_str().to_string());
            results.push(json!({
                "reference": location_json(&self.workspace, &entry.file, entry.span),
                "package": package,
            }));
        }
        sink.emit(patch::replace_root(json!(results)));
        Ok(())
    }
}

/// Like `textDocument/definition`, but each result is annotated with the
/// `package.json` it belongs to, for cross-repository go-to-definition.
pub struct XDefinitionHandler {
    pub workspace: Arc<Workspace>,
}

#[async_trait]
impl Handler for XDefinitionHandler {
    async fn handle(&self, params: Value, sink: PatchSink, _cancel: CancellationToken) -> CoreResult<()> {
        let (uri, offset) = position_from_params(&self.workspace, &params)?;
        let (_, project_id) = ensure_ready(&self.workspace, &uri).await?;
        let path = analyzer_path(&uri);
        let entries = self.workspace.analysis.get_definition_at(project_id, &path, offset)?;

        let mut results = Vec::new();
        for entry in entries {
            let file_uri = super::uri_for_analyzer_path(&entry.file);
            let package = self
                .workspace
                .packages
                .get_closest_package_json_uri(&file_uri)
                .map(|uri| uri.as_str().to_string());
            results.push(json!({
                "location": location_json(&self.workspace, &entry.file, entry.span),
                "package": package,
            }));
        }
        sink.emit(patch::replace_root(json!(results)));
        Ok(())
    }
}

/// Every dependency edge declared across the workspace's `package.json`
/// files, regardless of which document (if any) is currently open.
pub struct XDependenciesHandler {
    pub workspace: Arc<Workspace>,
}

#[async_trait]
impl Handler for XDependenciesHandler {
    async fn handle(&self, _params: Value, sink: PatchSink, _cancel: CancellationToken) -> CoreResult<()> {
        self.workspace.projects.ensure_module_structure().await?;
        let edges: Vec<Value> = self
            .workspace
            .packages
            .dependency_edges()
            .into_iter()
            .map(|edge| {
                json!({
                    "attributes": {
                        "name": edge.dep_name,
                        "version": edge.dep_version,
                    },
                    "hints": { "dependeePackageName": edge.dependee },
                })
            })
            .collect();
        sink.emit(patch::replace_root(json!(edges)));
        Ok(())
    }
}

/// Every `package.json` known to the workspace, with its parsed `name`/
/// `version`, if it parsed.
pub struct XPackagesHandler {
    pub workspace: Arc<Workspace>,
}

#[async_trait]
impl Handler for XPackagesHandler {
    async fn handle(&self, _params: Value, sink: PatchSink, _cancel: CancellationToken) -> CoreResult<()> {
        self.workspace.projects.ensure_module_structure().await?;
        let mut packages = Vec::new();
        for uri in self.workspace.packages.all_package_json_uris() {
            if let Ok(json) = self.workspace.packages.get_package_json(&uri).await {
                packages.push(json!({
                    "package": {
                        "name": json.get("name"),
                        "version": json.get("version"),
                    },
                    "uri": uri.as_str(),
                }));
            }
        }
        sink.emit(patch::replace_root(json!(packages)));
        Ok(())
    }
}
