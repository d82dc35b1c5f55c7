//! LSP method handlers (component I): thin glue between the dispatcher and
//! the orchestration core, following the five-step recipe every positional
//! query handler below repeats — ensure inputs, query the analyzer, convert
//! offsets to positions, map paths back to URIs, done.

mod completion;
mod definition;
mod document_symbol;
mod hover;
mod lifecycle;
mod references;
mod signature_help;
mod sync;
mod workspace_symbol;
mod xrefs;

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use ts_ls_core::analysis::TextSpan;
use ts_ls_core::dispatcher::Dispatcher;
use ts_ls_core::position::offset_to_position;
use ts_ls_core::project::ProjectConfigId;
use ts_ls_core::uri::{classify_file, lib_file_git_uri, path_to_uri, uri_to_path, FileClass, Uri};
use ts_ls_core::CoreResult;

use crate::workspace::{Workspace, TS_LIB_VERSION};

/// Registers every handler this binary supports on `dispatcher`.
pub fn register_all(dispatcher: &mut Dispatcher, workspace: Arc<Workspace>) {
    dispatcher.register("initialize", Arc::new(lifecycle::InitializeHandler));
    dispatcher.register("shutdown", Arc::new(lifecycle::ShutdownHandler));

    dispatcher.register("textDocument/didOpen", Arc::new(sync::DidOpenHandler { workspace: workspace.clone() }));
    dispatcher.register("textDocument/didChange", Arc::new(sync::DidChangeHandler { workspace: workspace.clone() }));
    dispatcher.register("textDocument/didClose", Arc::new(sync::DidCloseHandler { workspace: workspace.clone() }));
    dispatcher.register("textDocument/didSave", Arc::new(sync::DidSaveHandler { workspace: workspace.clone() }));

    dispatcher.register("textDocument/definition", Arc::new(definition::DefinitionHandler { workspace: workspace.clone() }));
    dispatcher.register("textDocument/hover", Arc::new(hover::HoverHandler { workspace: workspace.clone() }));
    dispatcher.register("textDocument/references", Arc::new(references::ReferencesHandler { workspace: workspace.clone() }));
    dispatcher.register(
        "textDocument/documentSymbol",
        Arc::new(document_symbol::DocumentSymbolHandler { workspace: workspace.clone() }),
    );
    dispatcher.register("textDocument/completion", Arc::new(completion::CompletionHandler { workspace: workspace.clone() }));
    dispatcher.register(
        "textDocument/signatureHelp",
        Arc::new(signature_help::SignatureHelpHandler { workspace: workspace.clone() }),
    );

    dispatcher.register(
        "workspace/symbol",
        Arc::new(workspace_symbol::WorkspaceSymbolHandler { workspace: workspace.clone() }),
    );
    dispatcher.register("workspace/xreferences", Arc::new(xrefs::XReferencesHandler { workspace: workspace.clone() }));
    dispatcher.register("workspace/xdefinition", Arc::new(xrefs::XDefinitionHandler { workspace: workspace.clone() }));
    dispatcher.register("workspace/xdependencies", Arc::new(xrefs::XDependenciesHandler { workspace: workspace.clone() }));
    dispatcher.register("workspace/xpackages", Arc::new(xrefs::XPackagesHandler { workspace }));
}

/// Step 1: guarantees `entry`'s reference closure has been fetched, then
/// resolves and fully materialises its analyzer configuration. Returns the
/// config id and the analyzer's own project handle for it.
pub(crate) async fn ensure_ready(
    workspace: &Workspace,
    entry: &Uri,
) -> CoreResult<(ProjectConfigId, ts_ls_core::analysis::AnalyzerProjectId)> {
    workspace
        .refclosure
        .ensure_referenced_files(entry, Some(workspace.config.max_reference_depth))
        .await;
    let config_id = workspace.projects.get_configuration(entry, None).await?;
    workspace.projects.ensure_all_config_files(config_id).await?;
    let project_id = workspace
        .projects
        .analyzer_project_id(config_id)
        .await
        .ok_or_else(|| ts_ls_core::CoreError::NoConfig(entry.as_str().to_string()))?;
    Ok((config_id, project_id))
}

/// Step 2 input: the analyzer keys everything off native-path strings, not
/// URIs (matching what `ProjectConfig`'s `AnalyzerHost` facade feeds it).
pub(crate) fn analyzer_path(uri: &Uri) -> String {
    uri_to_path(uri)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| uri.as_str().to_string())
}

/// Step 4: maps a native path the analyzer returned back to a URI, special-
/// casing bundled standard-library files to the `git://` scheme (component
/// I, step 4).
pub(crate) fn uri_for_analyzer_path(path: &str) -> Uri {
    let basename = Path::new(path).file_name().and_then(|n| n.to_str()).unwrap_or(path);
    if matches!(classify_file(path), FileClass::GlobalDeclaration) {
        return lib_file_git_uri(TS_LIB_VERSION, basename);
    }
    path_to_uri(Path::new(path)).unwrap_or_else(|_| Uri::from_normalized(path))
}

/// Step 3: offset -> LSP `{line, character}`, resolving the file's current
/// text through the VFS (overlay-aware).
pub(crate) fn position_json(workspace: &Workspace, file_path: &str, offset: u32) -> Value {
    let uri = uri_for_analyzer_path(file_path);
    let text = workspace.vfs.read_if_available(&uri).unwrap_or_default();
    let (line, character) = offset_to_position(&text, offset);
    json!({ "line": line, "character": character })
}

/// A `TextSpan`'s start converted to an LSP `Range`, `[start, start+len)`
/// both endpoints converted against the same file's text.
pub(crate) fn range_json(workspace: &Workspace, file_path: &str, span: TextSpan) -> Value {
    let start = position_json(workspace, file_path, span.start);
    let end = position_json(workspace, file_path, span.start + span.len);
    json!({ "start": start, "end": end })
}

pub(crate) fn location_json(workspace: &Workspace, file_path: &str, span: TextSpan) -> Value {
    json!({
        "uri": uri_for_analyzer_path(file_path).as_str(),
        "range": range_json(workspace, file_path, span),
    })
}

/// Extracts `(uri, offset)` from a standard `TextDocumentPositionParams`-
/// shaped request, using the file's current VFS text to convert the LSP
/// `{line, character}` position to an analyzer offset.
pub(crate) fn position_from_params(workspace: &Workspace, params: &Value) -> CoreResult<(Uri, u32)> {
    let uri_str = params["textDocument"]["uri"]
        .as_str()
        .ok_or_else(|| ts_ls_core::CoreError::InvalidRequest("missing textDocument.uri".to_string()))?;
    let uri = Uri::parse(uri_str)?;
    let line = params["position"]["line"].as_u64().unwrap_or(0) as u32;
    let character = params["position"]["character"].as_u64().unwrap_or(0) as u32;
    let text = workspace.vfs.read_if_available(&uri).unwrap_or_default();
    let offset = ts_ls_core::position::position_to_offset(&text, line, character);
    Ok((uri, offset))
}

pub(crate) fn symbol_kind_str(kind: ts_ls_core::analysis::SymbolKind) -> &'static str {
    use ts_ls_core::analysis::SymbolKind::*;
    match kind {
        Class => "class",
        Interface => "interface",
        Function => "function",
        Method => "method",
        Variable => "variable",
        Module => "module",
        Other => "other",
    }
}
