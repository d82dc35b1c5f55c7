//! The analyzer/core boundary (§6 `AnalysisHost` and the `AnalyzerHost`
//! facade `ProjectConfig` exposes to it).
//!
//! The TypeScript analysis engine is an opaque external collaborator: the
//! core never looks inside it, only calls through [`AnalysisHost`] and
//! implements [`AnalyzerHost`] for it to call back into. `ts-ls-analysis`
//! provides the one implementation this workspace ships.

use std::sync::Arc;

use serde_json::Value;

use crate::error::CoreResult;

/// A half-open `[start, start + len)` span into a source file's UTF-16 code
/// unit offsets, matching how `AnalysisHost` keys its results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSpan {
    pub start: u32,
    pub len: u32,
}

impl TextSpan {
    pub fn new(start: u32, len: u32) -> Self {
        TextSpan { start, len }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionEntry {
    pub file: String,
    pub span: TextSpan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceEntry {
    pub file: String,
    pub span: TextSpan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickInfo {
    pub display_text: String,
    pub span: TextSpan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionEntry {
    pub name: String,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionEntryDetails {
    pub name: String,
    pub display_parts: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHelpItem {
    pub label: String,
    pub parameters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHelp {
    pub items: Vec<SignatureHelpItem>,
    pub active_signature: u32,
    pub active_parameter: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Class,
    Interface,
    Function,
    Method,
    Variable,
    Module,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigateToItem {
    pub name: String,
    pub file: String,
    pub span: TextSpan,
    pub kind: SymbolKind,
    pub container_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationTree {
    pub text: String,
    pub kind: SymbolKind,
    pub span: TextSpan,
    pub children: Vec<NavigationTree>,
}

/// The three reference kinds `preProcessFile` reports, unresolved — the
/// reference-closure engine (component G) does the resolving.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreProcessedFile {
    pub imported_files: Vec<String>,
    pub referenced_files: Vec<String>,
    pub type_reference_directives: Vec<String>,
}

/// Opaque handle to a project the analyzer created via
/// [`AnalysisHost::create_project`]. Distinct from [`crate::project::ProjectConfigId`];
/// this id belongs to the analyzer's own bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnalyzerProjectId(pub usize);

/// The facade a [`crate::project::ProjectConfig`] exposes *to* the analyzer,
/// mirroring the TypeScript compiler's `LanguageServiceHost`. Stores a
/// [`crate::project::ProjectConfigId`] rather than a reference back to the
/// owning config, breaking the reference cycle the design notes call out.
pub trait AnalyzerHost: Send + Sync {
    fn script_file_names(&self) -> Vec<String>;
    fn script_version(&self, path: &str) -> String;
    fn script_snapshot(&self, path: &str) -> Option<String>;
    fn compilation_settings(&self) -> Value;
    fn current_directory(&self) -> String;
    fn default_lib_file_name(&self) -> String;
    fn new_line(&self) -> &'static str {
        "\n"
    }
    fn inc_project_version(&self);
    fn project_version(&self) -> String;
}

/// The opaque TypeScript analysis engine, called through by the project and
/// reference-closure components. Every method is synchronous — the engine is
/// not `async` and not thread-safe, matching the single-threaded scheduling
/// model (§5).
pub trait AnalysisHost: Send + Sync {
    fn create_project(&self, host: Arc<dyn AnalyzerHost>) -> CoreResult<AnalyzerProjectId>;
    fn dispose_project(&self, project: AnalyzerProjectId);

    fn get_definition_at(
        &self,
        project: AnalyzerProjectId,
        path: &str,
        offset: u32,
    ) -> CoreResult<Vec<DefinitionEntry>>;

    fn get_references_at(
        &self,
        project: AnalyzerProjectId,
        path: &str,
        offset: u32,
    ) -> CoreResult<Vec<ReferenceEntry>>;

    fn get_quick_info_at(
        &self,
        project: AnalyzerProjectId,
        path: &str,
        offset: u32,
    ) -> CoreResult<Option<QuickInfo>>;

    fn get_completions_at(
        &self,
        project: AnalyzerProjectId,
        path: &str,
        offset: u32,
    ) -> CoreResult<Vec<CompletionEntry>>;

    fn get_completion_entry_details(
        &self,
        project: AnalyzerProjectId,
        path: &str,
        offset: u32,
        name: &str,
    ) -> CoreResult<Option<CompletionEntryDetails>>;

    fn get_signature_help(
        &self,
        project: AnalyzerProjectId,
        path: &str,
        offset: u32,
    ) -> CoreResult<Option<SignatureHelp>>;

    fn get_navigate_to_items(
        &self,
        project: AnalyzerProjectId,
        search: &str,
    ) -> CoreResult<Vec<NavigateToItem>>;

    fn get_navigation_tree(
        &self,
        project: AnalyzerProjectId,
        path: &str,
    ) -> CoreResult<NavigationTree>;

    fn resolve_module_name(
        &self,
        project: AnalyzerProjectId,
        containing_file: &str,
        module_name: &str,
    ) -> CoreResult<Option<String>>;

    fn resolve_type_reference_directive(
        &self,
        project: AnalyzerProjectId,
        containing_file: &str,
        name: &str,
    ) -> CoreResult<Option<String>>;

    fn pre_process_file(&self, path: &str, text: &str) -> CoreResult<PreProcessedFile>;
}
