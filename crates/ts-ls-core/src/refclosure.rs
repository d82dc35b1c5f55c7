//! Reference-closure engine (component G).
//!
//! For an entry file, lazily computes the transitive set of files the
//! analyzer needs: imports, triple-slash `path=` references, and
//! type-reference directives. The cache stores *direct* edges only; the
//! transitive closure is recomputed on demand by repeated lookup, with a
//! caller-side visited set breaking cycles and a depth bound guaranteeing
//! termination on any input.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::analysis::AnalysisHost;
use crate::project::{ProjectConfigId, ProjectManager};
use crate::uri::{uri_to_path, Uri};
use crate::updater::Updater;
use crate::vfs::Vfs;

/// Default maximum recursion depth (§4.G), overridable per call.
pub const DEFAULT_MAX_DEPTH: u32 = 30;

/// Caches the direct (non-transitive) reference edges for each URI that has
/// been visited at least once.
#[derive(Default)]
pub struct ReferenceClosureCache {
    edges: RwLock<FxHashMap<Uri, Vec<Uri>>>,
}

impl ReferenceClosureCache {
    pub fn new() -> Self {
        ReferenceClosureCache::default()
    }

    fn get(&self, uri: &Uri) -> Option<Vec<Uri>> {
        self.edges.read().get(uri).cloned()
    }

    fn set(&self, uri: Uri, direct: Vec<Uri>) {
        self.edges.write().insert(uri, direct);
    }

    /// Drops the cached edges for `uri`, or every entry if `uri` is `None`.
    pub fn invalidate_referenced_files(&self, uri: Option<&Uri>) {
        match uri {
            Some(uri) => {
                self.edges.write().remove(uri);
            }
            None => self.edges.write().clear(),
        }
    }
}

/// Computes, and caches the direct edges of, the reference closure of an
/// entry file.
pub struct ReferenceClosureEngine {
    vfs: Arc<Vfs>,
    updater: Arc<Updater>,
    projects: Arc<ProjectManager>,
    analysis: Arc<dyn AnalysisHost>,
    cache: ReferenceClosureCache,
}

impl ReferenceClosureEngine {
    pub fn new(vfs: Arc<Vfs>, updater: Arc<Updater>, projects: Arc<ProjectManager>, analysis: Arc<dyn AnalysisHost>) -> Self {
        ReferenceClosureEngine {
            vfs,
            updater,
            projects,
            analysis,
            cache: ReferenceClosureCache::new(),
        }
    }

    pub fn cache(&self) -> &ReferenceClosureCache {
        &self.cache
    }

    /// Ensures every file in the reference closure of `entry` (bounded by
    /// `max_depth`, default [`DEFAULT_MAX_DEPTH`]) has had its content
    /// fetched. Returns the full closure as a set (visit order not
    /// significant). Per-edge resolution errors are logged and skipped; they
    /// never abort the overall traversal.
    pub async fn ensure_referenced_files(&self, entry: &Uri, max_depth: Option<u32>) -> Vec<Uri> {
        let mut visited = HashSet::new();
        self.visit(entry, max_depth.unwrap_or(DEFAULT_MAX_DEPTH), &mut visited).await;
        visited.into_iter().collect()
    }

    async fn visit(&self, uri: &Uri, depth_remaining: u32, visited: &mut HashSet<Uri>) {
        if depth_remaining == 0 || !visited.insert(uri.clone()) {
            return;
        }

        let config_id = match self.projects.get_configuration(uri, None).await {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(%uri, error = %err, "no configuration for reference-closure entry");
                return;
            }
        };
        if let Err(err) = self.projects.ensure_basic_files(config_id).await {
            tracing::warn!(%uri, error = %err, "failed to ensure basic files before computing closure");
            return;
        }

        let direct = match self.cache.get(uri) {
            Some(edges) => edges,
            None => match self.compute_direct_edges(uri, config_id).await {
                Ok(edges) => {
                    self.cache.set(uri.clone(), edges.clone());
                    edges
                }
                Err(err) => {
                    tracing::warn!(%uri, error = %err, "failed to preprocess file for reference closure");
                    Vec::new()
                }
            },
        };

        for edge in direct {
            Box::pin(self.visit(&edge, depth_remaining - 1, visited)).await;
        }
    }

    async fn compute_direct_edges(&self, uri: &Uri, config_id: ProjectConfigId) -> crate::error::CoreResult<Vec<Uri>> {
        self.updater.ensure_file(uri, None).await?;
        let Some(text) = self.vfs.read_if_available(uri) else {
            return Ok(Vec::new());
        };
        let path = uri_to_path(uri).map(|p| p.to_string_lossy().into_owned()).unwrap_or_else(|_| uri.as_str().to_string());
        let info = self.analysis.pre_process_file(&path, &text)?;

        let mut out = Vec::new();

        let Some(analyzer_project) = self.projects.analyzer_project_id(config_id).await else {
            // No analyzer project yet (e.g. config parse skipped module
            // resolution); triple-slash references still resolve textually.
            for rel in &info.referenced_files {
                out.push(uri.join_relative(rel));
            }
            return Ok(out);
        };

        for module_name in &info.imported_files {
            if let Ok(Some(resolved_path)) = self.analysis.resolve_module_name(analyzer_project, &path, module_name) {
                if let Ok(resolved) = crate::uri::path_to_uri(std::path::Path::new(&resolved_path)) {
                    out.push(resolved);
                }
            }
        }
        for rel in &info.referenced_files {
            out.push(uri.join_relative(rel));
        }
        for directive in &info.type_reference_directives {
            if let Ok(Some(resolved_path)) = self.analysis.resolve_type_reference_directive(analyzer_project, &path, directive) {
                if let Ok(resolved) = crate::uri::path_to_uri(std::path::Path::new(&resolved_path)) {
                    out.push(resolved);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{
        AnalyzerHost, AnalyzerProjectId, CompletionEntry, CompletionEntryDetails, DefinitionEntry, NavigateToItem,
        NavigationTree, PreProcessedFile, QuickInfo, ReferenceEntry, SignatureHelp, SymbolKind, TextSpan,
    };
    use crate::error::CoreResult;
    use crate::packages::PackageManager;
    use crate::source::AsyncFileSource;
    use crate::vfs::LibraryBundle;
    use async_trait::async_trait;

    struct StaticSource {
        files: FxHashMap<Uri, String>,
    }

    #[async_trait]
    impl AsyncFileSource for StaticSource {
        async fn list_files(&self, _base: Option<&Uri>) -> CoreResult<Vec<Uri>> {
            Ok(self.files.keys().cloned().collect())
        }
        async fn read_file(&self, uri: &Uri) -> CoreResult<String> {
            self.files
                .get(uri)
                .cloned()
                .ok_or_else(|| crate::error::CoreError::NotFound(uri.as_str().to_string()))
        }
    }

    /// An analyzer stub whose `preProcessFile` only ever reports triple-slash
    /// references (no real module resolution), enough to exercise the
    /// cycle-guard and depth-bound behaviour without a real type-checker.
    struct TripleSlashOnlyAnalysis;

    impl AnalysisHost for TripleSlashOnlyAnalysis {
        fn create_project(&self, _host: Arc<dyn AnalyzerHost>) -> CoreResult<AnalyzerProjectId> {
            Ok(AnalyzerProjectId(0))
        }
        fn dispose_project(&self, _project: AnalyzerProjectId) {}
        fn get_definition_at(&self, _p: AnalyzerProjectId, _path: &str, _offset: u32) -> CoreResult<Vec<DefinitionEntry>> {
            Ok(Vec::new())
        }
        fn get_references_at(&self, _p: AnalyzerProjectId, _path: &str, _offset: u32) -> CoreResult<Vec<ReferenceEntry>> {
            Ok(Vec::new())
        }
        fn get_quick_info_at(&self, _p: AnalyzerProjectId, _path: &str, _offset: u32) -> CoreResult<Option<QuickInfo>> {
            Ok(None)
        }
        fn get_completions_at(&self, _p: AnalyzerProjectId, _path: &str, _offset: u32) -> CoreResult<Vec<CompletionEntry>> {
            Ok(Vec::new())
        }
        fn get_completion_entry_details(
            &self,
            _p: AnalyzerProjectId,
            _path: &str,
            _offset: u32,
            _name: &str,
        ) -> CoreResult<Option<CompletionEntryDetails>> {
            Ok(None)
        }
        fn get_signature_help(&self, _p: AnalyzerProjectId, _path: &str, _offset: u32) -> CoreResult<Option<SignatureHelp>> {
            Ok(None)
        }
        fn get_navigate_to_items(&self, _p: AnalyzerProjectId, _search: &str) -> CoreResult<Vec<NavigateToItem>> {
            Ok(Vec::new())
        }
        fn get_navigation_tree(&self, _p: AnalyzerProjectId, _path: &str) -> CoreResult<NavigationTree> {
            Ok(NavigationTree {
                text: String::new(),
                kind: SymbolKind::Other,
                span: TextSpan::new(0, 0),
                children: Vec::new(),
            })
        }
        fn resolve_module_name(&self, _p: AnalyzerProjectId, _containing_file: &str, _module_name: &str) -> CoreResult<Option<String>> {
            Ok(None)
        }
        fn resolve_type_reference_directive(&self, _p: AnalyzerProjectId, _containing_file: &str, _name: &str) -> CoreResult<Option<String>> {
            Ok(None)
        }
        fn pre_process_file(&self, path: &str, text: &str) -> CoreResult<PreProcessedFile> {
            let mut referenced_files = Vec::new();
            for line in text.lines() {
                if let Some(start) = line.find("path=\"") {
                    let rest = &line[start + 6..];
                    if let Some(end) = rest.find('"') {
                        referenced_files.push(rest[..end].to_string());
                    }
                }
            }
            let _ = path;
            Ok(PreProcessedFile {
                imported_files: Vec::new(),
                referenced_files,
                type_reference_directives: Vec::new(),
            })
        }
    }

    fn uri(s: &str) -> Uri {
        Uri::from_normalized(s)
    }

    async fn engine_with(files: FxHashMap<Uri, String>) -> ReferenceClosureEngine {
        let vfs = Arc::new(Vfs::new(LibraryBundle::default()));
        for (u, c) in &files {
            vfs.add(u.clone(), Some(c.clone()));
        }
        let source = Arc::new(StaticSource { files });
        let updater = Arc::new(Updater::new(vfs.clone(), source));
        let packages = Arc::new(PackageManager::new(vfs.clone(), updater.clone()));
        let analysis: Arc<dyn AnalysisHost> = Arc::new(TripleSlashOnlyAnalysis);
        let projects = ProjectManager::new(vfs.clone(), updater.clone(), packages, analysis.clone(), uri("file:///root"));
        ReferenceClosureEngine::new(vfs, updater, projects, analysis)
    }

    #[tokio::test]
    async fn follows_triple_slash_chain_transitively() {
        let mut files = FxHashMap::default();
        files.insert(
            uri("file:///root/a.ts"),
            "/// <reference path=\"b.ts\"/>\nnamespace qux {let f: foo;}".to_string(),
        );
        files.insert(uri("file:///root/b.ts"), "/// <reference path=\"foo/c.ts\"/>".to_string());
        files.insert(uri("file:///root/foo/c.ts"), "namespace qux {export interface foo {}}".to_string());
        let engine = engine_with(files).await;

        let closure = engine.ensure_referenced_files(&uri("file:///root/a.ts"), None).await;
        let set: HashSet<_> = closure.into_iter().collect();
        assert!(set.contains(&uri("file:///root/a.ts")));
        assert!(set.contains(&uri("file:///root/b.ts")));
        assert!(set.contains(&uri("file:///root/foo/c.ts")));
    }

    #[tokio::test]
    async fn cyclic_references_terminate() {
        let mut files = FxHashMap::default();
        files.insert(uri("file:///root/a.ts"), "/// <reference path=\"b.ts\"/>".to_string());
        files.insert(uri("file:///root/b.ts"), "/// <reference path=\"a.ts\"/>".to_string());
        let engine = engine_with(files).await;

        let closure = engine.ensure_referenced_files(&uri("file:///root/a.ts"), None).await;
        let set: HashSet<_> = closure.into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[tokio::test]
    async fn zero_depth_returns_nothing() {
        let mut files = FxHashMap::default();
        files.insert(uri("file:///root/a.ts"), "/// <reference path=\"b.ts\"/>".to_string());
        let engine = engine_with(files).await;
        let closure = engine.ensure_referenced_files(&uri("file:///root/a.ts"), Some(0)).await;
        assert!(closure.is_empty());
    }

    #[tokio::test]
    async fn cache_stores_direct_edges_and_invalidation_clears_them() {
        let mut files = FxHashMap::default();
        files.insert(uri("file:///root/a.ts"), "/// <reference path=\"b.ts\"/>".to_string());
        files.insert(uri("file:///root/b.ts"), "".to_string());
        let engine = engine_with(files).await;
        engine.ensure_referenced_files(&uri("file:///root/a.ts"), None).await;
        assert!(engine.cache().get(&uri("file:///root/a.ts")).is_some());
        engine.cache().invalidate_referenced_files(Some(&uri("file:///root/a.ts")));
        assert!(engine.cache().get(&uri("file:///root/a.ts")).is_none());
    }
}
