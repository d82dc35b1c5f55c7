//! Project manager (component F).
//!
//! Discovers `tsconfig.json`/`jsconfig.json` files, owns every
//! [`ProjectConfig`] in an index-addressed arena (breaking the
//! config↔host↔analyzer reference cycle per the design notes), and exposes
//! the three workspace-wide idempotent `ensure*` futures.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use globset::{Glob, GlobSetBuilder};
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, RwLock as AsyncRwLock};

use crate::analysis::{AnalysisHost, AnalyzerHost};
use crate::error::{CoreError, CoreResult};
use crate::packages::PackageManager;
use crate::uri::{classify_file, uri_to_path, FileClass, Uri};
use crate::updater::Updater;
use crate::vfs::{Vfs, VfsEvent};

/// Whether a discovered config is a `tsconfig.json` or `jsconfig.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectConfigKind {
    Ts,
    Js,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ProjectConfigState {
    Uninitialised,
    BasicFilesReady,
    AllFilesReady,
}

/// Arena index into [`ProjectManager`]'s config list. Stored by
/// [`AnalyzerHostImpl`] instead of a pointer back to the owning
/// [`ProjectConfig`], per the design notes on cyclic references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProjectConfigId(pub usize);

/// A discovered (or synthetic fallback) compiler configuration and the
/// analyzer project it owns once initialised.
pub struct ProjectConfig {
    pub id: ProjectConfigId,
    pub dir: Uri,
    pub kind: ProjectConfigKind,
    /// `None` for the two synthetic workspace-root fallbacks.
    pub config_uri: Option<Uri>,
    state: ProjectConfigState,
    compiler_options: Value,
    expected_files: Vec<Uri>,
    host: Option<Arc<dyn AnalyzerHost>>,
    analyzer_project: Option<crate::analysis::AnalyzerProjectId>,
}

impl ProjectConfig {
    fn new_synthetic(id: ProjectConfigId, dir: Uri, kind: ProjectConfigKind) -> Self {
        ProjectConfig {
            id,
            dir,
            kind,
            config_uri: None,
            state: ProjectConfigState::Uninitialised,
            compiler_options: Value::Object(Default::default()),
            expected_files: Vec::new(),
            host: None,
            analyzer_project: None,
        }
    }

    fn new_discovered(id: ProjectConfigId, dir: Uri, kind: ProjectConfigKind, config_uri: Uri) -> Self {
        ProjectConfig {
            config_uri: Some(config_uri),
            ..ProjectConfig::new_synthetic(id, dir, kind)
        }
    }
}

type SharedUnit = Shared<BoxFuture<'static, CoreResult<()>>>;

/// A future computed at most once, reset to unstarted on error so the next
/// caller retries (used for the three workspace-wide `ensure*` operations).
struct OnceFuture {
    slot: AsyncMutex<Option<SharedUnit>>,
}

impl OnceFuture {
    fn new() -> Self {
        OnceFuture {
            slot: AsyncMutex::new(None),
        }
    }

    async fn ensure<F, Fut>(&self, make: F) -> CoreResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CoreResult<()>> + Send + 'static,
    {
        let shared = {
            let mut slot = self.slot.lock().await;
            match slot.as_ref() {
                Some(existing) => existing.clone(),
                None => {
                    let fut: SharedUnit = make().boxed().shared();
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };
        let result = shared.await;
        if result.is_err() {
            *self.slot.lock().await = None;
        }
        result
    }

    async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

/// Owns every [`ProjectConfig`] in the workspace and the three
/// workspace-wide idempotent `ensure*` futures.
pub struct ProjectManager {
    vfs: Arc<Vfs>,
    updater: Arc<Updater>,
    packages: Arc<PackageManager>,
    analysis: Arc<dyn AnalysisHost>,
    root: Uri,
    configs: AsyncRwLock<Vec<ProjectConfig>>,
    index: AsyncRwLock<FxHashMap<(Uri, ProjectConfigKind), ProjectConfigId>>,
    version_map: parking_lot::RwLock<FxHashMap<Uri, u64>>,
    module_structure: OnceFuture,
    own_files: OnceFuture,
    all_files: OnceFuture,
    self_ref: Weak<ProjectManager>,
}

impl ProjectManager {
    /// Creates a manager seeded with the two synthetic fallback configs
    /// (Ts, Js) rooted at `root`, so every file always resolves to *some*
    /// configuration.
    pub fn new(
        vfs: Arc<Vfs>,
        updater: Arc<Updater>,
        packages: Arc<PackageManager>,
        analysis: Arc<dyn AnalysisHost>,
        root: Uri,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| {
            let ts_config = ProjectConfig::new_synthetic(ProjectConfigId(0), root.clone(), ProjectConfigKind::Ts);
            let js_config = ProjectConfig::new_synthetic(ProjectConfigId(1), root.clone(), ProjectConfigKind::Js);
            let mut index = FxHashMap::default();
            index.insert((root.clone(), ProjectConfigKind::Ts), ProjectConfigId(0));
            index.insert((root.clone(), ProjectConfigKind::Js), ProjectConfigId(1));
            ProjectManager {
                vfs,
                updater,
                packages,
                analysis,
                root,
                configs: AsyncRwLock::new(vec![ts_config, js_config]),
                index: AsyncRwLock::new(index),
                version_map: parking_lot::RwLock::new(FxHashMap::default()),
                module_structure: OnceFuture::new(),
                own_files: OnceFuture::new(),
                all_files: OnceFuture::new(),
                self_ref: self_ref.clone(),
            }
        })
    }

    /// Consumes VFS `Added` events until the channel closes, creating or
    /// replacing configs for matching `tsconfig.json`/`jsconfig.json` files.
    pub async fn run(&self, mut events: tokio::sync::broadcast::Receiver<VfsEvent>) {
        loop {
            match events.recv().await {
                Ok(VfsEvent::Added { uri, .. }) => self.on_config_candidate(&uri).await,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn on_config_candidate(&self, uri: &Uri) {
        let Some(kind) = config_kind_of(uri) else { return };
        if uri.segments().iter().any(|s| s == "node_modules") {
            return;
        }
        let dir = uri.parent().unwrap_or_else(|| uri.clone());
        let mut index = self.index.write().await;
        match index.get(&(dir.clone(), kind)) {
            Some(&existing) => {
                let mut configs = self.configs.write().await;
                configs[existing.0] = ProjectConfig::new_discovered(existing, dir, kind, uri.clone());
            }
            None => {
                let mut configs = self.configs.write().await;
                let id = ProjectConfigId(configs.len());
                configs.push(ProjectConfig::new_discovered(id, dir.clone(), kind, uri.clone()));
                index.insert((dir, kind), id);
            }
        }
    }

    /// Climbs from `file`'s directory to the workspace root, returning the
    /// first matching config; falls back to the synthetic root config.
    pub async fn get_configuration(&self, file: &Uri, kind: Option<ProjectConfigKind>) -> CoreResult<ProjectConfigId> {
        let index = self.index.read().await;
        let kinds: Vec<ProjectConfigKind> = match kind {
            Some(k) => vec![k],
            None => vec![ProjectConfigKind::Ts, ProjectConfigKind::Js],
        };
        let mut dir = file.parent();
        while let Some(d) = dir {
            for &k in &kinds {
                if let Some(&id) = index.get(&(d.clone(), k)) {
                    return Ok(id);
                }
            }
            dir = d.parent();
        }
        let want = kind.unwrap_or(ProjectConfigKind::Ts);
        index
            .get(&(self.root.clone(), want))
            .copied()
            .ok_or_else(|| CoreError::NoConfig(file.as_str().to_string()))
    }

    /// The package manager backing this workspace, for handlers that need
    /// both per-file configuration and package metadata (e.g. `workspace/symbol`
    /// by `SymbolDescriptor`).
    pub fn packages(&self) -> &Arc<PackageManager> {
        &self.packages
    }

    /// All configs whose directory is `uri` or a descendant of it.
    pub async fn get_child_configurations(&self, uri: &Uri) -> Vec<ProjectConfigId> {
        self.configs
            .read()
            .await
            .iter()
            .filter(|c| c.dir.is_self_or_descendant_of(uri))
            .map(|c| c.id)
            .collect()
    }

    pub fn did_open(&self, uri: Uri, text: String) {
        self.vfs.set_overlay(uri.clone(), text);
        self.bump_version(&uri);
    }

    pub fn did_change(&self, uri: Uri, text: String) {
        self.vfs.set_overlay(uri.clone(), text);
        self.bump_version(&uri);
    }

    pub fn did_close(&self, uri: &Uri) {
        self.vfs.remove_overlay(uri);
        self.bump_version(uri);
    }

    pub fn did_save(&self, uri: &Uri) {
        self.vfs.promote_overlay(uri);
    }

    fn bump_version(&self, uri: &Uri) {
        let mut versions = self.version_map.write();
        *versions.entry(uri.clone()).or_insert(1) += 1;
    }

    /// VFS structure, plus content of every global declaration file, config,
    /// and package.json. Recomputes nothing in the reference-closure cache
    /// itself — callers (the handler layer) invalidate that cache after this
    /// future resolves, since the two caches are owned independently.
    pub async fn ensure_module_structure(&self) -> CoreResult<()> {
        let updater = self.updater.clone();
        let vfs = self.vfs.clone();
        self.module_structure
            .ensure(move || async move {
                updater.ensure_structure(None).await?;
                for uri in vfs.uris() {
                    if matches!(
                        classify_file(uri.as_str()),
                        FileClass::GlobalDeclaration | FileClass::TsConfig | FileClass::JsConfig | FileClass::PackageJson
                    ) {
                        updater.ensure_file(&uri, None).await?;
                    }
                }
                Ok(())
            })
            .await
    }

    /// As [`Self::ensure_module_structure`], plus every source file outside
    /// `node_modules`.
    pub async fn ensure_own_files(&self) -> CoreResult<()> {
        self.ensure_module_structure().await?;
        let updater = self.updater.clone();
        let vfs = self.vfs.clone();
        self.own_files
            .ensure(move || async move {
                for uri in vfs.uris() {
                    let is_source = matches!(
                        classify_file(uri.as_str()),
                        FileClass::TsSource | FileClass::JsSource | FileClass::Declaration
                    );
                    let own = !uri.segments().iter().any(|s| s == "node_modules");
                    if is_source && own {
                        updater.ensure_file(&uri, None).await?;
                    }
                }
                Ok(())
            })
            .await
    }

    /// Every source, config, and package.json in the workspace, including
    /// `node_modules`.
    pub async fn ensure_all_files(&self) -> CoreResult<()> {
        self.ensure_own_files().await?;
        let updater = self.updater.clone();
        let vfs = self.vfs.clone();
        self.all_files
            .ensure(move || async move {
                for uri in vfs.uris() {
                    updater.ensure_file(&uri, None).await?;
                }
                Ok(())
            })
            .await
    }

    /// Drops all three cached workspace futures, forcing the next call to
    /// each to recompute from scratch.
    pub async fn invalidate_structure(&self) {
        self.updater.invalidate_structure().await;
        self.module_structure.invalidate().await;
        self.own_files.invalidate().await;
        self.all_files.invalidate().await;
    }

    /// Parses the config file (if any), computes compiler options and the
    /// expected-files set, and instantiates the analyzer project. A no-op if
    /// already past [`ProjectConfigState::Uninitialised`].
    pub async fn ensure_config_file(&self, id: ProjectConfigId) -> CoreResult<()> {
        let (config_uri, dir, already) = {
            let configs = self.configs.read().await;
            let c = &configs[id.0];
            (c.config_uri.clone(), c.dir.clone(), c.state != ProjectConfigState::Uninitialised)
        };
        if already {
            return Ok(());
        }

        let json = match &config_uri {
            Some(uri) => {
                self.updater.ensure_file(uri, None).await?;
                match self.vfs.read_if_available(uri) {
                    Some(text) => serde_json::from_str(&text).unwrap_or_else(|err| {
                        tracing::warn!(%uri, error = %err, "config file failed to parse");
                        Value::Object(Default::default())
                    }),
                    None => Value::Object(Default::default()),
                }
            }
            None => Value::Object(Default::default()),
        };
        let compiler_options = json.get("compilerOptions").cloned().unwrap_or_else(|| Value::Object(Default::default()));
        let expected_files = compute_expected_files(&dir, &json, &self.vfs, true);

        let host: Arc<dyn AnalyzerHost> = Arc::new(AnalyzerHostImpl {
            manager: self.self_ref.clone(),
            config_id: id,
            project_version: AtomicU64::new(0),
        });
        let analyzer_project = self.analysis.create_project(host.clone())?;

        let mut configs = self.configs.write().await;
        let c = &mut configs[id.0];
        c.compiler_options = compiler_options;
        c.expected_files = expected_files;
        c.host = Some(host);
        c.analyzer_project = Some(analyzer_project);
        Ok(())
    }

    /// Feeds global-declaration and non-dependency `.d.ts` files into the
    /// host, then marks the config `BasicFilesReady`.
    pub async fn ensure_basic_files(&self, id: ProjectConfigId) -> CoreResult<()> {
        self.ensure_config_file(id).await?;
        let (state, expected) = {
            let configs = self.configs.read().await;
            let c = &configs[id.0];
            (c.state, c.expected_files.clone())
        };
        if state >= ProjectConfigState::BasicFilesReady {
            return Ok(());
        }
        for uri in &expected {
            let basic = matches!(classify_file(uri.as_str()), FileClass::GlobalDeclaration)
                || (matches!(classify_file(uri.as_str()), FileClass::Declaration)
                    && !uri.segments().iter().any(|s| s == "node_modules"));
            if basic {
                self.updater.ensure_file(uri, None).await?;
            }
        }
        self.configs.write().await[id.0].state = ProjectConfigState::BasicFilesReady;
        Ok(())
    }

    /// Feeds every expected file into the host, then marks the config
    /// `AllFilesReady`.
    pub async fn ensure_all_config_files(&self, id: ProjectConfigId) -> CoreResult<()> {
        self.ensure_basic_files(id).await?;
        let (state, expected) = {
            let configs = self.configs.read().await;
            let c = &configs[id.0];
            (c.state, c.expected_files.clone())
        };
        if state >= ProjectConfigState::AllFilesReady {
            return Ok(());
        }
        for uri in &expected {
            self.updater.ensure_file(uri, None).await?;
        }
        let mut configs = self.configs.write().await;
        configs[id.0].state = ProjectConfigState::AllFilesReady;
        if let Some(host) = &configs[id.0].host {
            host.inc_project_version();
        }
        Ok(())
    }

    /// Returns the config to `Uninitialised`, disposing its analyzer project.
    pub async fn reset(&self, id: ProjectConfigId) {
        let mut configs = self.configs.write().await;
        let c = &mut configs[id.0];
        if let Some(project) = c.analyzer_project.take() {
            self.analysis.dispose_project(project);
        }
        c.host = None;
        c.state = ProjectConfigState::Uninitialised;
        c.compiler_options = Value::Object(Default::default());
        c.expected_files.clear();
    }

    async fn expected_file_paths(&self, id: ProjectConfigId) -> Vec<String> {
        self.configs.read().await[id.0]
            .expected_files
            .iter()
            .map(uri_to_host_path)
            .collect()
    }

    fn script_version_for_path(&self, path: &str) -> String {
        let Ok(uri) = crate::uri::path_to_uri(std::path::Path::new(path)) else {
            return "1".to_string();
        };
        self.version_map.read().get(&uri).copied().unwrap_or(1).to_string()
    }

    fn script_snapshot_for_path(&self, path: &str) -> Option<String> {
        let uri = crate::uri::path_to_uri(std::path::Path::new(path)).ok()?;
        self.vfs.read_if_available(&uri)
    }

    async fn compiler_options_for(&self, id: ProjectConfigId) -> Value {
        self.configs.read().await[id.0].compiler_options.clone()
    }

    async fn dir_for(&self, id: ProjectConfigId) -> Uri {
        self.configs.read().await[id.0].dir.clone()
    }

    /// The analyzer's own project handle for `id`, once [`Self::ensure_config_file`]
    /// has run; `None` before that or after [`Self::reset`].
    pub async fn analyzer_project_id(&self, id: ProjectConfigId) -> Option<crate::analysis::AnalyzerProjectId> {
        self.configs.read().await[id.0].analyzer_project
    }
}

fn uri_to_host_path(uri: &Uri) -> String {
    uri_to_path(uri)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| uri.as_str().to_string())
}

fn config_kind_of(uri: &Uri) -> Option<ProjectConfigKind> {
    match uri.basename() {
        "tsconfig.json" => Some(ProjectConfigKind::Ts),
        "jsconfig.json" => Some(ProjectConfigKind::Js),
        _ => None,
    }
}

fn relative_segments(dir: &Uri, uri: &Uri) -> String {
    let dir_segments = dir.segments();
    let uri_segments = uri.segments();
    uri_segments[dir_segments.len().min(uri_segments.len())..].join("/")
}

fn compute_expected_files(dir: &Uri, config_json: &Value, vfs: &Vfs, include_node_modules: bool) -> Vec<Uri> {
    let include_patterns: Vec<String> = config_json
        .get("include")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_else(|| vec!["**/*.ts".into(), "**/*.tsx".into(), "**/*.d.ts".into(), "**/*.js".into(), "**/*.jsx".into()]);
    let exclude_patterns: Vec<String> = config_json
        .get("exclude")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_else(|| vec!["node_modules/**".into()]);

    let include_set = {
        let mut builder = GlobSetBuilder::new();
        for pattern in &include_patterns {
            if let Ok(glob) = Glob::new(pattern) {
                builder.add(glob);
            }
        }
        builder.build().unwrap_or_else(|_| GlobSetBuilder::new().build().unwrap())
    };
    let exclude_set = {
        let mut builder = GlobSetBuilder::new();
        for pattern in &exclude_patterns {
            if let Ok(glob) = Glob::new(pattern) {
                builder.add(glob);
            }
        }
        builder.build().unwrap_or_else(|_| GlobSetBuilder::new().build().unwrap())
    };

    vfs.uris()
        .into_iter()
        .filter(|uri| {
            if !uri.is_self_or_descendant_of(dir) {
                return false;
            }
            if !include_node_modules && uri.segments().iter().any(|s| s == "node_modules") {
                return false;
            }
            let rel = relative_segments(dir, uri);
            include_set.is_match(&rel) && !exclude_set.is_match(&rel)
        })
        .collect()
}

/// The `LanguageServiceHost`-style facade a [`ProjectConfig`] exposes to the
/// analyzer. Holds only a [`ProjectConfigId`] and a [`Weak`] reference back
/// to the manager, never an owning pointer to the config itself.
struct AnalyzerHostImpl {
    manager: Weak<ProjectManager>,
    config_id: ProjectConfigId,
    project_version: AtomicU64,
}

impl AnalyzerHost for AnalyzerHostImpl {
    fn script_file_names(&self) -> Vec<String> {
        let Some(manager) = self.manager.upgrade() else { return Vec::new() };
        futures::executor::block_on(manager.expected_file_paths(self.config_id))
    }

    fn script_version(&self, path: &str) -> String {
        match self.manager.upgrade() {
            Some(manager) => manager.script_version_for_path(path),
            None => "1".to_string(),
        }
    }

    fn script_snapshot(&self, path: &str) -> Option<String> {
        self.manager.upgrade()?.script_snapshot_for_path(path)
    }

    fn compilation_settings(&self) -> Value {
        match self.manager.upgrade() {
            Some(manager) => futures::executor::block_on(manager.compiler_options_for(self.config_id)),
            None => Value::Null,
        }
    }

    fn current_directory(&self) -> String {
        match self.manager.upgrade() {
            Some(manager) => uri_to_host_path(&futures::executor::block_on(manager.dir_for(self.config_id))),
            None => String::new(),
        }
    }

    fn default_lib_file_name(&self) -> String {
        "lib.d.ts".to_string()
    }

    fn inc_project_version(&self) {
        self.project_version.fetch_add(1, Ordering::SeqCst);
    }

    fn project_version(&self) -> String {
        self.project_version.load(Ordering::SeqCst).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{
        AnalyzerProjectId, CompletionEntry, CompletionEntryDetails, DefinitionEntry, NavigateToItem, NavigationTree,
        PreProcessedFile, QuickInfo, ReferenceEntry, SignatureHelp,
    };
    use crate::source::AsyncFileSource;
    use crate::vfs::LibraryBundle;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct StaticSource {
        files: FxHashMap<Uri, String>,
    }

    #[async_trait]
    impl AsyncFileSource for StaticSource {
        async fn list_files(&self, _base: Option<&Uri>) -> CoreResult<Vec<Uri>> {
            Ok(self.files.keys().cloned().collect())
        }

        async fn read_file(&self, uri: &Uri) -> CoreResult<String> {
            self.files.get(uri).cloned().ok_or_else(|| CoreError::NotFound(uri.as_str().to_string()))
        }
    }

    struct CountingAnalysis {
        created: AtomicUsize,
    }

    impl AnalysisHost for CountingAnalysis {
        fn create_project(&self, _host: Arc<dyn AnalyzerHost>) -> CoreResult<AnalyzerProjectId> {
            Ok(AnalyzerProjectId(self.created.fetch_add(1, Ordering::SeqCst)))
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
                kind: crate::analysis::SymbolKind::Other,
                span: crate::analysis::TextSpan::new(0, 0),
                children: Vec::new(),
            })
        }
        fn resolve_module_name(&self, _p: AnalyzerProjectId, _containing_file: &str, _module_name: &str) -> CoreResult<Option<String>> {
            Ok(None)
        }
        fn resolve_type_reference_directive(&self, _p: AnalyzerProjectId, _containing_file: &str, _name: &str) -> CoreResult<Option<String>> {
            Ok(None)
        }
        fn pre_process_file(&self, _path: &str, _text: &str) -> CoreResult<PreProcessedFile> {
            Ok(PreProcessedFile::default())
        }
    }

    fn uri(s: &str) -> Uri {
        Uri::from_normalized(s)
    }

    async fn manager_with(files: FxHashMap<Uri, String>) -> Arc<ProjectManager> {
        let vfs = Arc::new(Vfs::new(LibraryBundle::default()));
        for (u, content) in &files {
            vfs.add(u.clone(), Some(content.clone()));
        }
        let source = Arc::new(StaticSource { files });
        let updater = Arc::new(Updater::new(vfs.clone(), source));
        let packages = Arc::new(PackageManager::new(vfs.clone(), updater.clone()));
        let analysis = Arc::new(CountingAnalysis { created: AtomicUsize::new(0) });
        ProjectManager::new(vfs, updater, packages, analysis, uri("file:///root"))
    }

    #[tokio::test]
    async fn falls_back_to_synthetic_root_config() {
        let manager = manager_with(FxHashMap::default()).await;
        let id = manager
            .get_configuration(&uri("file:///root/src/a.ts"), Some(ProjectConfigKind::Ts))
            .await
            .unwrap();
        assert_eq!(id, ProjectConfigId(0));
    }

    #[tokio::test]
    async fn discovered_config_wins_over_synthetic_root() {
        let manager = manager_with(FxHashMap::default()).await;
        manager.on_config_candidate(&uri("file:///root/pkg/tsconfig.json")).await;
        let id = manager
            .get_configuration(&uri("file:///root/pkg/src/a.ts"), Some(ProjectConfigKind::Ts))
            .await
            .unwrap();
        assert_ne!(id, ProjectConfigId(0));
    }

    #[tokio::test]
    async fn ensure_config_file_is_idempotent() {
        let manager = manager_with(FxHashMap::default()).await;
        manager.ensure_config_file(ProjectConfigId(0)).await.unwrap();
        manager.ensure_config_file(ProjectConfigId(0)).await.unwrap();
        // The second call is a no-op: only one analyzer project was created.
        let configs = manager.configs.read().await;
        assert!(configs[0].analyzer_project.is_some());
    }

    #[tokio::test]
    async fn ensure_all_config_files_reaches_terminal_state() {
        let mut files = FxHashMap::default();
        files.insert(uri("file:///root/a.ts"), "const a = 1;".to_string());
        let manager = manager_with(files).await;
        manager.ensure_all_config_files(ProjectConfigId(0)).await.unwrap();
        let configs = manager.configs.read().await;
        assert_eq!(configs[0].state, ProjectConfigState::AllFilesReady);
    }

    #[tokio::test]
    async fn reset_disposes_and_returns_to_uninitialised() {
        let manager = manager_with(FxHashMap::default()).await;
        manager.ensure_config_file(ProjectConfigId(0)).await.unwrap();
        manager.reset(ProjectConfigId(0)).await;
        let configs = manager.configs.read().await;
        assert_eq!(configs[0].state, ProjectConfigState::Uninitialised);
        assert!(configs[0].analyzer_project.is_none());
    }

    #[tokio::test]
    async fn did_change_then_did_close_round_trips_overlay() {
        let manager = manager_with(FxHashMap::default()).await;
        let a = uri("file:///root/a.ts");
        manager.did_open(a.clone(), "let x = 1;".to_string());
        assert_eq!(manager.script_snapshot_for_path(&uri_to_host_path(&a)), Some("let x = 1;".to_string()));
        manager.did_close(&a);
        assert_eq!(manager.script_snapshot_for_path(&uri_to_host_path(&a)), None);
    }
}
