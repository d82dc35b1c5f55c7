//! Top-level wiring: the collaborators a handler needs, built once at
//! startup and shared behind `Arc` for the lifetime of the process.

use std::sync::Arc;

use ts_ls_analysis::MockAnalysisHost;
use ts_ls_core::analysis::AnalysisHost;
use ts_ls_core::config::ServerConfig;
use ts_ls_core::packages::PackageManager;
use ts_ls_core::project::ProjectManager;
use ts_ls_core::refclosure::ReferenceClosureEngine;
use ts_ls_core::source::{AsyncFileSource, EditorClient, LocalSource, RemoteSource};
use ts_ls_core::updater::Updater;
use ts_ls_core::uri::Uri;
use ts_ls_core::vfs::{LibraryBundle, Vfs};

/// Standard-library basenames the reference analyzer is allowed to serve
/// without ever touching the VFS or an editor RPC, mirroring the handful of
/// `lib.*.d.ts` files the real TypeScript distribution ships.
const BUNDLED_LIB_FILES: &[(&str, &str)] = &[(
    "lib.d.ts",
    "declare var globalThis: any;\ndeclare var console: { log(...args: any[]): void };\n",
)];

/// The version tag the handler layer's `git://` URI mapping embeds for
/// standard-library files (component I, step 4).
pub const TS_LIB_VERSION: &str = "5.4.5";

/// Everything a handler needs: the VFS and its three orchestration
/// components, the analyzer, and the resolved server configuration.
pub struct Workspace {
    pub vfs: Arc<Vfs>,
    pub updater: Arc<Updater>,
    pub packages: Arc<PackageManager>,
    pub projects: Arc<ProjectManager>,
    pub refclosure: Arc<ReferenceClosureEngine>,
    pub analysis: Arc<dyn AnalysisHost>,
    pub config: ServerConfig,
    pub root: Uri,
}

impl Workspace {
    /// Builds the workspace around `root`. When `config.strict` is set, file
    /// content only ever comes from `editor_client` (`workspace/xfiles` and
    /// `textDocument/xcontent`); otherwise it is read directly off local
    /// disk, per the `strict` flag's definition (§6).
    pub fn new(config: ServerConfig, root: Uri, editor_client: Option<Arc<dyn EditorClient>>) -> Arc<Self> {
        let library = LibraryBundle::new(
            BUNDLED_LIB_FILES
                .iter()
                .map(|(name, text)| (name.to_string(), text.to_string())),
        );
        let vfs = Arc::new(Vfs::new(library));

        let source: Arc<dyn AsyncFileSource> = if config.strict {
            let client = editor_client.expect("strict mode requires an editor client");
            Arc::new(RemoteSource::new(client))
        } else {
            let root_path = ts_ls_core::uri::uri_to_path(&root).unwrap_or_else(|_| std::path::PathBuf::from("/"));
            Arc::new(LocalSource::new(root_path))
        };

        let updater = Arc::new(Updater::with_concurrency(vfs.clone(), source, config.max_in_flight_reads));
        let packages = Arc::new(PackageManager::new(vfs.clone(), updater.clone()));
        let analysis: Arc<dyn AnalysisHost> = Arc::new(MockAnalysisHost::new());
        let projects = ProjectManager::new(vfs.clone(), updater.clone(), packages.clone(), analysis.clone(), root.clone());
        let refclosure = Arc::new(ReferenceClosureEngine::new(
            vfs.clone(),
            updater.clone(),
            projects.clone(),
            analysis.clone(),
        ));

        let workspace = Arc::new(Workspace {
            vfs: vfs.clone(),
            updater,
            packages: packages.clone(),
            projects: projects.clone(),
            refclosure,
            analysis,
            config,
            root,
        });

        tokio::spawn({
            let packages = packages.clone();
            let events = vfs.subscribe();
            async move { packages.run(events).await }
        });
        tokio::spawn({
            let projects = projects.clone();
            let events = vfs.subscribe();
            async move { projects.run(events).await }
        });

        workspace
    }
}
