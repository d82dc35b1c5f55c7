//! Package manager (component E).
//!
//! Listens for VFS `Added` events under `package.json` basenames (skipping
//! anything under `node_modules`), keeps a registry of parsed manifests, and
//! tracks the single `rootPackageJsonUri` used to resolve workspace-relative
//! dependency questions.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::uri::Uri;
use crate::updater::Updater;
use crate::vfs::{Vfs, VfsEvent};

const DEPENDENCY_KEYS: [&str; 4] = [
    "dependencies",
    "devDependencies",
    "peerDependencies",
    "optionalDependencies",
];

/// A single registered `package.json`: its URI and parsed content, if the
/// content parsed as valid JSON when it arrived.
#[derive(Debug, Clone)]
pub struct PackageRecord {
    pub uri: Uri,
    pub json: Option<Value>,
}

/// `(dependee package name, dependency name, dependency version range)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub dependee: String,
    pub dep_name: String,
    pub dep_version: String,
}

struct Registry {
    records: FxHashMap<Uri, PackageRecord>,
    root: Option<Uri>,
}

/// Tracks every non-`node_modules` `package.json` in the workspace.
pub struct PackageManager {
    registry: RwLock<Registry>,
    vfs: Arc<Vfs>,
    updater: Arc<Updater>,
}

impl PackageManager {
    pub fn new(vfs: Arc<Vfs>, updater: Arc<Updater>) -> Self {
        PackageManager {
            registry: RwLock::new(Registry {
                records: FxHashMap::default(),
                root: None,
            }),
            vfs,
            updater,
        }
    }

    /// Runs forever (until the VFS event channel closes), applying each
    /// `Added` event that names a relevant `package.json`. Intended to be
    /// spawned as its own task; a lagged receiver just skips the events it
    /// missed, which `ensure*`-style recomputation elsewhere covers.
    pub async fn run(&self, mut events: tokio::sync::broadcast::Receiver<VfsEvent>) {
        loop {
            match events.recv().await {
                Ok(VfsEvent::Added { uri, content }) => self.on_added(&uri, content),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    fn on_added(&self, uri: &Uri, content: Option<String>) {
        if !is_relevant_package_json(uri) {
            return;
        }
        let json = content.and_then(|text| match serde_json::from_str(&text) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(%uri, error = %err, "package.json failed to parse");
                None
            }
        });
        let mut registry = self.registry.write();
        registry.records.insert(
            uri.clone(),
            PackageRecord {
                uri: uri.clone(),
                json,
            },
        );
        registry.root = Some(select_root(registry.records.keys()));
    }

    /// All registered `package.json` URIs, in no particular order.
    pub fn all_package_json_uris(&self) -> Vec<Uri> {
        self.registry.read().records.keys().cloned().collect()
    }

    /// The registered `package.json` with the fewest path segments, ties
    /// broken lexicographically by URI string.
    pub fn root_package_json_uri(&self) -> Option<Uri> {
        self.registry.read().root.clone()
    }

    /// Walks ancestors of `uri`, returning the nearest registered
    /// `package.json` (including one at `uri`'s own directory).
    pub fn get_closest_package_json_uri(&self, uri: &Uri) -> Option<Uri> {
        let registry = self.registry.read();
        let mut candidate = Some(uri.clone());
        while let Some(current) = candidate {
            let here = current.join_relative("package.json");
            if registry.records.contains_key(&here) {
                return Some(here);
            }
            candidate = current.parent();
        }
        None
    }

    /// Ensures the manifest's content has been fetched, then returns its
    /// parsed JSON. Fails with [`CoreError::NotFound`] if `uri` is not a
    /// registered package.json, or [`CoreError::ParseFailed`] if its content
    /// never parsed.
    pub async fn get_package_json(&self, uri: &Uri) -> CoreResult<Value> {
        if !self.registry.read().records.contains_key(uri) {
            return Err(CoreError::NotFound(uri.as_str().to_string()));
        }
        self.updater.ensure_file(uri, None).await?;
        if let Some(text) = self.vfs.read_if_available(uri) {
            self.on_added(uri, Some(text));
        }
        let registry = self.registry.read();
        registry
            .records
            .get(uri)
            .and_then(|record| record.json.clone())
            .ok_or_else(|| CoreError::ParseFailed(uri.as_str().to_string()))
    }

    /// Enumerates dependency edges declared across every registered
    /// (non-`node_modules`) `package.json`, reading whichever of the four
    /// well-known dependency maps are present.
    pub fn dependency_edges(&self) -> Vec<DependencyEdge> {
        let registry = self.registry.read();
        let mut out = Vec::new();
        for record in registry.records.values() {
            let Some(json) = &record.json else { continue };
            let dependee = package_name(json).unwrap_or_else(|| record.uri.to_string());
            for key in DEPENDENCY_KEYS {
                let Some(map) = json.get(key).and_then(Value::as_object) else {
                    continue;
                };
                for (dep_name, version) in map {
                    let dep_version = version.as_str().unwrap_or_default().to_string();
                    out.push(DependencyEdge {
                        dependee: dependee.clone(),
                        dep_name: dep_name.clone(),
                        dep_version,
                    });
                }
            }
        }
        out
    }
}

fn package_name(json: &Value) -> Option<String> {
    json.get("name")?.as_str().map(str::to_string)
}

fn is_relevant_package_json(uri: &Uri) -> bool {
    uri.basename() == "package.json" && !uri.segments().iter().any(|s| s == "node_modules")
}

fn select_root<'a>(uris: impl Iterator<Item = &'a Uri>) -> Uri {
    uris.min_by(|a, b| a.depth().cmp(&b.depth()).then_with(|| a.as_str().cmp(b.as_str())))
        .cloned()
        .expect("select_root called with at least one candidate")
}

#[cfg(test)]
mod tests {
    use super::*;
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
                .ok_or_else(|| CoreError::NotFound(uri.as_str().to_string()))
        }
    }

    fn uri(s: &str) -> Uri {
        Uri::from_normalized(s)
    }

    fn manager_with(files: FxHashMap<Uri, String>) -> (Arc<Vfs>, PackageManager) {
        let vfs = Arc::new(Vfs::new(LibraryBundle::default()));
        let source = Arc::new(StaticSource { files });
        let updater = Arc::new(Updater::new(vfs.clone(), source));
        let manager = PackageManager::new(vfs.clone(), updater);
        (vfs, manager)
    }

    #[test]
    fn ignores_node_modules_and_non_manifest_files() {
        let (vfs, manager) = manager_with(FxHashMap::default());
        vfs.add(uri("file:///root/node_modules/x/package.json"), Some("{}".into()));
        vfs.add(uri("file:///root/src/index.ts"), Some("x".into()));
        manager.on_added(&uri("file:///root/node_modules/x/package.json"), Some("{}".into()));
        assert!(manager.all_package_json_uris().is_empty());
    }

    #[test]
    fn root_is_fewest_segments_then_lexicographic() {
        let (_, manager) = manager_with(FxHashMap::default());
        manager.on_added(&uri("file:///root/b/package.json"), Some(r#"{"name":"b"}"#.to_string()));
        manager.on_added(&uri("file:///root/package.json"), Some(r#"{"name":"root"}"#.to_string()));
        manager.on_added(&uri("file:///root/a/package.json"), Some(r#"{"name":"a"}"#.to_string()));
        assert_eq!(manager.root_package_json_uri(), Some(uri("file:///root/package.json")));
    }

    #[test]
    fn closest_package_json_walks_ancestors() {
        let (_, manager) = manager_with(FxHashMap::default());
        manager.on_added(&uri("file:///root/package.json"), Some(r#"{}"#.to_string()));
        manager.on_added(&uri("file:///root/pkg/package.json"), Some(r#"{}"#.to_string()));
        let found = manager.get_closest_package_json_uri(&uri("file:///root/pkg/src/index.ts"));
        assert_eq!(found, Some(uri("file:///root/pkg/package.json")));
        let fallback = manager.get_closest_package_json_uri(&uri("file:///root/other/index.ts"));
        assert_eq!(fallback, Some(uri("file:///root/package.json")));
    }

    #[test]
    fn dependency_edges_cover_all_four_keys() {
        let (_, manager) = manager_with(FxHashMap::default());
        let json = r#"{
            "name": "pkg",
            "dependencies": {"a": "^1.0.0"},
            "devDependencies": {"b": "^2.0.0"},
            "peerDependencies": {"c": "^3.0.0"},
            "optionalDependencies": {"d": "^4.0.0"}
        }"#;
        manager.on_added(&uri("file:///root/package.json"), Some(json.to_string()));
        let edges = manager.dependency_edges();
        assert_eq!(edges.len(), 4);
        assert!(edges.iter().all(|e| e.dependee == "pkg"));
        let names: Vec<&str> = {
            let mut n: Vec<&str> = edges.iter().map(|e| e.dep_name.as_str()).collect();
            n.sort_unstable();
            n
        };
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn get_package_json_ensures_content_then_parses() {
        let mut files = FxHashMap::default();
        files.insert(uri("file:///root/package.json"), r#"{"name":"root"}"#.to_string());
        let (vfs, manager) = manager_with(files);
        vfs.add(uri("file:///root/package.json"), None);
        manager.on_added(&uri("file:///root/package.json"), None);

        let json = manager.get_package_json(&uri("file:///root/package.json")).await.unwrap();
        assert_eq!(json.get("name").and_then(Value::as_str), Some("root"));
    }

    #[tokio::test]
    async fn get_package_json_unregistered_uri_is_not_found() {
        let (_, manager) = manager_with(FxHashMap::default());
        let err = manager
            .get_package_json(&uri("file:///missing/package.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn run_applies_events_from_channel() {
        let (vfs, manager) = manager_with(FxHashMap::default());
        let rx = vfs.subscribe();
        let manager = Arc::new(manager);
        let task_manager = manager.clone();
        let handle = tokio::spawn(async move { task_manager.run(rx).await });

        vfs.add(uri("file:///root/package.json"), Some(r#"{"name":"root"}"#.to_string()));
        // Give the spawned task a chance to observe the broadcast event.
        for _ in 0..50 {
            if !manager.all_package_json_uris().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        assert_eq!(manager.all_package_json_uris(), vec![uri("file:///root/package.json")]);
        drop(vfs);
        let _ = handle.await;
    }
}
