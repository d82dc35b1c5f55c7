//! Async file source (component C).
//!
//! Two variants behind a common [`AsyncFileSource`] contract: `Remote` issues
//! RPCs to the editor (`workspace/xfiles`, `textDocument/xcontent`); `Local`
//! walks the filesystem. Both are driven by the updater (component D), never
//! directly by handlers.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::uri::{path_to_uri, Uri};

/// A source of file listings and content, abstracting over "talk to the
/// editor" and "read the local disk".
#[async_trait]
pub trait AsyncFileSource: Send + Sync {
    /// Lists files under `base` (or the whole workspace if `None`). May be
    /// empty; order is not significant.
    async fn list_files(&self, base: Option<&Uri>) -> CoreResult<Vec<Uri>>;

    /// Reads the content of a single file. Errors with [`CoreError::NotFound`]
    /// if the file does not exist from this source's point of view.
    async fn read_file(&self, uri: &Uri) -> CoreResult<String>;
}

/// Requests the editor side of a remote workspace: `workspace/xfiles` /
/// `textDocument/xcontent`, per §6.
#[async_trait]
pub trait EditorClient: Send + Sync {
    async fn xfiles(&self, base: Option<&Uri>) -> CoreResult<Vec<Uri>>;
    async fn xcontent(&self, uri: &Uri) -> CoreResult<String>;
}

/// A file source backed by editor RPCs.
pub struct RemoteSource {
    client: Arc<dyn EditorClient>,
}

impl RemoteSource {
    pub fn new(client: Arc<dyn EditorClient>) -> Self {
        RemoteSource { client }
    }
}

#[async_trait]
impl AsyncFileSource for RemoteSource {
    async fn list_files(&self, base: Option<&Uri>) -> CoreResult<Vec<Uri>> {
        self.client.xfiles(base).await
    }

    async fn read_file(&self, uri: &Uri) -> CoreResult<String> {
        self.client.xcontent(uri).await
    }
}

/// A file source backed by the local filesystem. Only constructed when
/// [`crate::config::ServerConfig::strict`] is `false`.
pub struct LocalSource {
    root: std::path::PathBuf,
}

impl LocalSource {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        LocalSource { root: root.into() }
    }
}

#[async_trait]
impl AsyncFileSource for LocalSource {
    async fn list_files(&self, base: Option<&Uri>) -> CoreResult<Vec<Uri>> {
        let root = match base {
            Some(uri) => crate::uri::uri_to_path(uri)?,
            None => self.root.clone(),
        };
        let root_for_walk = root.clone();
        tokio::task::spawn_blocking(move || walk_dir(&root_for_walk))
            .await
            .map_err(|e| CoreError::IoFailed(e.to_string()))?
    }

    async fn read_file(&self, uri: &Uri) -> CoreResult<String> {
        let path = crate::uri::uri_to_path(uri)?;
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => CoreError::NotFound(uri.as_str().to_string()),
                _ => CoreError::IoFailed(e.to_string()),
            })
    }
}

fn walk_dir(root: &Path) -> CoreResult<Vec<Uri>> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(CoreError::IoFailed(e.to_string())),
        };
        for entry in entries {
            let entry = entry.map_err(|e| CoreError::IoFailed(e.to_string()))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| CoreError::IoFailed(e.to_string()))?;
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                out.push(path_to_uri(&path)?);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn local_source_lists_and_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.ts"), "export const a = 1;").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.ts"), "export const b = 2;").unwrap();

        let source = LocalSource::new(dir.path());
        let files = source.list_files(None).await.unwrap();
        assert_eq!(files.len(), 2);

        let a_uri = path_to_uri(&dir.path().join("a.ts")).unwrap();
        let content = source.read_file(&a_uri).await.unwrap();
        assert_eq!(content, "export const a = 1;");
    }

    #[tokio::test]
    async fn local_source_read_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = path_to_uri(&dir.path().join("missing.ts")).unwrap();
        let source = LocalSource::new(dir.path());
        let err = source.read_file(&missing).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
