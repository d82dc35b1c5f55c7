//! In-memory virtual file system (component B).
//!
//! Mirrors either a remote editor-owned file tree or a local one. Every
//! `FileNode` is reachable from the root via its path segments; the overlay
//! (editor-owned, unsaved contents) always takes precedence over VFS content,
//! which in turn takes precedence over the process-wide [`LibraryBundle`].

use indexmap::IndexMap;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::sync::broadcast;

use crate::uri::Uri;

/// Broadcast of VFS mutations, consumed by the package manager and project
/// manager (component E, F) to react to newly discovered `package.json` /
/// `tsconfig.json` files without polling.
#[derive(Debug, Clone)]
pub enum VfsEvent {
    Added { uri: Uri, content: Option<String> },
}

const EVENT_CHANNEL_CAPACITY: usize = 1024;

enum DirChild {
    File,
    Dir(DirNode),
}

#[derive(Default)]
struct DirNode {
    children: IndexMap<String, DirChild>,
}

impl DirNode {
    fn ensure_dir(&mut self, name: &str) -> &mut DirNode {
        match self
            .children
            .entry(name.to_string())
            .or_insert_with(|| DirChild::Dir(DirNode::default()))
        {
            DirChild::Dir(dir) => dir,
            DirChild::File => {
                // A file already claims this name; shouldn't happen for
                // well-formed URIs, but don't panic on a malformed workspace.
                self.children
                    .insert(name.to_string(), DirChild::Dir(DirNode::default()));
                match self.children.get_mut(name).unwrap() {
                    DirChild::Dir(dir) => dir,
                    DirChild::File => unreachable!(),
                }
            }
        }
    }
}

struct VfsInner {
    files: IndexMap<Uri, Option<String>>,
    root: DirNode,
}

/// Process-wide immutable mapping of standard-library file basenames to
/// their content. Populated once at startup and never mutated afterwards.
#[derive(Debug, Default, Clone)]
pub struct LibraryBundle {
    files: FxHashMap<String, String>,
}

impl LibraryBundle {
    pub fn new(files: impl IntoIterator<Item = (String, String)>) -> Self {
        LibraryBundle {
            files: files.into_iter().collect(),
        }
    }

    pub fn get(&self, basename: &str) -> Option<&str> {
        self.files.get(basename).map(String::as_str)
    }

    pub fn contains(&self, basename: &str) -> bool {
        self.files.contains_key(basename)
    }

    pub fn basenames(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }
}

/// The in-memory virtual file system.
pub struct Vfs {
    inner: RwLock<VfsInner>,
    overlay: RwLock<FxHashMap<Uri, String>>,
    library: LibraryBundle,
    events: broadcast::Sender<VfsEvent>,
}

impl Vfs {
    pub fn new(library: LibraryBundle) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Vfs {
            inner: RwLock::new(VfsInner {
                files: IndexMap::new(),
                root: DirNode::default(),
            }),
            overlay: RwLock::new(FxHashMap::default()),
            library,
            events,
        }
    }

    pub fn library(&self) -> &LibraryBundle {
        &self.library
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VfsEvent> {
        self.events.subscribe()
    }

    /// Inserts a `FileNode` and all parent directories. Existing non-`None`
    /// content is never overwritten by `None`. Returns `true` if this call
    /// changed VFS state (new node, or content filled in for the first time).
    pub fn add(&self, uri: Uri, content: Option<String>) -> bool {
        let mut inner = self.inner.write();
        let segments = uri.segments();
        let existing = inner.files.get(&uri).cloned();
        let (changed, merged) = match existing {
            None => (true, content.clone()),
            Some(None) => (content.is_some(), content.clone()),
            // Content is fetched at most once per URI (component D); once
            // set, `add` never rewrites it, matching the invariant that
            // existing non-`None` content is never overwritten.
            Some(Some(_)) => (false, existing.clone().unwrap()),
        };
        if changed {
            inner.files.insert(uri.clone(), merged);
        }

        if let Some((last, dirs)) = segments.split_last() {
            let mut node = &mut inner.root;
            for dir in dirs {
                node = node.ensure_dir(dir);
            }
            node.children
                .entry(last.clone())
                .or_insert(DirChild::File);
        }
        drop(inner);

        if changed {
            let _ = self.events.send(VfsEvent::Added { uri, content });
        }
        changed
    }

    /// True iff a `FileNode` exists for `uri`, regardless of content.
    pub fn has(&self, uri: &Uri) -> bool {
        self.inner.read().files.contains_key(uri)
    }

    /// True iff the file is known to the VFS, or is a standard-library file
    /// servable from the [`LibraryBundle`] without ever having been added.
    pub fn file_exists(&self, uri: &Uri) -> bool {
        self.has(uri) || self.library.contains(uri.basename())
    }

    /// Reads content with overlay-first precedence: overlay > VFS >
    /// library bundle.
    pub fn read_if_available(&self, uri: &Uri) -> Option<String> {
        if let Some(text) = self.overlay.read().get(uri) {
            return Some(text.clone());
        }
        if let Some(content) = self.inner.read().files.get(uri) {
            if let Some(text) = content {
                return Some(text.clone());
            }
        } else if let Some(text) = self.library.get(uri.basename()) {
            return Some(text.to_string());
        }
        None
    }

    /// Direct children of `dir` as `(file names, directory names)`.
    /// Directories not present yield empty lists.
    pub fn get_directory_entries(&self, dir: &Uri) -> (Vec<String>, Vec<String>) {
        let inner = self.inner.read();
        let mut node = &inner.root;
        for segment in dir.segments() {
            match node.children.get(&segment) {
                Some(DirChild::Dir(child)) => node = child,
                _ => return (Vec::new(), Vec::new()),
            }
        }
        let mut files = Vec::new();
        let mut dirs = Vec::new();
        for (name, child) in &node.children {
            match child {
                DirChild::File => files.push(name.clone()),
                DirChild::Dir(_) => dirs.push(name.clone()),
            }
        }
        (files, dirs)
    }

    /// All known `FileNode` URIs, in insertion order.
    pub fn uris(&self) -> Vec<Uri> {
        self.inner.read().files.keys().cloned().collect()
    }

    /// `FileNode` URIs whose content is still `None`.
    pub fn uris_without_content(&self) -> Vec<Uri> {
        self.inner
            .read()
            .files
            .iter()
            .filter(|(_, content)| content.is_none())
            .map(|(uri, _)| uri.clone())
            .collect()
    }

    /// Sets editor-owned overlay content for `uri` (`didOpen`/`didChange`).
    pub fn set_overlay(&self, uri: Uri, text: String) {
        self.overlay.write().insert(uri, text);
    }

    /// Removes overlay content for `uri` (`didClose`). Returns the removed
    /// text, if any.
    pub fn remove_overlay(&self, uri: &Uri) -> Option<String> {
        self.overlay.write().remove(uri)
    }

    /// Resets a `FileNode`'s content back to `None`, forcing the next
    /// `ensure_file` to refetch it. Used only by the updater's `invalidate`
    /// (component D); not reachable through ordinary `add` calls, which never
    /// regress `Some` content back to `None`.
    pub fn clear_content(&self, uri: &Uri) {
        let mut inner = self.inner.write();
        if inner.files.contains_key(uri) {
            inner.files.insert(uri.clone(), None);
        }
    }

    /// Promotes current overlay content into the VFS proper (`didSave`).
    /// The overlay entry itself is left in place (the document may still be
    /// open); only the underlying VFS copy is synchronised. Unlike [`Self::add`],
    /// this always overwrites existing content: a save is an explicit,
    /// editor-driven content change, not a one-time fetch.
    pub fn promote_overlay(&self, uri: &Uri) {
        let Some(text) = self.overlay.read().get(uri).cloned() else {
            return;
        };
        {
            let mut inner = self.inner.write();
            inner.files.insert(uri.clone(), Some(text.clone()));
            if let Some((last, dirs)) = uri.segments().split_last() {
                let mut node = &mut inner.root;
                for dir in dirs {
                    node = node.ensure_dir(dir);
                }
                node.children.entry(last.clone()).or_insert(DirChild::File);
            }
        }
        let _ = self.events.send(VfsEvent::Added {
            uri: uri.clone(),
            content: Some(text),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> Uri {
        Uri::from_normalized(s)
    }

    #[test]
    fn add_then_has_is_permanent() {
        let vfs = Vfs::new(LibraryBundle::default());
        let u = uri("file:///a.ts");
        vfs.add(u.clone(), Some("x".into()));
        assert!(vfs.has(&u));
    }

    #[test]
    fn none_content_never_overwrites_some() {
        let vfs = Vfs::new(LibraryBundle::default());
        let u = uri("file:///a.ts");
        vfs.add(u.clone(), Some("original".into()));
        vfs.add(u.clone(), None);
        assert_eq!(vfs.read_if_available(&u), Some("original".into()));
    }

    #[test]
    fn uris_without_content_matches_read_if_available() {
        let vfs = Vfs::new(LibraryBundle::default());
        let u = uri("file:///a.ts");
        vfs.add(u.clone(), None);
        assert!(vfs.uris_without_content().contains(&u));
        assert_eq!(vfs.read_if_available(&u), None);
    }

    #[test]
    fn directory_entries_list_direct_children_only() {
        let vfs = Vfs::new(LibraryBundle::default());
        vfs.add(uri("file:///root/src/a.ts"), Some("a".into()));
        vfs.add(uri("file:///root/src/sub/b.ts"), Some("b".into()));
        vfs.add(uri("file:///root/package.json"), Some("{}".into()));

        let (files, dirs) = vfs.get_directory_entries(&uri("file:///root/src"));
        assert_eq!(files, vec!["a.ts".to_string()]);
        assert_eq!(dirs, vec!["sub".to_string()]);

        let (files, dirs) = vfs.get_directory_entries(&uri("file:///root"));
        assert_eq!(files, vec!["package.json".to_string()]);
        assert_eq!(dirs, vec!["src".to_string()]);
    }

    #[test]
    fn missing_directory_yields_empty_lists() {
        let vfs = Vfs::new(LibraryBundle::default());
        let (files, dirs) = vfs.get_directory_entries(&uri("file:///nope"));
        assert!(files.is_empty() && dirs.is_empty());
    }

    #[test]
    fn library_files_exist_without_being_added() {
        let library = LibraryBundle::new([("lib.d.ts".to_string(), "declare var x;".to_string())]);
        let vfs = Vfs::new(library);
        let u = uri("file:///typescript/lib/lib.d.ts");
        assert!(vfs.file_exists(&u));
        assert!(!vfs.has(&u));
        assert!(!vfs.uris_without_content().contains(&u));
        assert_eq!(vfs.read_if_available(&u), Some("declare var x;".into()));
    }

    #[test]
    fn overlay_takes_precedence_and_reverts_on_removal() {
        let vfs = Vfs::new(LibraryBundle::default());
        let u = uri("file:///a.ts");
        vfs.add(u.clone(), Some("disk".into()));
        vfs.set_overlay(u.clone(), "editor".into());
        assert_eq!(vfs.read_if_available(&u), Some("editor".into()));
        vfs.remove_overlay(&u);
        assert_eq!(vfs.read_if_available(&u), Some("disk".into()));
    }

    #[test]
    fn promote_overlay_copies_into_vfs_content() {
        let vfs = Vfs::new(LibraryBundle::default());
        let u = uri("file:///a.ts");
        vfs.add(u.clone(), Some("disk".into()));
        vfs.set_overlay(u.clone(), "editor".into());
        vfs.promote_overlay(&u);
        vfs.remove_overlay(&u);
        assert_eq!(vfs.read_if_available(&u), Some("editor".into()));
    }

    #[test]
    fn add_emits_event_only_when_state_changes() {
        let vfs = Vfs::new(LibraryBundle::default());
        let mut rx = vfs.subscribe();
        let u = uri("file:///a.ts");
        assert!(vfs.add(u.clone(), None));
        assert!(!vfs.add(u.clone(), None));
        assert!(vfs.add(u.clone(), Some("x".into())));
        assert!(!vfs.add(u.clone(), Some("y".into())));

        let mut seen = 0;
        while let Ok(evt) = rx.try_recv() {
            match evt {
                VfsEvent::Added { uri, .. } => assert_eq!(uri, u),
            }
            seen += 1;
        }
        assert_eq!(seen, 2);
    }
}
