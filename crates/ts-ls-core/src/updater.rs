//! VFS updater (component D).
//!
//! Converts "reference to a URI" into "content present in VFS", at most once
//! per URI per session, with bounded concurrency and cancellation.
//! Concurrent callers for the same URI share one underlying fetch via a
//! dedup map of [`Shared`] futures (the "lazy, cached stream with reference
//! counting" of the design notes, implemented with `future` + dedup map).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, CoreResult};
use crate::source::AsyncFileSource;
use crate::uri::Uri;
use crate::vfs::Vfs;
use rustc_hash::FxHashMap;

/// Default bound on in-flight source reads (§5).
pub const DEFAULT_MAX_IN_FLIGHT: usize = 100;

type SharedFetch = Shared<BoxFuture<'static, CoreResult<()>>>;

/// Schedules fetches against an [`AsyncFileSource`], deduplicating concurrent
/// requests for the same URI and bounding overall concurrency.
pub struct Updater {
    vfs: Arc<Vfs>,
    source: Arc<dyn AsyncFileSource>,
    semaphore: Arc<Semaphore>,
    pending_files: AsyncMutex<FxHashMap<Uri, SharedFetch>>,
    structure_pending: AsyncMutex<Option<SharedFetch>>,
    structure_done: AtomicBool,
}

impl Updater {
    pub fn new(vfs: Arc<Vfs>, source: Arc<dyn AsyncFileSource>) -> Self {
        Self::with_concurrency(vfs, source, DEFAULT_MAX_IN_FLIGHT)
    }

    pub fn with_concurrency(
        vfs: Arc<Vfs>,
        source: Arc<dyn AsyncFileSource>,
        max_in_flight: usize,
    ) -> Self {
        Updater {
            vfs,
            source,
            semaphore: Arc::new(Semaphore::new(max_in_flight)),
            pending_files: AsyncMutex::new(FxHashMap::default()),
            structure_pending: AsyncMutex::new(None),
            structure_done: AtomicBool::new(false),
        }
    }

    /// Completes once `vfs.read_if_available(uri)` is guaranteed to be
    /// `Some` (or the underlying fetch fails / is cancelled).
    pub async fn ensure_file(&self, uri: &Uri, cancel: Option<&CancellationToken>) -> CoreResult<()> {
        if self.vfs.read_if_available(uri).is_some() {
            return Ok(());
        }

        let shared = {
            let mut pending = self.pending_files.lock().await;
            match pending.get(uri) {
                Some(existing) => existing.clone(),
                None => {
                    let fut = self.spawn_file_fetch(uri.clone());
                    pending.insert(uri.clone(), fut.clone());
                    fut
                }
            }
        };

        let result = race(shared, cancel).await;
        // The underlying task is the single source of truth for this URI;
        // once it has resolved (success or failure) there is nothing further
        // to dedup, so drop the cache entry. A cancelled *caller* leaves the
        // entry (and the background task) alone for other subscribers.
        if result.is_some() {
            self.pending_files.lock().await.remove(uri);
        }
        result.unwrap_or(Err(CoreError::Cancelled))
    }

    /// Completes once the top-level file listing for the workspace root has
    /// been merged into the VFS as content-less `FileNode`s.
    pub async fn ensure_structure(&self, cancel: Option<&CancellationToken>) -> CoreResult<()> {
        if self.structure_done.load(Ordering::Acquire) {
            return Ok(());
        }

        let shared = {
            let mut pending = self.structure_pending.lock().await;
            match pending.as_ref() {
                Some(existing) => existing.clone(),
                None => {
                    let fut = self.spawn_structure_fetch();
                    *pending = Some(fut.clone());
                    fut
                }
            }
        };

        let result = race(shared, cancel).await;
        if let Some(Ok(())) = result {
            self.structure_done.store(true, Ordering::Release);
        }
        if result.is_some() {
            *self.structure_pending.lock().await = None;
        }
        result.unwrap_or(Err(CoreError::Cancelled))
    }

    /// Drops the cached fetch for `uri`, forcing the next `ensure_file` to
    /// refetch from the source.
    pub async fn invalidate(&self, uri: &Uri) {
        self.pending_files.lock().await.remove(uri);
        self.vfs.clear_content(uri);
    }

    /// Drops the cached structure fetch, forcing the next `ensure_structure`
    /// to relist the workspace root.
    pub async fn invalidate_structure(&self) {
        self.structure_done.store(false, Ordering::Release);
        *self.structure_pending.lock().await = None;
    }

    fn spawn_file_fetch(&self, uri: Uri) -> SharedFetch {
        let vfs = self.vfs.clone();
        let source = self.source.clone();
        let semaphore = self.semaphore.clone();
        let task = tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| CoreError::Cancelled)?;
            let content = source.read_file(&uri).await?;
            vfs.add(uri, Some(content));
            Ok(())
        });
        join_shared(task)
    }

    fn spawn_structure_fetch(&self) -> SharedFetch {
        let vfs = self.vfs.clone();
        let source = self.source.clone();
        let semaphore = self.semaphore.clone();
        let task = tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| CoreError::Cancelled)?;
            let files = source.list_files(None).await?;
            for uri in files {
                vfs.add(uri, None);
            }
            Ok(())
        });
        join_shared(task)
    }
}

fn join_shared(
    task: tokio::task::JoinHandle<CoreResult<()>>,
) -> SharedFetch {
    async move {
        match task.await {
            Ok(result) => result,
            Err(_) => Err(CoreError::Cancelled),
        }
    }
    .boxed()
    .shared()
}

/// Awaits `shared`, racing it against `cancel` if provided. `None` means the
/// *caller* was cancelled (the shared future keeps running for other
/// subscribers); `Some(result)` means the fetch itself resolved.
async fn race(shared: SharedFetch, cancel: Option<&CancellationToken>) -> Option<CoreResult<()>> {
    match cancel {
        None => Some(shared.await),
        Some(token) => tokio::select! {
            res = shared => Some(res),
            _ = token.cancelled() => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::LibraryBundle;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingSource {
        reads: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl AsyncFileSource for CountingSource {
        async fn list_files(&self, _base: Option<&Uri>) -> CoreResult<Vec<Uri>> {
            Ok(vec![Uri::from_normalized("file:///a.ts")])
        }

        async fn read_file(&self, uri: &Uri) -> CoreResult<String> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(format!("content of {uri}"))
        }
    }

    #[tokio::test]
    async fn concurrent_ensure_file_calls_dedup_to_one_source_read() {
        let vfs = Arc::new(Vfs::new(LibraryBundle::default()));
        let source = Arc::new(CountingSource {
            reads: AtomicUsize::new(0),
            delay: Duration::from_millis(30),
        });
        let updater = Arc::new(Updater::new(vfs.clone(), source.clone()));
        let uri = Uri::from_normalized("file:///a.ts");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let updater = updater.clone();
            let uri = uri.clone();
            handles.push(tokio::spawn(async move {
                updater.ensure_file(&uri, None).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(source.reads.load(Ordering::SeqCst), 1);
        assert_eq!(vfs.read_if_available(&uri), Some("content of file:///a.ts".into()));
    }

    #[tokio::test]
    async fn invalidate_forces_exactly_one_new_source_call() {
        let vfs = Arc::new(Vfs::new(LibraryBundle::default()));
        let source = Arc::new(CountingSource {
            reads: AtomicUsize::new(0),
            delay: Duration::from_millis(1),
        });
        let updater = Updater::new(vfs, source.clone());
        let uri = Uri::from_normalized("file:///a.ts");

        updater.ensure_file(&uri, None).await.unwrap();
        assert_eq!(source.reads.load(Ordering::SeqCst), 1);
        updater.ensure_file(&uri, None).await.unwrap();
        assert_eq!(source.reads.load(Ordering::SeqCst), 1, "already-available content short-circuits");

        updater.invalidate(&uri).await;
        updater.ensure_file(&uri, None).await.unwrap();
        assert_eq!(source.reads.load(Ordering::SeqCst), 2);
    }

    struct FailingSource;

    #[async_trait]
    impl AsyncFileSource for FailingSource {
        async fn list_files(&self, _base: Option<&Uri>) -> CoreResult<Vec<Uri>> {
            Ok(Vec::new())
        }

        async fn read_file(&self, uri: &Uri) -> CoreResult<String> {
            Err(CoreError::NotFound(uri.as_str().to_string()))
        }
    }

    #[tokio::test]
    async fn errored_fetch_allows_retry() {
        let vfs = Arc::new(Vfs::new(LibraryBundle::default()));
        let updater = Updater::new(vfs, Arc::new(FailingSource));
        let uri = Uri::from_normalized("file:///missing.ts");

        let err = updater.ensure_file(&uri, None).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
        // The pending entry was dropped; a second attempt issues a fresh
        // fetch rather than replaying a cached failure forever.
        let err2 = updater.ensure_file(&uri, None).await.unwrap_err();
        assert!(matches!(err2, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn cancelled_caller_does_not_abort_fetch_for_others() {
        let vfs = Arc::new(Vfs::new(LibraryBundle::default()));
        let source = Arc::new(CountingSource {
            reads: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
        });
        let updater = Arc::new(Updater::new(vfs.clone(), source.clone()));
        let uri = Uri::from_normalized("file:///a.ts");

        let token = CancellationToken::new();
        let updater2 = updater.clone();
        let uri2 = uri.clone();
        let other = tokio::spawn(async move { updater2.ensure_file(&uri2, None).await });

        tokio::time::sleep(Duration::from_millis(5)).await;
        token.cancel();
        let cancelled = updater.ensure_file(&uri, Some(&token)).await;
        assert!(matches!(cancelled, Err(CoreError::Cancelled)));

        other.await.unwrap().unwrap();
        assert!(vfs.read_if_available(&uri).is_some());
    }

    #[tokio::test]
    async fn ensure_structure_is_idempotent_until_invalidated() {
        let vfs = Arc::new(Vfs::new(LibraryBundle::default()));
        let source = Arc::new(CountingSource {
            reads: AtomicUsize::new(0),
            delay: Duration::from_millis(1),
        });
        let updater = Updater::new(vfs.clone(), source);
        updater.ensure_structure(None).await.unwrap();
        updater.ensure_structure(None).await.unwrap();
        assert!(vfs.has(&Uri::from_normalized("file:///a.ts")));

        updater.invalidate_structure().await;
        updater.ensure_structure(None).await.unwrap();
    }
}
