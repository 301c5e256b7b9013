//! Request-scoped temporary files.
//!
//! Names come from a process-wide atomic counter combined with the process
//! id, so two acquisitions can never collide, even within the same
//! millisecond or across manager instances sharing a directory. A
//! `TempResource` deletes its file on `release()` or, failing that, on drop.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant, SystemTime};

/// File name prefix for every managed resource.
const PREFIX: &str = "sgw";

/// Longest accepted file suffix.
const MAX_SUFFIX_LEN: usize = 8;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Allocates uniquely named temp files inside one directory.
#[derive(Clone)]
pub struct TempResourceManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    dir: PathBuf,
    live: AtomicUsize,
    acquired: AtomicU64,
}

impl TempResourceManager {
    /// Creates the manager, creating `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            inner: Arc::new(ManagerInner {
                dir,
                live: AtomicUsize::new(0),
                acquired: AtomicU64::new(0),
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Reserves a fresh path ending in `.{suffix}`. The file itself is not
    /// created; the owner writes it.
    pub fn acquire(&self, suffix: &str) -> TempResource {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            "{PREFIX}-{}-{id}.{}",
            std::process::id(),
            sanitize_suffix(Some(suffix))
        );
        self.inner.live.fetch_add(1, Ordering::Relaxed);
        self.inner.acquired.fetch_add(1, Ordering::Relaxed);
        TempResource {
            path: self.inner.dir.join(name),
            created_at: Instant::now(),
            released: AtomicBool::new(false),
            owner: Arc::clone(&self.inner),
        }
    }

    /// Deletes the resource's file. Idempotent.
    pub fn release(&self, resource: &TempResource) -> io::Result<()> {
        resource.release()
    }

    /// Resources acquired and not yet released.
    pub fn live(&self) -> usize {
        self.inner.live.load(Ordering::Relaxed)
    }

    /// Total acquisitions since the manager was created.
    pub fn acquired_total(&self) -> u64 {
        self.inner.acquired.load(Ordering::Relaxed)
    }

    /// Removes files left behind by earlier processes (e.g. after a crash).
    ///
    /// Only files last modified at least `min_age` ago are removed, so a
    /// process still draining requests in the same directory keeps its
    /// in-flight files. Files owned by this process are untouched. Returns
    /// the count removed.
    pub fn purge_stale(&self, min_age: Duration) -> io::Result<usize> {
        let own = format!("{PREFIX}-{}-", std::process::id());
        let now = SystemTime::now();
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.inner.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.starts_with(&format!("{PREFIX}-")) || name.starts_with(&own) {
                continue;
            }
            // Unknown or future mtimes count as fresh.
            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            if age.is_none_or(|age| age < min_age) {
                continue;
            }
            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(file = name, error = %e, "failed to purge stale temp file"),
            }
        }
        Ok(removed)
    }
}

/// A temp file path owned by exactly one pipeline invocation.
pub struct TempResource {
    path: PathBuf,
    created_at: Instant,
    released: AtomicBool,
    owner: Arc<ManagerInner>,
}

impl TempResource {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Deletes the backing file if it exists. Safe to call repeatedly and
    /// on a resource that was never written.
    pub fn release(&self) -> io::Result<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.owner.live.fetch_sub(1, Ordering::Relaxed);
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for TempResource {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove temp file");
        }
    }
}

impl std::fmt::Debug for TempResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempResource")
            .field("path", &self.path)
            .field("released", &self.released.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Reduces a caller-supplied extension (or file name) to a short
/// alphanumeric suffix. Anything unusable becomes `bin`.
pub fn sanitize_suffix(name: Option<&str>) -> String {
    let candidate = name
        .map(|n| n.rsplit('.').next().unwrap_or(n))
        .unwrap_or_default();
    if candidate.is_empty()
        || candidate.len() > MAX_SUFFIX_LEN
        || !candidate.bytes().all(|b| b.is_ascii_alphanumeric())
    {
        return "bin".to_string();
    }
    candidate.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn manager() -> (tempfile::TempDir, TempResourceManager) {
        let dir = tempfile::tempdir().unwrap();
        let mgr = TempResourceManager::new(dir.path().join("work")).unwrap();
        (dir, mgr)
    }

    #[test]
    fn acquire_does_not_create_file() {
        let (_dir, mgr) = manager();
        let res = mgr.acquire("wav");
        assert!(!res.path().exists());
        assert!(res.path().starts_with(mgr.dir()));
        assert_eq!(res.path().extension().unwrap(), "wav");
        assert_eq!(mgr.live(), 1);
    }

    #[test]
    fn release_deletes_and_is_idempotent() {
        let (_dir, mgr) = manager();
        let res = mgr.acquire("wav");
        std::fs::write(res.path(), b"data").unwrap();

        mgr.release(&res).unwrap();
        assert!(!res.path().exists());
        assert_eq!(mgr.live(), 0);

        res.release().unwrap();
        assert_eq!(mgr.live(), 0);
    }

    #[test]
    fn release_of_unwritten_resource_is_ok() {
        let (_dir, mgr) = manager();
        let res = mgr.acquire("mp3");
        res.release().unwrap();
        assert_eq!(mgr.live(), 0);
    }

    #[test]
    fn drop_removes_file() {
        let (_dir, mgr) = manager();
        let path = {
            let res = mgr.acquire("bin");
            std::fs::write(res.path(), b"x").unwrap();
            res.path().to_path_buf()
        };
        assert!(!path.exists());
        assert_eq!(mgr.live(), 0);
        assert_eq!(mgr.acquired_total(), 1);
    }

    #[test]
    fn concurrent_acquire_yields_distinct_paths() {
        let (_dir, mgr) = manager();
        let paths: Vec<PathBuf> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        (0..125)
                            .map(|_| {
                                let res = mgr.acquire("wav");
                                res.path().to_path_buf()
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        assert_eq!(paths.len(), 1000);
        let unique: HashSet<_> = paths.iter().collect();
        assert_eq!(unique.len(), 1000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_async_acquire_yields_distinct_paths() {
        let (_dir, mgr) = manager();
        let tasks = (0..1000).map(|_| {
            let mgr = mgr.clone();
            tokio::spawn(async move { mgr.acquire("wav").path().to_path_buf() })
        });
        let paths: HashSet<PathBuf> = futures_util::future::join_all(tasks)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(paths.len(), 1000);
        assert_eq!(mgr.live(), 0);
    }

    fn backdate(path: &Path, by: Duration) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[test]
    fn purge_removes_old_foreign_files_only() {
        let (_dir, mgr) = manager();
        let stale = mgr.dir().join(format!("{PREFIX}-0-17.wav"));
        let unrelated = mgr.dir().join("notes.txt");
        std::fs::write(&stale, b"old").unwrap();
        std::fs::write(&unrelated, b"keep").unwrap();
        backdate(&stale, Duration::from_secs(3600));
        backdate(&unrelated, Duration::from_secs(3600));

        let own = mgr.acquire("wav");
        std::fs::write(own.path(), b"mine").unwrap();
        backdate(own.path(), Duration::from_secs(3600));

        assert_eq!(mgr.purge_stale(Duration::from_secs(60)).unwrap(), 1);
        assert!(!stale.exists());
        assert!(unrelated.exists());
        assert!(own.path().exists());
    }

    #[test]
    fn purge_spares_fresh_files_of_other_processes() {
        let (_dir, mgr) = manager();
        let in_flight = mgr
            .dir()
            .join(format!("{PREFIX}-{}-0.webm", std::process::id() + 1));
        std::fs::write(&in_flight, b"still uploading").unwrap();

        assert_eq!(mgr.purge_stale(Duration::from_secs(60)).unwrap(), 0);
        assert!(in_flight.exists());
    }

    #[test]
    fn suffix_sanitizing() {
        assert_eq!(sanitize_suffix(Some("clip.M4A")), "m4a");
        assert_eq!(sanitize_suffix(Some("webm")), "webm");
        assert_eq!(sanitize_suffix(Some("../../etc/passwd")), "bin");
        assert_eq!(sanitize_suffix(Some("a.tar.gz")), "gz");
        assert_eq!(sanitize_suffix(Some("x.waytoolongsuffix")), "bin");
        assert_eq!(sanitize_suffix(Some("")), "bin");
        assert_eq!(sanitize_suffix(None), "bin");
    }
}
