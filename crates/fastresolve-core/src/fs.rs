//! Filesystem abstraction used by the resolver.
//!
//! Resolution never touches `std::fs` directly. Plugins go through
//! [`FileSystem`], so callers can inject an in-memory or instrumented
//! implementation, or route everything through blocking calls with
//! [`SyncAsyncFileSystem`].

use futures::future::{self, BoxFuture, FutureExt};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The subset of metadata the resolver cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileStat {
    pub is_file: bool,
    pub is_dir: bool,
}

impl FileStat {
    #[must_use]
    pub fn file() -> Self {
        Self {
            is_file: true,
            is_dir: false,
        }
    }

    #[must_use]
    pub fn dir() -> Self {
        Self {
            is_file: false,
            is_dir: true,
        }
    }
}

impl From<std::fs::Metadata> for FileStat {
    fn from(meta: std::fs::Metadata) -> Self {
        Self {
            is_file: meta.is_file(),
            is_dir: meta.is_dir(),
        }
    }
}

/// Asynchronous filesystem operations.
///
/// `stat` follows symlinks. `readlink` fails for anything that is not a link.
pub trait FileSystem: Send + Sync + fmt::Debug {
    fn stat<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<FileStat>>;
    fn read_file<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<Vec<u8>>>;
    fn readlink<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<PathBuf>>;
}

/// Blocking filesystem operations.
pub trait SyncFileSystem: Send + Sync + fmt::Debug {
    fn stat_sync(&self, path: &Path) -> io::Result<FileStat>;
    fn read_file_sync(&self, path: &Path) -> io::Result<Vec<u8>>;
    fn readlink_sync(&self, path: &Path) -> io::Result<PathBuf>;
}

/// The real filesystem, via `tokio::fs` or `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn stat<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<FileStat>> {
        async move { tokio::fs::metadata(path).await.map(FileStat::from) }.boxed()
    }

    fn read_file<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<Vec<u8>>> {
        async move { tokio::fs::read(path).await }.boxed()
    }

    fn readlink<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<PathBuf>> {
        async move { tokio::fs::read_link(path).await }.boxed()
    }
}

impl SyncFileSystem for OsFileSystem {
    fn stat_sync(&self, path: &Path) -> io::Result<FileStat> {
        std::fs::metadata(path).map(FileStat::from)
    }

    fn read_file_sync(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn readlink_sync(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::read_link(path)
    }
}

/// Presents a [`SyncFileSystem`] as a [`FileSystem`].
///
/// Every future is already complete when returned, so a resolution using
/// this adapter never yields to the executor.
#[derive(Debug, Clone)]
pub struct SyncAsyncFileSystem {
    inner: Arc<dyn SyncFileSystem>,
}

impl SyncAsyncFileSystem {
    #[must_use]
    pub fn new(inner: Arc<dyn SyncFileSystem>) -> Self {
        Self { inner }
    }
}

impl FileSystem for SyncAsyncFileSystem {
    fn stat<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<FileStat>> {
        future::ready(self.inner.stat_sync(path)).boxed()
    }

    fn read_file<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<Vec<u8>>> {
        future::ready(self.inner.read_file_sync(path)).boxed()
    }

    fn readlink<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<PathBuf>> {
        future::ready(self.inner.readlink_sync(path)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_os_stat() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.js");
        std::fs::write(&file, "").unwrap();

        let fs = OsFileSystem;
        assert_eq!(FileSystem::stat(&fs, &file).await.unwrap(), FileStat::file());
        assert_eq!(FileSystem::stat(&fs, dir.path()).await.unwrap(), FileStat::dir());
        assert!(FileSystem::stat(&fs, &dir.path().join("missing")).await.is_err());
    }

    #[test]
    fn test_sync_adapter_completes_immediately() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("package.json");
        std::fs::write(&file, "{}").unwrap();

        let fs = SyncAsyncFileSystem::new(Arc::new(OsFileSystem));
        let bytes = fs.read_file(&file).now_or_never().unwrap().unwrap();
        assert_eq!(bytes, b"{}");
        let stat = fs.stat(dir.path()).now_or_never().unwrap().unwrap();
        assert!(stat.is_dir);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_readlink() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("real.js");
        std::fs::write(&target, "").unwrap();
        let link = dir.path().join("link.js");
        std::os::unix::fs::symlink("real.js", &link).unwrap();

        let fs = OsFileSystem;
        assert_eq!(
            FileSystem::readlink(&fs, &link).await.unwrap(),
            PathBuf::from("real.js")
        );
        assert!(FileSystem::readlink(&fs, &target).await.is_err());
    }
}
