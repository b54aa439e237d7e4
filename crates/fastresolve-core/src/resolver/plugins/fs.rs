//! Plugins that consult the file system: existence checks and symlinks.

use crate::fs::FileSystem;
use crate::resolver::context::ResolveContext;
use crate::resolver::error::ResolveError;
use crate::resolver::hooks::{Pipeline, Stage, StagePlugin, Step};
use crate::resolver::request::ResolveRequest;
use fastresolve_util::path::{get_paths, join_path};
use futures::future::{BoxFuture, FutureExt};
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

/// Continue only if the path is an existing directory.
pub struct DirectoryExistsPlugin {
    fs: Arc<dyn FileSystem>,
    target: Stage,
}

impl DirectoryExistsPlugin {
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>, target: Stage) -> Self {
        Self { fs, target }
    }
}

impl StagePlugin for DirectoryExistsPlugin {
    fn name(&self) -> &'static str {
        "DirectoryExistsPlugin"
    }

    fn apply<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        request: &'a ResolveRequest,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Step, ResolveError>> {
        async move {
            let directory = &request.path;
            match self.fs.stat(directory).await {
                Err(_) => {
                    ctx.add_missing_dependency(directory.clone());
                    ctx.log(|| format!("{} doesn't exist", directory.display()));
                    Ok(Step::Continue)
                }
                Ok(stat) if !stat.is_dir => {
                    ctx.add_missing_dependency(directory.clone());
                    ctx.log(|| format!("{} is not a directory", directory.display()));
                    Ok(Step::Continue)
                }
                Ok(_) => {
                    ctx.add_file_dependency(directory.clone());
                    let message = ctx
                        .is_tracing()
                        .then(|| format!("existing directory {}", directory.display()));
                    pipeline
                        .forward(self.target, request.clone(), message, ctx)
                        .await
                }
            }
        }
        .boxed()
    }
}

/// Continue only if the path is an existing file.
pub struct FileExistsPlugin {
    fs: Arc<dyn FileSystem>,
    target: Stage,
}

impl FileExistsPlugin {
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>, target: Stage) -> Self {
        Self { fs, target }
    }
}

impl StagePlugin for FileExistsPlugin {
    fn name(&self) -> &'static str {
        "FileExistsPlugin"
    }

    fn apply<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        request: &'a ResolveRequest,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Step, ResolveError>> {
        async move {
            let file = &request.path;
            match self.fs.stat(file).await {
                Err(_) => {
                    ctx.add_missing_dependency(file.clone());
                    ctx.log(|| format!("{} doesn't exist", file.display()));
                    Ok(Step::Continue)
                }
                Ok(stat) if !stat.is_file => {
                    ctx.add_missing_dependency(file.clone());
                    ctx.log(|| format!("{} is not a file", file.display()));
                    Ok(Step::Continue)
                }
                Ok(_) => {
                    ctx.add_file_dependency(file.clone());
                    let message = ctx
                        .is_tracing()
                        .then(|| format!("existing file: {}", file.display()));
                    pipeline
                        .forward(self.target, request.clone(), message, ctx)
                        .await
                }
            }
        }
        .boxed()
    }
}

/// Replace symlinked components of the path with their targets.
///
/// Every ancestor is checked. An absolute link target discards everything
/// above it. Requests flagged `ignore_symlinks` pass through untouched.
pub struct SymlinkPlugin {
    fs: Arc<dyn FileSystem>,
    target: Stage,
}

impl SymlinkPlugin {
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>, target: Stage) -> Self {
        Self { fs, target }
    }
}

impl StagePlugin for SymlinkPlugin {
    fn name(&self) -> &'static str {
        "SymlinkPlugin"
    }

    fn apply<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        request: &'a ResolveRequest,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Step, ResolveError>> {
        async move {
            if request.ignore_symlinks {
                return Ok(Step::Continue);
            }

            let chain = get_paths(&request.path);
            let mut segments: Vec<OsString> = chain.segments;
            let mut contains_symlink = false;
            let mut stop_at = segments.len();

            for (index, path) in chain.paths.iter().enumerate() {
                ctx.add_file_dependency(path.clone());
                let Ok(link) = self.fs.readlink(path).await else {
                    continue;
                };
                if link.as_os_str().is_empty() {
                    continue;
                }
                contains_symlink = true;
                let absolute = link.is_absolute();
                segments[index] = link.into_os_string();
                if absolute {
                    stop_at = index + 1;
                    break;
                }
            }

            if !contains_symlink {
                return Ok(Step::Continue);
            }

            // Segments run leaf to root; rebuild from the root downwards.
            let mut parts = segments[..stop_at].iter().rev();
            let Some(first) = parts.next() else {
                return Ok(Step::Continue);
            };
            let resolved = parts.fold(PathBuf::from(first), |base, segment| {
                join_path(&base, segment.as_ref())
            });

            let mut next = request.clone();
            next.path = resolved;
            let message = ctx
                .is_tracing()
                .then(|| format!("resolved symlink to {}", next.path.display()));
            pipeline
                .forward_exclusive(self.target, next, message, ctx)
                .await
        }
        .boxed()
    }
}
