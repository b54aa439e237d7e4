//! Module directory lookup.

use crate::fs::FileSystem;
use crate::resolver::context::ResolveContext;
use crate::resolver::error::ResolveError;
use crate::resolver::hooks::{Pipeline, Stage, StagePlugin, Step};
use crate::resolver::request::ResolveRequest;
use fastresolve_util::path::{get_paths, join};
use futures::future::{BoxFuture, FutureExt};
use std::path::PathBuf;
use std::sync::Arc;

/// Search for the module in each named directory of every ancestor of the
/// request path, nearest first.
pub struct ModulesInHierarchicalDirectoriesPlugin {
    fs: Arc<dyn FileSystem>,
    directories: Vec<String>,
    target: Stage,
}

impl ModulesInHierarchicalDirectoriesPlugin {
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>, directories: Vec<String>, target: Stage) -> Self {
        Self {
            fs,
            directories,
            target,
        }
    }
}

impl StagePlugin for ModulesInHierarchicalDirectoriesPlugin {
    fn name(&self) -> &'static str {
        "ModulesInHierarchicalDirectoriesPlugin"
    }

    fn apply<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        request: &'a ResolveRequest,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Step, ResolveError>> {
        async move {
            let inner = request.request.as_deref().unwrap_or("");
            let candidates: Vec<PathBuf> = get_paths(&request.path)
                .paths
                .iter()
                .flat_map(|ancestor| {
                    self.directories
                        .iter()
                        .map(move |directory| join(ancestor, directory))
                })
                .collect();

            for candidate in candidates {
                match self.fs.stat(&candidate).await {
                    Ok(stat) if stat.is_dir => {
                        let mut next = request.clone();
                        next.request = Some(format!("./{inner}"));
                        next.module = false;
                        let message = ctx.is_tracing().then(|| {
                            format!("looking for modules in {}", candidate.display())
                        });
                        next.path = candidate;
                        if let Some(resolution) =
                            pipeline.do_resolve(self.target, next, message, ctx).await?
                        {
                            return Ok(Step::Resolved(resolution));
                        }
                    }
                    _ => {
                        ctx.log(|| format!("{} doesn't exist or is not a directory", candidate.display()));
                        ctx.add_missing_dependency(candidate);
                    }
                }
            }
            Ok(Step::Continue)
        }
        .boxed()
    }
}

/// Search for the module in one absolute directory.
pub struct ModulesInRootPlugin {
    root: PathBuf,
    target: Stage,
}

impl ModulesInRootPlugin {
    #[must_use]
    pub fn new(root: PathBuf, target: Stage) -> Self {
        Self { root, target }
    }
}

impl StagePlugin for ModulesInRootPlugin {
    fn name(&self) -> &'static str {
        "ModulesInRootPlugin"
    }

    fn apply<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        request: &'a ResolveRequest,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Step, ResolveError>> {
        let mut next = request.clone();
        next.path.clone_from(&self.root);
        next.request = Some(format!("./{}", request.request.as_deref().unwrap_or("")));
        next.module = false;
        let message = ctx
            .is_tracing()
            .then(|| format!("looking for modules in {}", self.root.display()));
        pipeline.forward(self.target, next, message, ctx).boxed()
    }
}
