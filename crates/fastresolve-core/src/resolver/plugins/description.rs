use crate::fs::FileSystem;
use crate::resolver::context::ResolveContext;
use crate::resolver::description_file::{relative_path_in, DescriptionFileCache};
use crate::resolver::error::ResolveError;
use crate::resolver::hooks::{Pipeline, Stage, StagePlugin, Step};
use crate::resolver::request::ResolveRequest;
use crate::resolver::trace::ResolveTraceStep;
use fastresolve_util::path::cd_up;
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;

/// Attach the nearest description file to the request.
///
/// With `path_is_file` the lookup starts at the parent of the path. A
/// request with no description file above it continues unchanged.
pub struct DescriptionFilePlugin {
    fs: Arc<dyn FileSystem>,
    cache: Arc<DescriptionFileCache>,
    filenames: Vec<String>,
    path_is_file: bool,
    target: Stage,
}

impl DescriptionFilePlugin {
    #[must_use]
    pub fn new(
        fs: Arc<dyn FileSystem>,
        cache: Arc<DescriptionFileCache>,
        filenames: Vec<String>,
        path_is_file: bool,
        target: Stage,
    ) -> Self {
        Self {
            fs,
            cache,
            filenames,
            path_is_file,
            target,
        }
    }
}

impl StagePlugin for DescriptionFilePlugin {
    fn name(&self) -> &'static str {
        "DescriptionFilePlugin"
    }

    fn apply<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        request: &'a ResolveRequest,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Step, ResolveError>> {
        async move {
            let directory = if self.path_is_file {
                match cd_up(&request.path) {
                    Some(parent) => parent,
                    None => return Ok(Step::Continue),
                }
            } else {
                request.path.as_path()
            };

            let Some(file) = self
                .cache
                .load(self.fs.as_ref(), directory, &self.filenames, ctx)
                .await?
            else {
                ctx.log_step(|depth| {
                    ResolveTraceStep::new(
                        depth,
                        format!(
                            "No description file found in {} or above",
                            directory.display()
                        ),
                    )
                    .with_path(directory)
                });
                return Ok(Step::Continue);
            };

            let relative = relative_path_in(&file.directory, &request.path)
                .unwrap_or_else(|| ".".to_string());

            let mut next = request.clone();
            next.description_file_path = Some(file.path.clone());
            next.description_file_root = Some(file.directory.clone());
            next.description_file_data = Some(file.content.clone());
            next.relative_path = Some(relative.clone());

            let message = ctx.is_tracing().then(|| {
                format!(
                    "using description file: {} (relative path: {relative})",
                    file.path.display()
                )
            });
            pipeline
                .forward_exclusive(self.target, next, message, ctx)
                .await
        }
        .boxed()
    }
}
