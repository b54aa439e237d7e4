//! The resolver handle: runs requests through the pipeline and explains
//! failures.

use super::cache::UnsafeCache;
use super::context::ResolveContext;
use super::description_file::DescriptionFileCache;
use super::error::ResolveError;
use super::factory;
use super::hooks::{Pipeline, PipelineBuilder, Stage};
use super::request::{ContextInfo, Resolution, ResolveRequest};
use crate::options::{ModulesEntry, ResolveOptions, UserResolveOptions};
use futures::future::BoxFuture;
use futures::FutureExt;
use regex_lite::Regex;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

struct ResolverInner {
    user: UserResolveOptions,
    options: ResolveOptions,
    pipeline: Pipeline,
    description_files: Arc<DescriptionFileCache>,
}

/// A configured resolver. Cheap to clone; clones share the pipeline and
/// caches.
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<ResolverInner>,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("options", &self.inner.options)
            .field("description_files", &self.inner.description_files.len())
            .finish_non_exhaustive()
    }
}

impl Resolver {
    pub(crate) fn from_parts(
        user: UserResolveOptions,
        options: ResolveOptions,
        pipeline: Pipeline,
        description_files: Arc<DescriptionFileCache>,
    ) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                user,
                options,
                pipeline,
                description_files,
            }),
        }
    }

    #[must_use]
    pub fn options(&self) -> &ResolveOptions {
        &self.inner.options
    }

    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    #[must_use]
    pub fn description_files(&self) -> &Arc<DescriptionFileCache> {
        &self.inner.description_files
    }

    #[must_use]
    pub fn unsafe_cache(&self) -> Option<&Arc<UnsafeCache>> {
        self.inner.options.unsafe_cache.as_ref()
    }

    /// Derive a resolver with some options replaced.
    ///
    /// The derived resolver keeps the file system, description file cache
    /// and plugins of this one unless `overrides` sets them.
    ///
    /// # Errors
    /// Returns `InvalidConfig` when the merged options do not normalize.
    pub fn with_options(&self, overrides: UserResolveOptions) -> Result<Self, ResolveError> {
        let mut merged = self.inner.user.clone().merge(overrides);
        if merged.file_system.is_none() {
            merged.file_system = Some(Arc::clone(&self.inner.options.file_system));
        }
        factory::build(
            PipelineBuilder::new(),
            merged,
            Arc::clone(&self.inner.description_files),
        )
    }

    /// Resolve `request` against the directory `context`.
    ///
    /// On a miss the error carries the trace of a second, logged attempt
    /// and any hints the diagnostic probes came up with.
    ///
    /// # Errors
    /// Returns `NotFound` when nothing matched, or the first error raised
    /// by a plugin.
    pub async fn resolve(
        &self,
        context_info: ContextInfo,
        context: &Path,
        request: &str,
        ctx: &mut ResolveContext,
    ) -> Result<Arc<Resolution>, ResolveError> {
        match self
            .try_resolve(context_info.clone(), context, request, ctx)
            .await
        {
            Err(ResolveError::NotFound {
                request: failed,
                context: failed_context,
                details,
                mut hints,
            }) => {
                hints.extend(self.hints(&context_info, context, request).await);
                Err(ResolveError::NotFound {
                    request: failed,
                    context: failed_context,
                    details,
                    hints,
                })
            }
            outcome => outcome,
        }
    }

    /// Like [`Resolver::resolve`], without running the diagnostic probes.
    ///
    /// # Errors
    /// Returns `NotFound` when nothing matched, or the first error raised
    /// by a plugin.
    pub fn try_resolve<'a>(
        &'a self,
        context_info: ContextInfo,
        context: &'a Path,
        request: &'a str,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Arc<Resolution>, ResolveError>> {
        async move {
            let start = ResolveRequest::new(context_info, context, request);
            let message = || format!("resolve '{request}' in '{}'", context.display());

            let first = ctx.is_tracing().then(message);
            if let Some(resolution) = self
                .inner
                .pipeline
                .do_resolve(Stage::Resolve, start.clone(), first, ctx)
                .await?
            {
                tracing::debug!(request, resource = ?resolution.resource(), "resolved");
                return Ok(resolution);
            }

            let details = if ctx.is_tracing() {
                ctx.trace_lines()
            } else {
                let mut traced = ResolveContext::traced();
                let retried = self
                    .inner
                    .pipeline
                    .do_resolve(Stage::Resolve, start, Some(message()), &mut traced)
                    .await;
                let details = traced.trace_lines();
                ctx.absorb_dependencies(traced);
                if let Some(resolution) = retried? {
                    return Ok(resolution);
                }
                details
            };

            tracing::debug!(request, context = %context.display(), "not found");
            Err(ResolveError::NotFound {
                request: request.to_string(),
                context: context.to_path_buf(),
                details,
                hints: Vec::new(),
            })
        }
        .boxed()
    }

    async fn hints(&self, context_info: &ContextInfo, context: &Path, request: &str) -> Vec<String> {
        let (fully_specified, enforce_extension, relative) = futures::join!(
            self.fully_specified_hint(context_info, context, request),
            self.enforce_extension_hint(context_info, context, request),
            self.relative_hint(context_info, context, request),
        );
        [fully_specified, enforce_extension, relative]
            .into_iter()
            .flatten()
            .collect()
    }

    /// Resolve with a derived resolver on a fresh context; any failure
    /// yields `None`.
    async fn probe(
        &self,
        overrides: Option<UserResolveOptions>,
        context_info: &ContextInfo,
        context: &Path,
        request: &str,
    ) -> Option<Arc<Resolution>> {
        let resolver = match overrides {
            Some(overrides) => self.with_options(overrides).ok()?,
            None => self.clone(),
        };
        let mut ctx = ResolveContext::new();
        resolver
            .try_resolve(context_info.clone(), context, request, &mut ctx)
            .await
            .ok()
    }

    async fn fully_specified_hint(
        &self,
        context_info: &ContextInfo,
        context: &Path,
        request: &str,
    ) -> Option<String> {
        if !self.options().fully_specified {
            return None;
        }
        let overrides = UserResolveOptions {
            fully_specified: Some(false),
            ..UserResolveOptions::default()
        };
        let resolution = self
            .probe(Some(overrides), context_info, context, request)
            .await?;
        let file = resolution.path()?.file_name()?.to_string_lossy().into_owned();
        Some(format!(
            "Did you mean '{file}'?\n\
             BREAKING CHANGE: The request '{request}' failed to resolve only because it was \
             resolved as fully specified.\n\
             The extension in the request is mandatory for it to be fully specified.\n\
             Add the extension to the request."
        ))
    }

    async fn enforce_extension_hint(
        &self,
        context_info: &ContextInfo,
        context: &Path,
        request: &str,
    ) -> Option<String> {
        if !self.options().enforce_extension {
            return None;
        }
        let overrides = UserResolveOptions {
            enforce_extension: Some(false),
            extensions: Some(Vec::new()),
            ..UserResolveOptions::default()
        };
        let resolution = self
            .probe(Some(overrides), context_info, context, request)
            .await?;
        resolution.path()?;

        let extension = Regex::new(r"(\.[^.]+)(\?|$)").ok()?;
        let hint = match extension.captures(request) {
            Some(captures) => {
                let found = captures.get(1).map_or("", |m| m.as_str());
                let fixed = extension.replace(request, "$2");
                if self.options().extensions.contains(found) {
                    format!("Did you mean '{fixed}'?")
                } else {
                    format!(
                        "Did you mean '{fixed}'? Also note that '{found}' is not in \
                         'extensions' yet and needs to be added for this to work."
                    )
                }
            }
            None => "Did you mean to omit the extension or to remove 'enforceExtension'?"
                .to_string(),
        };
        Some(format!(
            "The request '{request}' failed to resolve only because 'enforceExtension' was specified.\n\
             {hint}\n\
             Including the extension in the request is no longer possible. Did you mean to \
             enforce including the extension in requests with 'extensions: []' instead?"
        ))
    }

    async fn relative_hint(
        &self,
        context_info: &ContextInfo,
        context: &Path,
        request: &str,
    ) -> Option<String> {
        if request.starts_with("./") || request.starts_with("../") || self.options().prefer_relative
        {
            return None;
        }
        let relative = format!("./{request}");
        self.probe(None, context_info, context, &relative)
            .await?
            .path()?;

        let directories = self
            .options()
            .modules
            .iter()
            .map(|entry| match entry {
                ModulesEntry::Hierarchical(names) => names.join(", "),
                ModulesEntry::Root(root) => root.display().to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        Some(format!(
            "Did you mean './{request}'?\n\
             Requests that should resolve in the current directory need to start with './'.\n\
             Requests that start with a name are treated as module requests and resolve within \
             module directories ({directories}).\n\
             If changing the source code is not an option there is also a resolve option called \
             'preferRelative' which tries to resolve these kind of requests in the current \
             directory too."
        ))
    }
}
