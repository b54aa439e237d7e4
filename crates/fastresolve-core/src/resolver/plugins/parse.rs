//! Entry plugins: the unsafe cache and request parsing.

use crate::options::CachePredicate;
use crate::resolver::cache::{cache_id, UnsafeCache};
use crate::resolver::context::ResolveContext;
use crate::resolver::error::ResolveError;
use crate::resolver::hooks::{Pipeline, Stage, StagePlugin, Step};
use crate::resolver::request::{ParsedRequest, ResolveRequest};
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;

/// Serve whole resolutions from a shared cache.
pub struct UnsafeCachePlugin {
    predicate: CachePredicate,
    cache: Arc<UnsafeCache>,
    with_context: bool,
    target: Stage,
}

impl UnsafeCachePlugin {
    #[must_use]
    pub fn new(
        predicate: CachePredicate,
        cache: Arc<UnsafeCache>,
        with_context: bool,
        target: Stage,
    ) -> Self {
        Self {
            predicate,
            cache,
            with_context,
            target,
        }
    }
}

impl StagePlugin for UnsafeCachePlugin {
    fn name(&self) -> &'static str {
        "UnsafeCachePlugin"
    }

    fn apply<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        request: &'a ResolveRequest,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Step, ResolveError>> {
        async move {
            if !(self.predicate)(request) {
                return pipeline.forward(self.target, request.clone(), None, ctx).await;
            }

            let key = cache_id(request, self.with_context);
            if let Some(hit) = self.cache.get(&key) {
                tracing::trace!(key = %key, "unsafe cache hit");
                return Ok(Step::Resolved(hit));
            }

            match pipeline.do_resolve(self.target, request.clone(), None, ctx).await? {
                Some(resolution) => Ok(Step::Resolved(self.cache.insert(key, resolution))),
                None => Ok(Step::Continue),
            }
        }
        .boxed()
    }
}

/// Split the raw request into path, query and fragment and classify it.
pub struct ParsePlugin {
    fully_specified: bool,
    target: Stage,
}

impl ParsePlugin {
    #[must_use]
    pub fn new(fully_specified: bool, target: Stage) -> Self {
        Self {
            fully_specified,
            target,
        }
    }
}

impl StagePlugin for ParsePlugin {
    fn name(&self) -> &'static str {
        "ParsePlugin"
    }

    fn apply<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        request: &'a ResolveRequest,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Step, ResolveError>> {
        async move {
            let parsed = ParsedRequest::parse(request.request.as_deref().unwrap_or(""));

            let mut next = request.clone();
            next.request = (!parsed.request.is_empty()).then_some(parsed.request);
            if !parsed.query.is_empty() {
                next.query = parsed.query;
            }
            if !parsed.fragment.is_empty() {
                next.fragment = parsed.fragment;
            }
            next.module = parsed.module;
            next.directory = parsed.directory;
            next.internal = parsed.internal;
            next.fully_specified = self.fully_specified;

            if next.module {
                ctx.log(|| "Parsed request is a module".to_string());
            }
            if next.directory {
                ctx.log(|| "Parsed request is a directory".to_string());
            }

            // `#` may be part of the path rather than a fragment; try that
            // reading first.
            if let Some(inner) = next.request.as_deref() {
                if next.query.is_empty() && !next.fragment.is_empty() {
                    let fragment = &next.fragment;
                    let directory = fragment.ends_with('/');
                    let fragment_part = if directory {
                        &fragment[..fragment.len() - 1]
                    } else {
                        fragment.as_str()
                    };
                    let mut alternative = next.clone();
                    alternative.directory = directory;
                    alternative.request = Some(format!(
                        "{inner}{}{fragment_part}",
                        if next.directory { "/" } else { "" },
                    ));
                    alternative.fragment = String::new();

                    if let Some(resolution) = pipeline
                        .do_resolve(self.target, alternative, None, ctx)
                        .await?
                    {
                        return Ok(Step::Resolved(resolution));
                    }
                }
            }

            pipeline.forward(self.target, next, None, ctx).await
        }
        .boxed()
    }
}
