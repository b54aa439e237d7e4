//! Plugins that route requests between stages or rewrite their path.

use crate::resolver::context::ResolveContext;
use crate::resolver::error::ResolveError;
use crate::resolver::hooks::{Pipeline, Stage, StagePlugin, Step};
use crate::resolver::request::ResolveRequest;
use fastresolve_util::path::{append, join, join_relative};
use futures::future::{BoxFuture, FutureExt};
use std::path::PathBuf;

/// Forward unchanged.
pub struct NextPlugin {
    target: Stage,
}

impl NextPlugin {
    #[must_use]
    pub fn new(target: Stage) -> Self {
        Self { target }
    }
}

impl StagePlugin for NextPlugin {
    fn name(&self) -> &'static str {
        "NextPlugin"
    }

    fn apply<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        request: &'a ResolveRequest,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Step, ResolveError>> {
        pipeline
            .forward(self.target, request.clone(), None, ctx)
            .boxed()
    }
}

/// Forward unchanged, logging a fixed message.
pub struct TryNextPlugin {
    message: &'static str,
    target: Stage,
}

impl TryNextPlugin {
    #[must_use]
    pub fn new(message: &'static str, target: Stage) -> Self {
        Self { message, target }
    }
}

impl StagePlugin for TryNextPlugin {
    fn name(&self) -> &'static str {
        "TryNextPlugin"
    }

    fn apply<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        request: &'a ResolveRequest,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Step, ResolveError>> {
        let message = ctx.is_tracing().then(|| self.message.to_string());
        pipeline
            .forward(self.target, request.clone(), message, ctx)
            .boxed()
    }
}

/// A predicate over request flags. Unset fields match anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestFilter {
    pub module: Option<bool>,
    pub internal: Option<bool>,
    pub directory: Option<bool>,
    pub fully_specified: Option<bool>,
    pub request: Option<&'static str>,
}

impl RequestFilter {
    #[must_use]
    pub fn matches(&self, request: &ResolveRequest) -> bool {
        self.module.map_or(true, |v| request.module == v)
            && self.internal.map_or(true, |v| request.internal == v)
            && self.directory.map_or(true, |v| request.directory == v)
            && self
                .fully_specified
                .map_or(true, |v| request.fully_specified == v)
            && self
                .request
                .map_or(true, |v| request.request.as_deref() == Some(v))
    }
}

/// Forward only requests matching a filter.
///
/// Without `allow_alternatives`, a matching request that misses in the
/// target halts the current stage.
pub struct ConditionalPlugin {
    filter: RequestFilter,
    message: Option<&'static str>,
    allow_alternatives: bool,
    target: Stage,
}

impl ConditionalPlugin {
    #[must_use]
    pub fn new(
        filter: RequestFilter,
        message: Option<&'static str>,
        allow_alternatives: bool,
        target: Stage,
    ) -> Self {
        Self {
            filter,
            message,
            allow_alternatives,
            target,
        }
    }
}

impl StagePlugin for ConditionalPlugin {
    fn name(&self) -> &'static str {
        "ConditionalPlugin"
    }

    fn apply<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        request: &'a ResolveRequest,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Step, ResolveError>> {
        async move {
            if !self.filter.matches(request) {
                return Ok(Step::Continue);
            }
            let message = self.message.map(ToString::to_string);
            if self.allow_alternatives {
                pipeline.forward(self.target, request.clone(), message, ctx).await
            } else {
                pipeline
                    .forward_exclusive(self.target, request.clone(), message, ctx)
                    .await
            }
        }
        .boxed()
    }
}

/// Join the remaining request onto the path.
pub struct JoinRequestPlugin {
    target: Stage,
}

impl JoinRequestPlugin {
    #[must_use]
    pub fn new(target: Stage) -> Self {
        Self { target }
    }
}

impl StagePlugin for JoinRequestPlugin {
    fn name(&self) -> &'static str {
        "JoinRequestPlugin"
    }

    fn apply<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        request: &'a ResolveRequest,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Step, ResolveError>> {
        let inner = request.request.as_deref().unwrap_or("");
        let mut next = request.clone();
        next.path = join(&request.path, inner);
        next.relative_path = request
            .relative_path
            .as_deref()
            .map(|relative| join_relative(relative, inner));
        next.request = None;
        pipeline.forward(self.target, next, None, ctx).boxed()
    }
}

/// Split a module request into the package directory and the rest.
///
/// `./@scope/pkg/lib/x` becomes path `<path>/@scope/pkg` with request
/// `./lib/x`.
pub struct JoinRequestPartPlugin {
    target: Stage,
}

impl JoinRequestPartPlugin {
    #[must_use]
    pub fn new(target: Stage) -> Self {
        Self { target }
    }
}

/// Position of the `/` that ends the package name in `./name/...` or
/// `./@scope/name/...`.
fn package_name_end(request: &str) -> Option<usize> {
    let bytes = request.as_bytes();
    let slash_after = |from: usize| {
        bytes
            .iter()
            .skip(from)
            .position(|&b| b == b'/')
            .map(|i| i + from)
    };
    let first = slash_after(3)?;
    if bytes.get(2) == Some(&b'@') {
        return slash_after(first + 1);
    }
    Some(first)
}

impl StagePlugin for JoinRequestPartPlugin {
    fn name(&self) -> &'static str {
        "JoinRequestPartPlugin"
    }

    fn apply<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        request: &'a ResolveRequest,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Step, ResolveError>> {
        let inner = request.request.as_deref().unwrap_or("");
        let (module_name, remaining, fully_specified) = match package_name_end(inner) {
            Some(end) => (
                &inner[..end],
                format!(".{}", &inner[end..]),
                request.fully_specified,
            ),
            None => (inner, ".".to_string(), false),
        };

        let mut next = request.clone();
        next.path = join(&request.path, module_name);
        next.relative_path = request
            .relative_path
            .as_deref()
            .map(|relative| join_relative(relative, module_name));
        next.request = Some(remaining);
        next.fully_specified = fully_specified;
        pipeline.forward(self.target, next, None, ctx).boxed()
    }
}

/// Treat the path as a directory and look for a named file in it.
pub struct UseFilePlugin {
    filename: String,
    target: Stage,
}

impl UseFilePlugin {
    #[must_use]
    pub fn new(filename: impl Into<String>, target: Stage) -> Self {
        Self {
            filename: filename.into(),
            target,
        }
    }
}

impl StagePlugin for UseFilePlugin {
    fn name(&self) -> &'static str {
        "UseFilePlugin"
    }

    fn apply<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        request: &'a ResolveRequest,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Step, ResolveError>> {
        let mut next = request.clone();
        next.path = join(&request.path, &self.filename);
        next.relative_path = request
            .relative_path
            .as_deref()
            .map(|relative| join_relative(relative, &self.filename));
        let message = ctx
            .is_tracing()
            .then(|| format!("using path: {}", next.path.display()));
        pipeline.forward(self.target, next, message, ctx).boxed()
    }
}

/// Append a suffix such as an extension.
pub struct AppendPlugin {
    suffix: String,
    target: Stage,
}

impl AppendPlugin {
    #[must_use]
    pub fn new(suffix: impl Into<String>, target: Stage) -> Self {
        Self {
            suffix: suffix.into(),
            target,
        }
    }
}

impl StagePlugin for AppendPlugin {
    fn name(&self) -> &'static str {
        "AppendPlugin"
    }

    fn apply<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        request: &'a ResolveRequest,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Step, ResolveError>> {
        let mut next = request.clone();
        next.path = append(&request.path, &self.suffix);
        next.relative_path = request
            .relative_path
            .as_ref()
            .map(|relative| format!("{relative}{}", self.suffix));
        let message = Some(self.suffix.clone());
        pipeline.forward(self.target, next, message, ctx).boxed()
    }
}

/// Resolve server-relative requests (`/x`) against each root directory.
pub struct RootsPlugin {
    roots: Vec<PathBuf>,
    target: Stage,
}

impl RootsPlugin {
    #[must_use]
    pub fn new(roots: Vec<PathBuf>, target: Stage) -> Self {
        Self { roots, target }
    }
}

impl StagePlugin for RootsPlugin {
    fn name(&self) -> &'static str {
        "RootsPlugin"
    }

    fn apply<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        request: &'a ResolveRequest,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Step, ResolveError>> {
        async move {
            let Some(inner) = request.request.as_deref() else {
                return Ok(Step::Continue);
            };
            let Some(rest) = inner.strip_prefix('/') else {
                return Ok(Step::Continue);
            };

            for root in &self.roots {
                let path = join(root, rest);
                let mut next = request.clone();
                next.relative_path = request
                    .relative_path
                    .as_ref()
                    .map(|_| path.to_string_lossy().into_owned());
                next.path = path;
                next.request = None;
                let message = ctx
                    .is_tracing()
                    .then(|| format!("root path {}", root.display()));
                if let Some(resolution) = pipeline.do_resolve(self.target, next, message, ctx).await? {
                    return Ok(Step::Resolved(resolution));
                }
            }
            Ok(Step::Continue)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_name_end() {
        assert_eq!(package_name_end("./lodash"), None);
        assert_eq!(package_name_end("./lodash/fp"), Some(8));
        assert_eq!(package_name_end("./@scope/pkg"), None);
        assert_eq!(package_name_end("./@scope/pkg/lib/x"), Some(12));
        assert_eq!(package_name_end("./a/b"), Some(3));
    }

    #[test]
    fn test_request_filter() {
        let mut request = ResolveRequest::default();
        request.module = true;
        request.request = Some(".".into());

        assert!(RequestFilter::default().matches(&request));
        assert!(RequestFilter {
            module: Some(true),
            ..Default::default()
        }
        .matches(&request));
        assert!(!RequestFilter {
            internal: Some(true),
            ..Default::default()
        }
        .matches(&request));
        assert!(RequestFilter {
            request: Some("."),
            ..Default::default()
        }
        .matches(&request));
    }
}
