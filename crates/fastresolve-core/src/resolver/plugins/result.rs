use crate::options::Restriction;
use crate::resolver::context::ResolveContext;
use crate::resolver::error::ResolveError;
use crate::resolver::hooks::{Pipeline, StagePlugin, Step};
use crate::resolver::request::{Resolution, ResolveRequest};
use fastresolve_util::path::is_inside;
use futures::future::{self, BoxFuture, FutureExt};
use std::sync::Arc;

/// Reject resolved paths outside the permitted restrictions.
///
/// A path passes when it matches at least one restriction.
pub struct RestrictionsPlugin {
    restrictions: Vec<Restriction>,
}

impl RestrictionsPlugin {
    #[must_use]
    pub fn new(restrictions: Vec<Restriction>) -> Self {
        Self { restrictions }
    }

    fn permits(&self, request: &ResolveRequest) -> bool {
        let path = request.path_str();
        self.restrictions.iter().any(|restriction| match restriction {
            Restriction::Path(dir) => is_inside(&request.path, dir),
            Restriction::Pattern(regex) => regex.is_match(&path),
        })
    }
}

impl StagePlugin for RestrictionsPlugin {
    fn name(&self) -> &'static str {
        "RestrictionsPlugin"
    }

    fn apply<'a>(
        &'a self,
        _pipeline: &'a Pipeline,
        request: &'a ResolveRequest,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Step, ResolveError>> {
        let outcome = if self.restrictions.is_empty() || self.permits(request) {
            Ok(Step::Continue)
        } else {
            ctx.log(|| format!("{} is not inside the restrictions", request.path.display()));
            Err(ResolveError::Restricted {
                path: request.path.clone(),
            })
        };
        future::ready(outcome).boxed()
    }
}

/// Report the request as the final result.
pub struct ResultPlugin;

impl StagePlugin for ResultPlugin {
    fn name(&self) -> &'static str {
        "ResultPlugin"
    }

    fn apply<'a>(
        &'a self,
        _pipeline: &'a Pipeline,
        request: &'a ResolveRequest,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Step, ResolveError>> {
        ctx.log(|| format!("reporting result {}", request.path.display()));
        tracing::debug!(path = %request.path.display(), "resolved");
        future::ready(Ok(Step::Resolved(Arc::new(Resolution::File(
            request.clone(),
        )))))
        .boxed()
    }
}
