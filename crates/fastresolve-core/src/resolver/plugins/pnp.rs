//! Plug'n'Play package lookup.

use crate::resolver::context::ResolveContext;
use crate::resolver::error::ResolveError;
use crate::resolver::hooks::{Pipeline, Stage, StagePlugin, Step};
use crate::resolver::request::ResolveRequest;
use futures::future::{BoxFuture, FutureExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PnpError {
    /// The issuer does not declare the package. Resolution falls back to
    /// the remaining module lookups.
    #[error("undeclared dependency: {0}")]
    UndeclaredDependency(String),

    #[error("{0}")]
    Other(String),
}

/// A Plug'n'Play resolution backend.
pub trait PnpApi: Send + Sync {
    /// Map a package name requested from `issuer` to the package directory.
    ///
    /// `Ok(None)` means the backend has no opinion.
    ///
    /// # Errors
    /// Returns `UndeclaredDependency` for packages the issuer may not use.
    fn resolve_to_unqualified(
        &self,
        request: &str,
        issuer: &Path,
    ) -> Result<Option<PathBuf>, PnpError>;
}

/// Split `@scope/name/rest` or `name/rest` into the package name.
fn package_name(request: &str) -> Option<&str> {
    let end = if request.starts_with('@') {
        let scope_end = request.find('/')?;
        request[scope_end + 1..]
            .find('/')
            .map_or(request.len(), |i| scope_end + 1 + i)
    } else {
        request.find('/').unwrap_or(request.len())
    };
    let name = &request[..end];
    (!name.is_empty()).then_some(name)
}

/// Resolve module requests through a [`PnpApi`].
pub struct PnpPlugin {
    api: Arc<dyn PnpApi>,
    target: Stage,
}

impl PnpPlugin {
    #[must_use]
    pub fn new(api: Arc<dyn PnpApi>, target: Stage) -> Self {
        Self { api, target }
    }
}

impl StagePlugin for PnpPlugin {
    fn name(&self) -> &'static str {
        "PnpPlugin"
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
            let Some(name) = package_name(inner) else {
                return Ok(Step::Continue);
            };
            let inner_request = format!(".{}", &inner[name.len()..]);
            let issuer = request.path.join("");

            let package_dir = match self.api.resolve_to_unqualified(name, &issuer) {
                Ok(Some(dir)) => dir,
                Ok(None) => return Ok(Step::Continue),
                Err(PnpError::UndeclaredDependency(message)) => {
                    ctx.log(|| format!("request is not managed by the pnpapi: {message}"));
                    return Ok(Step::Continue);
                }
                Err(err) => return Err(ResolveError::Pnp(err.to_string())),
            };
            if package_dir == Path::new(name) {
                return Ok(Step::Continue);
            }

            if let Ok(Some(api_file)) = self.api.resolve_to_unqualified("pnpapi", &issuer) {
                ctx.add_file_dependency(api_file);
            }

            let mut next = request.clone();
            next.path = package_dir;
            next.fully_specified = request.fully_specified && inner_request != ".";
            next.request = Some(inner_request);
            next.ignore_symlinks = true;
            let message = ctx
                .is_tracing()
                .then(|| format!("resolved by pnp to {}", next.path.display()));
            pipeline
                .forward_exclusive(self.target, next, message, ctx)
                .await
        }
        .boxed()
    }
}
