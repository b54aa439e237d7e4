//! Request aliasing from options and from description file fields.

use crate::options::{AliasEntry, AliasTarget, FieldPath};
use crate::resolver::context::ResolveContext;
use crate::resolver::description_file::get_field;
use crate::resolver::error::ResolveError;
use crate::resolver::hooks::{Pipeline, Stage, StagePlugin, Step};
use crate::resolver::request::{Resolution, ResolveRequest};
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::sync::Arc;

/// Rewrite requests whose name matches a configured alias.
///
/// A name matches exactly, or as a `name/` prefix unless `only_module` is
/// set. The first matching entry that produced a new request ends the
/// search: if none of its replacements resolve, the stage halts.
pub struct AliasPlugin {
    entries: Vec<AliasEntry>,
    target: Stage,
}

impl AliasPlugin {
    #[must_use]
    pub fn new(entries: Vec<AliasEntry>, target: Stage) -> Self {
        Self { entries, target }
    }
}

fn matches_alias(inner: &str, entry: &AliasEntry) -> bool {
    inner == entry.name
        || (!entry.only_module
            && inner
                .strip_prefix(entry.name.as_str())
                .is_some_and(|rest| rest.starts_with('/')))
}

impl StagePlugin for AliasPlugin {
    fn name(&self) -> &'static str {
        "AliasPlugin"
    }

    fn apply<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        request: &'a ResolveRequest,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Step, ResolveError>> {
        async move {
            let inner = request
                .request
                .clone()
                .unwrap_or_else(|| request.path_str());
            if inner.is_empty() {
                return Ok(Step::Continue);
            }

            for entry in &self.entries {
                if !matches_alias(&inner, entry) {
                    continue;
                }
                let remaining = &inner[entry.name.len()..];

                let replacements = match &entry.target {
                    AliasTarget::Ignore => {
                        ctx.log(|| format!("aliased {inner} to ignored"));
                        return Ok(Step::Resolved(Arc::new(Resolution::Ignored(
                            request.clone(),
                        ))));
                    }
                    AliasTarget::Requests(replacements) => replacements,
                };

                let mut should_stop = false;
                for alias in replacements {
                    // Aliasing "x" to "x/y" must not loop back into itself.
                    let is_self = inner == *alias
                        || inner
                            .strip_prefix(alias.as_str())
                            .is_some_and(|rest| rest.starts_with('/'));
                    if is_self {
                        continue;
                    }
                    should_stop = true;

                    let new_request = format!("{alias}{remaining}");
                    let mut next = request.clone();
                    next.request = Some(new_request.clone());
                    next.fully_specified = false;
                    let message = ctx.is_tracing().then(|| {
                        format!(
                            "aliased with mapping '{}': '{alias}' to '{new_request}'",
                            entry.name
                        )
                    });
                    if let Some(resolution) =
                        pipeline.do_resolve(self.target, next, message, ctx).await?
                    {
                        return Ok(Step::Resolved(resolution));
                    }
                }

                if should_stop {
                    return Ok(Step::Halt);
                }
            }
            Ok(Step::Continue)
        }
        .boxed()
    }
}

/// Apply a browser-style alias field from the description file.
///
/// The field maps package-relative paths or module names to replacements;
/// `false` ignores the request.
pub struct AliasFieldPlugin {
    field: FieldPath,
    target: Stage,
}

impl AliasFieldPlugin {
    #[must_use]
    pub fn new(field: FieldPath, target: Stage) -> Self {
        Self { field, target }
    }
}

impl StagePlugin for AliasFieldPlugin {
    fn name(&self) -> &'static str {
        "AliasFieldPlugin"
    }

    fn apply<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        request: &'a ResolveRequest,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Step, ResolveError>> {
        async move {
            let Some(data) = request.description_file_data.as_deref() else {
                return Ok(Step::Continue);
            };
            let Some(inner) = request.inner_request() else {
                return Ok(Step::Continue);
            };
            let Some(Value::Object(field)) = get_field(data, &self.field) else {
                ctx.log(|| {
                    format!(
                        "Field '{}' doesn't contain a valid alias configuration",
                        self.field.join(".")
                    )
                });
                return Ok(Step::Continue);
            };

            let value = field
                .get(&inner)
                .or_else(|| inner.strip_prefix("./").and_then(|short| field.get(short)));
            let replacement = match value {
                None => return Ok(Step::Continue),
                Some(Value::Bool(false)) => {
                    return Ok(Step::Resolved(Arc::new(Resolution::Ignored(
                        request.clone(),
                    ))));
                }
                Some(Value::String(replacement)) if *replacement != inner => replacement,
                Some(_) => return Ok(Step::Continue),
            };

            let mut next = request.clone();
            if let Some(root) = &request.description_file_root {
                next.path.clone_from(root);
            }
            next.request = Some(replacement.clone());
            next.fully_specified = false;
            let message = ctx.is_tracing().then(|| {
                format!(
                    "aliased from description file {} with mapping '{inner}' to '{replacement}'",
                    request
                        .description_file_path
                        .as_deref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default()
                )
            });
            pipeline
                .forward_exclusive(self.target, next, message, ctx)
                .await
        }
        .boxed()
    }
}
