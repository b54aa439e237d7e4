//! Plugins driven by description file fields: `exports`, `imports`, the
//! package `name` for self references, and main fields.

use crate::options::{FieldPath, MainField};
use crate::resolver::context::ResolveContext;
use crate::resolver::description_file::get_field;
use crate::resolver::entrypoints::{check_field_target, process_exports_field, process_imports_field};
use crate::resolver::error::ResolveError;
use crate::resolver::hooks::{Pipeline, Stage, StagePlugin, Step};
use crate::resolver::request::ResolveRequest;
use fastresolve_util::identifier::parse_identifier;
use fastresolve_util::path::{is_relative_request, join};
use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexSet;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

fn is_set(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

/// Resolve a package subpath through the package's `exports` field.
pub struct ExportsFieldPlugin {
    conditions: Arc<IndexSet<String>>,
    field: FieldPath,
    target: Stage,
}

impl ExportsFieldPlugin {
    #[must_use]
    pub fn new(conditions: Arc<IndexSet<String>>, field: FieldPath, target: Stage) -> Self {
        Self {
            conditions,
            field,
            target,
        }
    }
}

impl StagePlugin for ExportsFieldPlugin {
    fn name(&self) -> &'static str {
        "ExportsFieldPlugin"
    }

    fn apply<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        request: &'a ResolveRequest,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Step, ResolveError>> {
        async move {
            // Only a request at the package root may go through exports.
            let (Some(description_file), Some(root), Some(inner)) = (
                request.description_file_path.as_ref(),
                request.description_file_root.as_ref(),
                request.request.as_deref(),
            ) else {
                return Ok(Step::Continue);
            };
            if request.relative_path.as_deref() != Some(".") {
                return Ok(Step::Continue);
            }

            let remaining = if request.query.is_empty() && request.fragment.is_empty() {
                inner.to_string()
            } else {
                let base = if inner == "." { "./" } else { inner };
                format!("{base}{}{}", request.query, request.fragment)
            };

            let Some(field) = request
                .description_file_data
                .as_deref()
                .and_then(|data| get_field(data, &self.field))
                .filter(|field| is_set(field))
            else {
                return Ok(Step::Continue);
            };

            if request.directory {
                return Err(ResolveError::DirectoryThroughField {
                    field: "exports",
                    request: format!("{remaining}/"),
                });
            }

            let paths = process_exports_field(field, &remaining, &self.conditions)?;
            if paths.is_empty() {
                return Err(ResolveError::PackagePathNotExported {
                    request: remaining,
                    package_root: root.clone(),
                    description_file: description_file.clone(),
                });
            }

            for path in paths {
                let Some(id) = parse_identifier(&path) else {
                    continue;
                };
                check_field_target(&id.request)?;

                let mut next = request.clone();
                next.request = None;
                next.path = join(root, &id.request);
                next.relative_path = Some(id.request.clone());
                if !id.query.is_empty() {
                    next.query = id.query;
                }
                if !id.fragment.is_empty() {
                    next.fragment = id.fragment;
                }

                let message = ctx
                    .is_tracing()
                    .then(|| format!("using exports field: {path}"));
                if let Some(resolution) = pipeline.do_resolve(self.target, next, message, ctx).await? {
                    return Ok(Step::Resolved(resolution));
                }
            }
            Ok(Step::Halt)
        }
        .boxed()
    }
}

/// Resolve `#name` requests through the package's `imports` field.
///
/// Relative targets resolve as files in the package; anything else is
/// resolved again as a fully specified package request.
pub struct ImportsFieldPlugin {
    conditions: Arc<IndexSet<String>>,
    field: FieldPath,
    target_file: Stage,
    target_package: Stage,
}

impl ImportsFieldPlugin {
    #[must_use]
    pub fn new(
        conditions: Arc<IndexSet<String>>,
        field: FieldPath,
        target_file: Stage,
        target_package: Stage,
    ) -> Self {
        Self {
            conditions,
            field,
            target_file,
            target_package,
        }
    }
}

impl StagePlugin for ImportsFieldPlugin {
    fn name(&self) -> &'static str {
        "ImportsFieldPlugin"
    }

    fn apply<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        request: &'a ResolveRequest,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Step, ResolveError>> {
        async move {
            let (Some(description_file), Some(root), Some(inner)) = (
                request.description_file_path.as_ref(),
                request.description_file_root.as_ref(),
                request.request.as_deref(),
            ) else {
                return Ok(Step::Continue);
            };

            let remaining = format!("{inner}{}{}", request.query, request.fragment);

            let Some(field) = request
                .description_file_data
                .as_deref()
                .and_then(|data| get_field(data, &self.field))
                .filter(|field| is_set(field))
            else {
                return Ok(Step::Continue);
            };

            if request.directory {
                return Err(ResolveError::DirectoryThroughField {
                    field: "imports",
                    request: format!("{remaining}/"),
                });
            }

            let paths = process_imports_field(field, &remaining, &self.conditions)?;
            if paths.is_empty() {
                return Err(ResolveError::PackageImportNotDefined {
                    request: remaining,
                    package_root: root.clone(),
                    description_file: description_file.clone(),
                });
            }

            for path in paths {
                let Some(id) = parse_identifier(&path) else {
                    continue;
                };
                check_field_target(&id.request)?;

                let mut next = request.clone();
                if !id.query.is_empty() {
                    next.query = id.query;
                }
                if !id.fragment.is_empty() {
                    next.fragment = id.fragment;
                }

                let stage = if id.request.starts_with('.') {
                    next.request = None;
                    next.path = join(root, &id.request);
                    next.relative_path = Some(id.request);
                    self.target_file
                } else {
                    next.request = Some(id.request.clone());
                    next.relative_path = Some(id.request);
                    next.fully_specified = true;
                    self.target_package
                };

                let message = ctx
                    .is_tracing()
                    .then(|| format!("using imports field: {path}"));
                if let Some(resolution) = pipeline.do_resolve(stage, next, message, ctx).await? {
                    return Ok(Step::Resolved(resolution));
                }
            }
            Ok(Step::Halt)
        }
        .boxed()
    }
}

/// Let a package import itself by name when it declares `exports`.
pub struct SelfReferencePlugin {
    exports_field: FieldPath,
    target: Stage,
}

impl SelfReferencePlugin {
    #[must_use]
    pub fn new(exports_field: FieldPath, target: Stage) -> Self {
        Self {
            exports_field,
            target,
        }
    }
}

impl StagePlugin for SelfReferencePlugin {
    fn name(&self) -> &'static str {
        "SelfReferencePlugin"
    }

    fn apply<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        request: &'a ResolveRequest,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Step, ResolveError>> {
        async move {
            let (Some(data), Some(root), Some(inner)) = (
                request.description_file_data.as_deref(),
                request.description_file_root.as_ref(),
                request.request.as_deref(),
            ) else {
                return Ok(Step::Continue);
            };

            if !get_field(data, &self.exports_field).is_some_and(is_set) {
                return Ok(Step::Continue);
            }
            let Some(name) = data.get("name").and_then(Value::as_str) else {
                return Ok(Step::Continue);
            };

            let Some(rest) = inner.strip_prefix(name) else {
                return Ok(Step::Continue);
            };
            if !rest.is_empty() && !rest.starts_with('/') {
                return Ok(Step::Continue);
            }

            let mut next = request.clone();
            next.request = Some(format!(".{rest}"));
            next.path.clone_from(root);
            next.relative_path = Some(".".to_string());
            let message = ctx.is_tracing().then(|| "self reference".to_string());
            pipeline.forward(self.target, next, message, ctx).await
        }
        .boxed()
    }
}

/// Follow a main field (such as `main` or `module`) at the package root.
pub struct MainFieldPlugin {
    field: MainField,
    target: Stage,
}

impl MainFieldPlugin {
    #[must_use]
    pub fn new(field: MainField, target: Stage) -> Self {
        Self { field, target }
    }
}

impl StagePlugin for MainFieldPlugin {
    fn name(&self) -> &'static str {
        "MainFieldPlugin"
    }

    fn apply<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        request: &'a ResolveRequest,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Step, ResolveError>> {
        async move {
            let (Some(description_file), Some(root), Some(data)) = (
                request.description_file_path.as_ref(),
                request.description_file_root.as_ref(),
                request.description_file_data.as_deref(),
            ) else {
                return Ok(Step::Continue);
            };
            if request.path != *root
                || request.already_tried_main_field.as_ref() == Some(description_file)
            {
                return Ok(Step::Continue);
            }

            let Some(main) = get_field(data, &self.field.name).and_then(Value::as_str) else {
                return Ok(Step::Continue);
            };
            if matches!(main, "" | "." | "./") {
                return Ok(Step::Continue);
            }

            let main = if self.field.force_relative && !is_relative_request(main) {
                format!("./{main}")
            } else {
                main.to_string()
            };

            let mut next = request.clone();
            next.module = false;
            next.directory = main.ends_with('/');
            next.request = Some(main.clone());
            next.already_tried_main_field = Some(PathBuf::clone(description_file));
            let message = ctx.is_tracing().then(|| {
                format!(
                    "use {main} from {} in {}",
                    self.field.name.join("."),
                    description_file.display()
                )
            });
            pipeline.forward(self.target, next, message, ctx).await
        }
        .boxed()
    }
}
