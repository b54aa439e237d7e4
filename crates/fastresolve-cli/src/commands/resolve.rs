//! `fastresolve resolve`: resolve a single request and report the outcome.

use fastresolve_core::options::{AliasOptionEntry, AliasOptions, AliasValue};
use fastresolve_core::version::SCHEMA_VERSION;
use fastresolve_core::{
    create_resolver, Config, ContextInfo, ResolveContext, ResolveError, Resolution,
    UserResolveOptions,
};
use miette::{miette, IntoDiagnostic, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything the `resolve` subcommand was asked to do.
#[derive(Debug, Clone, Default)]
pub struct ResolveAction {
    pub request: String,
    /// Directory to resolve from. Relative paths are taken from the cwd.
    pub context: Option<PathBuf>,
    pub conditions: Vec<String>,
    pub extensions: Vec<String>,
    /// `name=target` pairs; a target of `false` ignores the request.
    pub aliases: Vec<String>,
    pub fully_specified: bool,
    pub no_symlinks: bool,
    pub trace: bool,
}

#[derive(Serialize)]
struct ResolveOutput {
    schema_version: u32,
    ok: bool,
    request: String,
    context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolved: Option<String>,
    ignored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorOutput>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    trace: Vec<String>,
    file_dependencies: Vec<String>,
    missing_dependencies: Vec<String>,
}

#[derive(Serialize)]
struct ErrorOutput {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    hints: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<String>,
}

/// Run the resolve command.
///
/// Exits with status 1 when the request does not resolve.
pub fn run(config: &Config, action: ResolveAction, json: bool) -> Result<()> {
    let overrides = flag_options(&action)?;
    let options = config
        .resolve_options()
        .into_diagnostic()?
        .merge(overrides);

    let context = match &action.context {
        Some(dir) if dir.is_absolute() => dir.clone(),
        Some(dir) => config.cwd.join(dir),
        None => config.cwd.clone(),
    };

    let resolver = create_resolver(options).into_diagnostic()?;
    let mut ctx = if action.trace {
        ResolveContext::traced()
    } else {
        ResolveContext::new()
    };

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let outcome = runtime.block_on(resolver.resolve(
        ContextInfo::default(),
        &context,
        &action.request,
        &mut ctx,
    ));

    let output = build_output(&action.request, &context, &outcome, &ctx, action.trace);
    if json {
        println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
    } else {
        print_human(&output);
    }

    if let Err(err) = &outcome {
        tracing::debug!(code = err.code(), "resolve failed");
        std::process::exit(1);
    }
    Ok(())
}

/// Options set directly on the command line. These win over the config file.
fn flag_options(action: &ResolveAction) -> Result<UserResolveOptions> {
    let mut options = UserResolveOptions::default();
    if !action.conditions.is_empty() {
        options.condition_names = Some(action.conditions.clone());
    }
    if !action.extensions.is_empty() {
        options.extensions = Some(action.extensions.clone());
    }
    if !action.aliases.is_empty() {
        let entries = action
            .aliases
            .iter()
            .map(|pair| parse_alias(pair))
            .collect::<Result<Vec<_>>>()?;
        options.alias = Some(AliasOptions::List(entries));
    }
    if action.fully_specified {
        options.fully_specified = Some(true);
    }
    if action.no_symlinks {
        options.symlinks = Some(false);
    }
    Ok(options)
}

fn parse_alias(pair: &str) -> Result<AliasOptionEntry> {
    let (name, target) = pair
        .split_once('=')
        .ok_or_else(|| miette!("invalid alias '{pair}': expected NAME=TARGET"))?;
    if name.is_empty() {
        return Err(miette!("invalid alias '{pair}': empty name"));
    }
    let alias = match target {
        "false" => AliasValue::Flag(false),
        path => AliasValue::Path(path.to_string()),
    };
    Ok(AliasOptionEntry {
        name: name.to_string(),
        alias,
        only_module: false,
    })
}

fn build_output(
    request: &str,
    context: &Path,
    outcome: &Result<Arc<Resolution>, ResolveError>,
    ctx: &ResolveContext,
    trace: bool,
) -> ResolveOutput {
    let (resolved, ignored, error) = match outcome {
        Ok(resolution) => (resolution.resource(), resolution.is_ignored(), None),
        Err(err) => (
            None,
            false,
            Some(ErrorOutput {
                code: err.code(),
                message: first_line(&err.to_string()),
                hints: err.hints().to_vec(),
                details: err.details().to_vec(),
            }),
        ),
    };

    ResolveOutput {
        schema_version: SCHEMA_VERSION,
        ok: outcome.is_ok(),
        request: request.to_string(),
        context: context.display().to_string(),
        resolved,
        ignored,
        error,
        trace: if trace { ctx.trace_lines() } else { Vec::new() },
        file_dependencies: sorted(ctx.file_dependencies.iter()),
        missing_dependencies: sorted(ctx.missing_dependencies.iter()),
    }
}

fn first_line(message: &str) -> String {
    message.lines().next().unwrap_or_default().to_string()
}

fn sorted<'a>(paths: impl Iterator<Item = &'a PathBuf>) -> Vec<String> {
    let mut out: Vec<String> = paths.map(|p| p.display().to_string()).collect();
    out.sort();
    out
}

fn print_human(output: &ResolveOutput) {
    for line in &output.trace {
        eprintln!("{line}");
    }

    if output.ignored {
        println!("{} -> (ignored)", output.request);
        return;
    }
    if let Some(resolved) = &output.resolved {
        println!("{resolved}");
        return;
    }
    if let Some(error) = &output.error {
        eprintln!("error[{}]: {}", error.code, error.message);
        for hint in &error.hints {
            for line in hint.lines() {
                eprintln!("  hint: {line}");
            }
        }
        if !output.trace.is_empty() {
            return;
        }
        for detail in &error.details {
            eprintln!("  {detail}");
        }
    }
}
