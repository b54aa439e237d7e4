//! Per-call resolution context.

use super::trace::{ResolveTrace, ResolveTraceStep};
use rustc_hash::FxHashSet;
use std::path::PathBuf;

/// Mutable state owned by one top-level resolve call.
///
/// Collects dependency sets for cache invalidation, an optional trace,
/// and the stack of in-flight stage entries used to detect recursion.
#[derive(Debug, Default)]
pub struct ResolveContext {
    /// Files whose content influenced the result.
    pub file_dependencies: FxHashSet<PathBuf>,
    /// Paths that were probed and did not exist.
    pub missing_dependencies: FxHashSet<PathBuf>,
    /// Step log, collected only when present.
    pub trace: Option<ResolveTrace>,
    pub(crate) stack: Vec<String>,
    depth: usize,
}

impl ResolveContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that records a trace.
    #[must_use]
    pub fn traced() -> Self {
        Self {
            trace: Some(ResolveTrace::new()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_tracing(&self) -> bool {
        self.trace.is_some()
    }

    /// Entries currently being resolved, outermost first.
    #[must_use]
    pub fn stack(&self) -> &[String] {
        &self.stack
    }

    /// Record a trace line at the current depth. The message is only built
    /// when tracing.
    pub fn log(&mut self, detail: impl FnOnce() -> String) {
        if let Some(trace) = &mut self.trace {
            trace.add_step(ResolveTraceStep::new(self.depth, detail()));
        }
    }

    pub(crate) fn log_step(&mut self, step: impl FnOnce(usize) -> ResolveTraceStep) {
        if let Some(trace) = &mut self.trace {
            trace.add_step(step(self.depth));
        }
    }

    pub(crate) fn enter(&mut self) {
        self.depth += 1;
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn add_file_dependency(&mut self, path: impl Into<PathBuf>) {
        self.file_dependencies.insert(path.into());
    }

    pub fn add_missing_dependency(&mut self, path: impl Into<PathBuf>) {
        self.missing_dependencies.insert(path.into());
    }

    /// Fold the dependency sets of another pass into this context.
    pub(crate) fn absorb_dependencies(&mut self, other: ResolveContext) {
        self.file_dependencies.extend(other.file_dependencies);
        self.missing_dependencies.extend(other.missing_dependencies);
    }

    /// Trace lines collected so far.
    #[must_use]
    pub fn trace_lines(&self) -> Vec<String> {
        self.trace.as_ref().map(ResolveTrace::lines).unwrap_or_default()
    }
}
