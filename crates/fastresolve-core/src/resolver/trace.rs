//! Resolution tracing.
//!
//! Collects a step-by-step log of a resolution for debugging and for the
//! details attached to "can't resolve" errors.

use super::hooks::Stage;
use std::path::PathBuf;

/// A single step in the resolution trace.
#[derive(Debug, Clone)]
pub struct ResolveTraceStep {
    /// Nesting level; each stage entered with a message adds one.
    pub depth: usize,
    /// Stage that produced this step, if known.
    pub stage: Option<Stage>,
    /// Human-readable description of what happened.
    pub detail: String,
    /// File path involved in this step, if any.
    pub path: Option<PathBuf>,
}

impl ResolveTraceStep {
    /// Create a new trace step.
    pub fn new(depth: usize, detail: impl Into<String>) -> Self {
        Self {
            depth,
            stage: None,
            detail: detail.into(),
            path: None,
        }
    }

    /// Set the stage for this step.
    #[must_use]
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Set the path for this step.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// The detail indented two spaces per level.
    #[must_use]
    pub fn line(&self) -> String {
        format!("{}{}", "  ".repeat(self.depth), self.detail)
    }
}

/// Complete resolution trace.
#[derive(Debug, Clone, Default)]
pub struct ResolveTrace {
    /// Ordered list of resolution steps
    pub steps: Vec<ResolveTraceStep>,
}

impl ResolveTrace {
    /// Create a new empty trace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step to the trace.
    pub fn add_step(&mut self, step: ResolveTraceStep) {
        self.steps.push(step);
    }

    /// Rendered, indented lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.steps.iter().map(ResolveTraceStep::line).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_are_indented_by_depth() {
        let mut trace = ResolveTrace::new();
        trace.add_step(ResolveTraceStep::new(0, "resolve './a' in '/p'").with_stage(Stage::Resolve));
        trace.add_step(ResolveTraceStep::new(1, "using description file").with_path("/p/package.json"));
        trace.add_step(ResolveTraceStep::new(2, "no extension"));

        assert_eq!(
            trace.lines(),
            vec![
                "resolve './a' in '/p'".to_string(),
                "  using description file".to_string(),
                "    no extension".to_string(),
            ]
        );
        assert_eq!(trace.steps[0].stage, Some(Stage::Resolve));
        assert_eq!(trace.steps[1].path, Some(PathBuf::from("/p/package.json")));
    }
}
