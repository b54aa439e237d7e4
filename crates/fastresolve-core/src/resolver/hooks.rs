//! The staged hook graph.
//!
//! A resolution flows through named [`Stage`]s. Each stage holds an ordered
//! list of plugins ("taps"). Running a stage calls its taps in order until
//! one of them produces a result or halts the stage.
//!
//! The graph is assembled once with a [`PipelineBuilder`] and then frozen
//! into an immutable [`Pipeline`] that can be shared between concurrent
//! resolutions.

use super::context::ResolveContext;
use super::error::ResolveError;
use super::request::{Resolution, ResolveRequest};
use super::trace::ResolveTraceStep;
use futures::future::{BoxFuture, FutureExt};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Upper bound on nested stage entries for one resolution.
pub const MAX_STACK_DEPTH: usize = 512;

/// Order offset for taps registered "before" a stage.
pub const ORDER_BEFORE: i32 = -10;
/// Order offset for taps registered "after" a stage.
pub const ORDER_AFTER: i32 = 10;

macro_rules! stages {
    ($($variant:ident => $name:literal,)*) => {
        /// A named point in the resolution pipeline.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Stage {
            $($variant,)*
        }

        impl Stage {
            /// Every stage, in declaration order.
            pub const ALL: &'static [Stage] = &[$(Stage::$variant,)*];

            /// Kebab-case stage name.
            #[must_use]
            pub fn name(self) -> &'static str {
                match self {
                    $(Stage::$variant => $name,)*
                }
            }

            /// Look up a stage by its kebab-case name.
            #[must_use]
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Stage::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

stages! {
    Resolve => "resolve",
    InternalResolve => "internal-resolve",
    NewResolve => "new-resolve",
    NewInternalResolve => "new-internal-resolve",
    ParsedResolve => "parsed-resolve",
    DescribedResolve => "described-resolve",
    NormalResolve => "normal-resolve",
    Internal => "internal",
    RawModule => "raw-module",
    Module => "module",
    ResolveAsModule => "resolve-as-module",
    UndescribedResolveInPackage => "undescribed-resolve-in-package",
    ResolveInPackage => "resolve-in-package",
    ResolveInExistingDirectory => "resolve-in-existing-directory",
    Relative => "relative",
    DescribedRelative => "described-relative",
    Directory => "directory",
    UndescribedExistingDirectory => "undescribed-existing-directory",
    ExistingDirectory => "existing-directory",
    UndescribedRawFile => "undescribed-raw-file",
    RawFile => "raw-file",
    File => "file",
    FinalFile => "final-file",
    ExistingFile => "existing-file",
    Resolved => "resolved",
}

impl Stage {
    /// This stage, with taps running before the plain ones.
    #[must_use]
    pub fn before(self) -> StageRef {
        StageRef {
            stage: self,
            order: ORDER_BEFORE,
        }
    }

    /// This stage, with taps running after the plain ones.
    #[must_use]
    pub fn after(self) -> StageRef {
        StageRef {
            stage: self,
            order: ORDER_AFTER,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A stage plus an ordering offset for taps registered on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageRef {
    pub stage: Stage,
    pub order: i32,
}

impl From<Stage> for StageRef {
    fn from(stage: Stage) -> Self {
        Self { stage, order: 0 }
    }
}

/// What a tap did with a request.
#[derive(Debug, Clone)]
pub enum Step {
    /// No opinion; let the next tap run.
    Continue,
    /// The stage is done with this result.
    Resolved(Arc<Resolution>),
    /// The stage is done without a result; remaining taps are skipped.
    Halt,
}

/// A unit of resolution behavior attached to a stage.
pub trait StagePlugin: Send + Sync {
    /// Name used in logs and introspection.
    fn name(&self) -> &'static str;

    fn apply<'a>(
        &'a self,
        pipeline: &'a Pipeline,
        request: &'a ResolveRequest,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Step, ResolveError>>;
}

/// A user extension that registers taps while the pipeline is assembled.
pub trait ResolverPlugin: Send + Sync {
    fn apply(&self, builder: &mut PipelineBuilder);
}

impl<F> ResolverPlugin for F
where
    F: Fn(&mut PipelineBuilder) + Send + Sync,
{
    fn apply(&self, builder: &mut PipelineBuilder) {
        self(builder);
    }
}

struct Tap {
    order: i32,
    seq: usize,
    plugin: Arc<dyn StagePlugin>,
}

/// The ordered taps of one stage.
#[derive(Default)]
pub struct Hook {
    taps: Vec<Tap>,
}

impl Hook {
    /// Whether any tap is registered.
    #[must_use]
    pub fn is_used(&self) -> bool {
        !self.taps.is_empty()
    }

    /// Tap names in execution order.
    #[must_use]
    pub fn plugin_names(&self) -> Vec<&'static str> {
        self.taps.iter().map(|tap| tap.plugin.name()).collect()
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.plugin_names()).finish()
    }
}

/// Mutable hook graph used while wiring plugins.
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    hooks: FxHashMap<Stage, Hook>,
    seq: usize,
}

impl PipelineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the hook for `stage`.
    pub fn ensure_hook(&mut self, stage: Stage) -> &mut Hook {
        self.hooks.entry(stage).or_default()
    }

    /// Register a plugin on a stage. Taps with a lower order run first;
    /// equal orders keep registration order.
    pub fn tap(&mut self, at: impl Into<StageRef>, plugin: impl StagePlugin + 'static) {
        self.tap_arc(at, Arc::new(plugin));
    }

    /// Register an already shared plugin.
    pub fn tap_arc(&mut self, at: impl Into<StageRef>, plugin: Arc<dyn StagePlugin>) {
        let at = at.into();
        let seq = self.seq;
        self.seq += 1;
        self.ensure_hook(at.stage).taps.push(Tap {
            order: at.order,
            seq,
            plugin,
        });
    }

    /// Freeze the graph.
    #[must_use]
    pub fn build(mut self) -> Pipeline {
        for hook in self.hooks.values_mut() {
            hook.taps.sort_by_key(|tap| (tap.order, tap.seq));
        }
        Pipeline { hooks: self.hooks }
    }
}

/// The immutable hook graph driving resolution.
#[derive(Debug)]
pub struct Pipeline {
    hooks: FxHashMap<Stage, Hook>,
}

impl Pipeline {
    /// The hook for `stage`, if one was ever created.
    #[must_use]
    pub fn hook(&self, stage: Stage) -> Option<&Hook> {
        self.hooks.get(&stage)
    }

    /// Run `request` through `stage`.
    ///
    /// `Ok(None)` means every tap passed or one halted. `message`, when
    /// given, is logged to the trace and nests everything logged below it.
    ///
    /// # Errors
    /// Returns `Recursion` when the same request re-enters the same stage,
    /// or any error raised by a tap.
    pub fn do_resolve<'a>(
        &'a self,
        stage: Stage,
        request: ResolveRequest,
        message: Option<String>,
        ctx: &'a mut ResolveContext,
    ) -> BoxFuture<'a, Result<Option<Arc<Resolution>>, ResolveError>> {
        async move {
            let entry = request.stack_entry(stage);
            if ctx.stack.contains(&entry) || ctx.stack.len() >= MAX_STACK_DEPTH {
                ctx.log(|| "abort resolving because of recursion".to_string());
                let mut stack = ctx.stack.clone();
                stack.push(entry);
                return Err(ResolveError::Recursion { stack });
            }

            let Some(hook) = self.hooks.get(&stage).filter(|hook| hook.is_used()) else {
                return Ok(None);
            };

            tracing::trace!(stage = stage.name(), path = %request.path.display(), "enter stage");

            ctx.stack.push(entry);
            let nested = message.is_some();
            if let Some(message) = message {
                ctx.log_step(|depth| ResolveTraceStep::new(depth, message).with_stage(stage));
                ctx.enter();
            }

            let mut outcome = Ok(None);
            for tap in &hook.taps {
                match tap.plugin.apply(self, &request, ctx).await {
                    Ok(Step::Continue) => {}
                    Ok(Step::Resolved(resolution)) => {
                        outcome = Ok(Some(resolution));
                        break;
                    }
                    Ok(Step::Halt) => break,
                    Err(err) => {
                        outcome = Err(err);
                        break;
                    }
                }
            }

            if nested {
                ctx.leave();
            }
            ctx.stack.pop();
            outcome
        }
        .boxed()
    }

    /// Run `stage`; a miss lets the calling stage continue with its next tap.
    ///
    /// # Errors
    /// Propagates errors from [`Pipeline::do_resolve`].
    pub async fn forward(
        &self,
        stage: Stage,
        request: ResolveRequest,
        message: Option<String>,
        ctx: &mut ResolveContext,
    ) -> Result<Step, ResolveError> {
        Ok(match self.do_resolve(stage, request, message, ctx).await? {
            Some(resolution) => Step::Resolved(resolution),
            None => Step::Continue,
        })
    }

    /// Run `stage`; a miss halts the calling stage.
    ///
    /// # Errors
    /// Propagates errors from [`Pipeline::do_resolve`].
    pub async fn forward_exclusive(
        &self,
        stage: Stage,
        request: ResolveRequest,
        message: Option<String>,
        ctx: &mut ResolveContext,
    ) -> Result<Step, ResolveError> {
        Ok(match self.do_resolve(stage, request, message, ctx).await? {
            Some(resolution) => Step::Resolved(resolution),
            None => Step::Halt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::request::ContextInfo;
    use std::sync::Mutex;

    struct Record {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        step: fn() -> Step,
    }

    impl StagePlugin for Record {
        fn name(&self) -> &'static str {
            self.name
        }

        fn apply<'a>(
            &'a self,
            _pipeline: &'a Pipeline,
            _request: &'a ResolveRequest,
            _ctx: &'a mut ResolveContext,
        ) -> BoxFuture<'a, Result<Step, ResolveError>> {
            self.log.lock().unwrap().push(self.name);
            futures::future::ready(Ok((self.step)())).boxed()
        }
    }

    struct Loop(Stage);

    impl StagePlugin for Loop {
        fn name(&self) -> &'static str {
            "Loop"
        }

        fn apply<'a>(
            &'a self,
            pipeline: &'a Pipeline,
            request: &'a ResolveRequest,
            ctx: &'a mut ResolveContext,
        ) -> BoxFuture<'a, Result<Step, ResolveError>> {
            pipeline.forward(self.0, request.clone(), None, ctx).boxed()
        }
    }

    fn request() -> ResolveRequest {
        ResolveRequest::new(ContextInfo::default(), "/p", "./a")
    }

    fn resolved() -> Step {
        Step::Resolved(Arc::new(Resolution::File(request())))
    }

    #[test]
    fn test_stage_names_round_trip() {
        assert_eq!(Stage::ALL.len(), 25);
        for stage in Stage::ALL {
            assert_eq!(Stage::from_name(stage.name()), Some(*stage));
        }
        assert_eq!(Stage::UndescribedRawFile.to_string(), "undescribed-raw-file");
    }

    #[test]
    fn test_ensure_hook_is_idempotent() {
        let mut builder = PipelineBuilder::new();
        builder.ensure_hook(Stage::File);
        builder.ensure_hook(Stage::File);
        let pipeline = builder.build();
        assert!(!pipeline.hook(Stage::File).unwrap().is_used());
        assert!(pipeline.hook(Stage::Module).is_none());
    }

    #[tokio::test]
    async fn test_tap_order_and_short_circuit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut builder = PipelineBuilder::new();
        let rec = |name: &'static str, step: fn() -> Step| Record {
            name,
            log: log.clone(),
            step,
        };
        builder.tap(Stage::File, rec("plain", || Step::Continue));
        builder.tap(Stage::File.after(), rec("after", resolved));
        builder.tap(Stage::File.before(), rec("before", || Step::Continue));
        builder.tap(Stage::File, rec("plain2", || Step::Continue));
        builder.tap(Stage::File.after(), rec("never", || Step::Continue));
        let pipeline = builder.build();

        assert_eq!(
            pipeline.hook(Stage::File).unwrap().plugin_names(),
            vec!["before", "plain", "plain2", "after", "never"]
        );

        let mut ctx = ResolveContext::new();
        let result = pipeline
            .do_resolve(Stage::File, request(), None, &mut ctx)
            .await
            .unwrap();
        assert!(result.is_some());
        assert_eq!(*log.lock().unwrap(), vec!["before", "plain", "plain2", "after"]);
        assert!(ctx.stack().is_empty());
    }

    #[tokio::test]
    async fn test_halt_skips_remaining_taps() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut builder = PipelineBuilder::new();
        builder.tap(
            Stage::File,
            Record {
                name: "halt",
                log: log.clone(),
                step: || Step::Halt,
            },
        );
        builder.tap(
            Stage::File,
            Record {
                name: "skipped",
                log: log.clone(),
                step: resolved,
            },
        );
        let pipeline = builder.build();

        let mut ctx = ResolveContext::new();
        let result = pipeline
            .do_resolve(Stage::File, request(), None, &mut ctx)
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(*log.lock().unwrap(), vec!["halt"]);
    }

    #[tokio::test]
    async fn test_recursion_is_detected() {
        let mut builder = PipelineBuilder::new();
        builder.tap(Stage::File, Loop(Stage::RawFile));
        builder.tap(Stage::RawFile, Loop(Stage::File));
        let pipeline = builder.build();

        let mut ctx = ResolveContext::new();
        let err = pipeline
            .do_resolve(Stage::File, request(), None, &mut ctx)
            .await
            .unwrap_err();
        match err {
            ResolveError::Recursion { stack } => {
                assert_eq!(stack.len(), 3);
                assert_eq!(stack[0], stack[2]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(ctx.stack().is_empty());
    }

    #[tokio::test]
    async fn test_unused_stage_misses() {
        let pipeline = PipelineBuilder::new().build();
        let mut ctx = ResolveContext::new();
        let step = pipeline
            .forward_exclusive(Stage::Module, request(), None, &mut ctx)
            .await
            .unwrap();
        assert!(matches!(step, Step::Halt));
        let step = pipeline
            .forward(Stage::Module, request(), None, &mut ctx)
            .await
            .unwrap();
        assert!(matches!(step, Step::Continue));
    }

    #[tokio::test]
    async fn test_message_nests_trace() {
        let mut builder = PipelineBuilder::new();
        builder.tap(Stage::Resolve, Loop(Stage::File));
        builder.tap(
            Stage::File,
            Record {
                name: "miss",
                log: Arc::new(Mutex::new(Vec::new())),
                step: || Step::Continue,
            },
        );
        let pipeline = builder.build();

        let mut ctx = ResolveContext::traced();
        pipeline
            .do_resolve(Stage::Resolve, request(), Some("resolve './a'".into()), &mut ctx)
            .await
            .unwrap();
        assert_eq!(ctx.trace_lines(), vec!["resolve './a'"]);
        assert_eq!(ctx.trace.unwrap().steps[0].stage, Some(Stage::Resolve));
    }
}
