//! Module resolution pipeline.
//!
//! A request enters at the `resolve` stage and is passed between stages by
//! plugins until one of them reports a file. See [`factory`] for the
//! default wiring and [`hooks`] for the stage machinery.

pub mod cache;
pub mod context;
pub mod description_file;
mod engine;
pub mod entrypoints;
pub mod error;
pub mod factory;
pub mod hooks;
pub mod plugins;
pub mod request;
pub mod trace;


pub use cache::UnsafeCache;
pub use context::ResolveContext;
pub use description_file::{DescriptionFile, DescriptionFileCache};
pub use engine::Resolver;
pub use error::{codes, ResolveError};
pub use factory::{create_resolver, create_resolver_on};
pub use hooks::{
    Pipeline, PipelineBuilder, ResolverPlugin, Stage, StagePlugin, StageRef, Step,
    MAX_STACK_DEPTH,
};
pub use plugins::{PnpApi, PnpError};
pub use request::{ContextInfo, Resolution, ResolveRequest};
pub use trace::{ResolveTrace, ResolveTraceStep};
