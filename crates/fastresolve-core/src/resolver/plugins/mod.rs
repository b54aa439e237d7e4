//! Built-in stage plugins.
//!
//! Each plugin is a small state machine step: it looks at the incoming
//! request, optionally derives a new one, and forwards it to a target
//! stage. The factory decides which plugins run on which stages.

pub mod alias;
pub mod description;
pub mod fields;
pub mod flow;
pub mod fs;
pub mod modules;
pub mod parse;
pub mod pnp;
pub mod result;

pub use alias::{AliasFieldPlugin, AliasPlugin};
pub use description::DescriptionFilePlugin;
pub use fields::{ExportsFieldPlugin, ImportsFieldPlugin, MainFieldPlugin, SelfReferencePlugin};
pub use flow::{
    AppendPlugin, ConditionalPlugin, JoinRequestPartPlugin, JoinRequestPlugin, NextPlugin,
    RequestFilter, RootsPlugin, TryNextPlugin, UseFilePlugin,
};
pub use fs::{DirectoryExistsPlugin, FileExistsPlugin, SymlinkPlugin};
pub use modules::{ModulesInHierarchicalDirectoriesPlugin, ModulesInRootPlugin};
pub use parse::{ParsePlugin, UnsafeCachePlugin};
pub use pnp::{PnpApi, PnpError, PnpPlugin};
pub use result::{RestrictionsPlugin, ResultPlugin};
