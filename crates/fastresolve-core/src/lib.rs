#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

//! Configurable module resolution for JavaScript-style requests.
//!
//! Build a [`Resolver`] from [`UserResolveOptions`] with
//! [`create_resolver`], then call [`Resolver::resolve`].

pub mod config;
pub mod error;
pub mod fs;
pub mod options;
pub mod resolver;
pub mod version;

pub use config::Config;
pub use error::Error;
pub use fs::{FileStat, FileSystem, OsFileSystem, SyncAsyncFileSystem, SyncFileSystem};
pub use options::{create_options, ResolveOptions, UserResolveOptions};
pub use resolver::{
    create_resolver, create_resolver_on, ContextInfo, ResolveContext, ResolveError, Resolution,
    Resolver,
};
pub use version::VERSION;
