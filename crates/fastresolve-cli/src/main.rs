#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod logging;

use clap::Parser;
use fastresolve_core::Config;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fastresolve")]
#[command(author, version, about = "Resolve module requests the way a bundler would", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Resolve a request and print the file it maps to
    Resolve {
        /// The request, e.g. "./utils", "lodash/fp" or "#internal"
        request: String,

        /// Directory to resolve from (defaults to the working directory)
        #[arg(long, value_name = "DIR")]
        context: Option<PathBuf>,

        /// Resolver options file (defaults to fastresolve.json in the working directory)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Condition name for exports/imports fields (repeatable)
        #[arg(long = "condition", value_name = "NAME")]
        conditions: Vec<String>,

        /// Extension to try, in order (repeatable)
        #[arg(long = "extension", value_name = "EXT")]
        extensions: Vec<String>,

        /// Alias as NAME=TARGET, or NAME=false to ignore (repeatable)
        #[arg(long = "alias", value_name = "NAME=TARGET")]
        aliases: Vec<String>,

        /// Require extensions in relative requests
        #[arg(long)]
        fully_specified: bool,

        /// Report symlinked paths as-is instead of their real location
        #[arg(long)]
        no_symlinks: bool,

        /// Print every step the resolver took
        #[arg(long)]
        trace: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine working directory
    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::new(cwd.clone())
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    logging::init(config.verbosity, config.json_logs);

    match cli.command {
        None | Some(Commands::Version) => commands::version::run(cli.json),
        Some(Commands::Resolve {
            request,
            context,
            config: config_file,
            conditions,
            extensions,
            aliases,
            fully_specified,
            no_symlinks,
            trace,
        }) => {
            let span = tracing::info_span!("resolve", cmd = "resolve", cwd = %cwd.display());
            let _guard = span.enter();
            let config = config.with_config_file(config_file);
            let action = commands::resolve::ResolveAction {
                request,
                context,
                conditions,
                extensions,
                aliases,
                fully_specified,
                no_symlinks,
                trace,
            };
            commands::resolve::run(&config, action, cli.json)
        }
    }
}
