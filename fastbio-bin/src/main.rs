//! `fastbio` sends batches of requests to the REST APIs of biological
//! databases. Every service gets its own rate limit, and responses are cached
//! on disk, so repeated runs only fetch what is new.
//!
//! The fastbio binary is a wrapper around fastbio-lib.
//!
//! Fetch a gene record:
//! ```sh
//! fastbio get https://mygene.info/v3/gene/1017
//! ```
//!
//! Fetch many records from one service, at most 10 per second:
//! ```sh
//! fastbio get --base-url https://rest.kegg.jp --rps 10 /get/hsa:1017 /get/hsa:1018
//! ```
//!
//! Send queries in the request body, one request per body:
//! ```sh
//! fastbio post https://mygene.info/v3/query --body 'q=cdk2' --body 'q=tp53'
//! ```
//!
//! Empty the response cache:
//! ```sh
//! fastbio cache clear
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_copy_implementations,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    unused_extern_crates,
    variant_size_differences,
    clippy::missing_const_for_fn
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]
#![deny(missing_docs)]

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Error, Result, bail};
use clap::Parser;
use log::error;

#[cfg(feature = "native-tls")]
use openssl_sys as _; // required for vendored-openssl feature

mod client;
mod commands;
mod formatters;
mod options;
mod verbosity;

use crate::{
    commands::{Batch, CommandParams},
    formatters::log::init_logging,
    options::{Command, Config, FASTBIO_CONFIG_FILE, FastbioOptions},
};

/// A C-like enum that can be cast to `i32` and used as process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Success = 0,
    // NOTE: exit code 1 is used for any `Result::Err` bubbled up to `main()`
    // using the `?` operator.
    #[allow(unused)]
    UnexpectedFailure = 1,
    PartialFailure = 2,
    ConfigFile = 3,
}

fn main() -> Result<()> {
    // std::process::exit doesn't guarantee that all destructors will be run,
    // therefore we wrap the main code in another function to ensure that.
    let exit_code = run_main()?;
    std::process::exit(exit_code);
}

/// Merge all provided config options into one.
/// This includes a potential config file, command-line- and environment variables
fn load_config() -> Result<FastbioOptions> {
    let mut opts = FastbioOptions::parse();

    let config_file = match &opts.config_file {
        Some(path) => Some(path.clone()),
        // The default config file is optional, but must be valid if it exists
        None => Some(PathBuf::from(FASTBIO_CONFIG_FILE)).filter(|path| path.is_file()),
    };

    if let Some(config_file) = config_file {
        match Config::load_from_file(&config_file) {
            Ok(c) => opts.config.merge(c),
            Err(e) => {
                init_logging(&opts.config.verbose);
                bail!(
                    "Cannot load configuration file `{}`: {e:?}",
                    config_file.display()
                );
            }
        }
    }

    init_logging(&opts.config.verbose);
    Ok(opts)
}

/// Set up runtime and call fastbio entrypoint
fn run_main() -> Result<i32> {
    use std::process::exit;

    let opts = match load_config() {
        Ok(opts) => opts,
        Err(e) => {
            error!("Error while loading config: {e}");
            exit(ExitCode::ConfigFile as i32);
        }
    };

    let runtime = tokio::runtime::Runtime::new()?;

    match runtime.block_on(run(&opts)) {
        Err(e) if Some(io::ErrorKind::BrokenPipe) == underlying_io_error_kind(&e) => {
            exit(ExitCode::Success as i32);
        }
        res => res.map(|code| code as i32),
    }
}

/// Check if the given error can be traced back to an `io::ErrorKind`
/// This is helpful for troubleshooting the root cause of an error.
/// Code is taken from the anyhow documentation.
fn underlying_io_error_kind(error: &Error) -> Option<io::ErrorKind> {
    for cause in error.chain() {
        if let Some(io_error) = cause.downcast_ref::<io::Error>() {
            return Some(io_error.kind());
        }
    }
    None
}

/// Run fastbio with the given options
async fn run(opts: &FastbioOptions) -> Result<ExitCode> {
    let mut out = io::stdout().lock();

    let exit_code = match &opts.command {
        Command::Get(args) => {
            let params = CommandParams {
                cfg: &opts.config,
                args: &args.request,
                batch: Batch::Get {
                    urls: args.urls.clone(),
                },
            };
            commands::fetch(params, &mut out).await?
        }
        Command::Post(args) => {
            let params = CommandParams {
                cfg: &opts.config,
                args: &args.request,
                batch: Batch::Post {
                    url: args.url.clone(),
                    bodies: args.bodies()?,
                },
            };
            commands::fetch(params, &mut out).await?
        }
        Command::Cache(command) => commands::cache(&opts.config, *command, &mut out)?,
    };

    out.flush()?;
    Ok(exit_code)
}
