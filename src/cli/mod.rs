//! The luapre command-line interface.
//!
//! This module is the entry point for the CLI: it parses the flags, hands
//! the run to the engine, and turns the first error into a diagnostic and
//! a non-zero exit.

use clap::Parser;
use std::process;

use crate::cli::args::LuapreArgs;
use crate::engine::{self, Options};
use crate::errors::print_error;

pub mod args;
pub mod output;

/// The main entry point for the CLI.
pub fn run() {
    let args = LuapreArgs::parse();

    let options = Options {
        handler: args.handler,
        linenumbers: args.linenumbers,
        output_extension: args.outputextension,
        save_info: args.saveinfo,
        silent: args.silent,
        debug: args.debug,
    };

    if let Err(error) = engine::process_paths(&args.paths, &options) {
        print_error(error);
        process::exit(1);
    }
}
