//! Defines the command-line arguments for the luapre CLI.
//!
//! This module uses the `clap` crate with its "derive" feature to create a
//! declarative and type-safe argument parsing structure.

use clap::Parser;
use std::path::PathBuf;

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "luapre",
    version,
    about = "A metaprogramming preprocessor: run Lua at build time to generate Lua."
)]
pub struct LuapreArgs {
    /// Load PATH as Lua source; it must return a callable that receives
    /// processing messages.
    #[arg(long, value_name = "PATH")]
    pub handler: Option<PathBuf>,

    /// Interleave --[[@N]] line annotations in the output.
    #[arg(long)]
    pub linenumbers: bool,

    /// Output extension. Input paths ending in it are rejected.
    #[arg(long, value_name = "EXT", default_value = "lua")]
    pub outputextension: String,

    /// After processing, write a serialized processing-info record to PATH.
    #[arg(long, value_name = "PATH")]
    pub saveinfo: Option<PathBuf>,

    /// Suppress non-error chatter on stdout.
    #[arg(long)]
    pub silent: bool,

    /// Keep the intermediate metaprogram file and escape newlines in
    /// serialized strings for readability.
    #[arg(long)]
    pub debug: bool,

    /// The files to preprocess, in order.
    #[arg(required = true, value_name = "PATH")]
    pub paths: Vec<PathBuf>,
}
