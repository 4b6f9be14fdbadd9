//! Command line interface module
//!
//! Argument parsing, settings merge and dispatch of the `sif-oras` subcommands.

pub mod args;
pub mod runner;

pub use args::{Args, Command, GlobalArgs};
pub use runner::Runner;
