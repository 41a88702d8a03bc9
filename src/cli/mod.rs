//! CLI module for jobbuilda - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
