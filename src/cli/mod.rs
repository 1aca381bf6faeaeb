//! Command line interface.

pub mod commands;
pub mod create;
pub mod delete;

pub use commands::CliArgs;
