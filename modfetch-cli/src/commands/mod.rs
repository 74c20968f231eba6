//! CLI subcommands.

pub mod install;
pub mod resolve;
