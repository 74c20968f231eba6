//! modfetch CLI - Command-line interface
//!
//! This binary wires configuration, logging and a notifier into the
//! modfetch library and runs one of its entry points.

mod commands;
mod error;
mod output;
mod runner;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;

use commands::{install::InstallArgs, resolve::ResolveArgs};
use runner::CliRunner;

#[derive(Debug, Parser)]
#[command(name = "modfetch", version, about = "Resolve, download and reconcile versioned module artifacts")]
struct Cli {
    /// Configuration file (default: ~/.config/modfetch/config.ini)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Identify modules and resolve version conflicts without installing
    Resolve(ResolveArgs),

    /// Resolve modules, download their artifacts and update the state
    Install(InstallArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match CliRunner::new(cli.config.as_deref(), cli.verbose) {
        Ok(runner) => match cli.command {
            Commands::Resolve(args) => commands::resolve::run(&runner, args).await,
            Commands::Install(args) => commands::install::run(&runner, args).await,
        },
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_install() {
        let cli = Cli::parse_from(["modfetch", "--config", "/etc/modfetch.ini", "install", "--json", "org:x", "org:y:1.0"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/modfetch.ini")));
        match cli.command {
            Commands::Install(args) => {
                assert!(args.json);
                assert_eq!(args.specs, vec!["org:x", "org:y:1.0"]);
            }
            other => panic!("expected install, got {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["modfetch", "resolve", "-v"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Resolve(_)));
    }
}
