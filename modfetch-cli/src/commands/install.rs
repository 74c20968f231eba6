//! Install command - resolve, download and reconcile.

use clap::Args;

use crate::error::CliError;
use crate::output;
use crate::runner::CliRunner;

#[derive(Debug, Args)]
pub struct InstallArgs {
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Module specifications, e.g. org.example:app:[1.0,). Replace the
    /// [modules] section of the configuration.
    #[arg(value_name = "SPEC")]
    pub specs: Vec<String>,
}

pub async fn run(runner: &CliRunner, args: InstallArgs) -> Result<(), CliError> {
    runner.log_startup("install");
    let specifications = runner.specifications(&args.specs)?;

    let report = runner.installer().install(specifications).await?;

    if args.json {
        output::print_json(&report)?;
    } else {
        output::print_install(&report);
    }
    Ok(())
}
