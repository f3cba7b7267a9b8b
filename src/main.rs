use anyhow::Result;
use clap::Parser;
use log::{debug, error};
use std::process::ExitCode;

mod cmdline;
mod config;
mod elevation;
mod interactive;
mod registry;

use elevation::{Relauncher, ShellLauncher, TokenPrivilegeProbe};
use registry::{ConfigStore, FusionRegistry};

/// Configure .NET Fusion assembly-bind logging (HKLM\SOFTWARE\Microsoft\Fusion).
///
/// Without arguments an interactive console dialog is shown. With arguments
/// the settings are written to the registry and the process exits; this is
/// how the elevated relaunch applies a pending change.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Configuration tokens: /force(+|-) /failures(+|-) /resources(+|-) /path:<dir>
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    tokens: Vec<String>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let result = if args.tokens.is_empty() {
        let relauncher = Relauncher::new(TokenPrivilegeProbe, ShellLauncher);
        interactive::run(&FusionRegistry, &relauncher)
    } else {
        run_batch(&args.tokens, &FusionRegistry)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(2)
        }
    }
}

/// Batch mode: parse the tokens, commit to the store, no interaction.
fn run_batch(tokens: &[String], store: &dyn ConfigStore) -> Result<()> {
    let config = cmdline::parse(tokens);
    debug!("batch configuration: {config:?}");
    store.write(&config)
}
