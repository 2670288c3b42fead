//! `devenv` command-line entry point.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use devenv_cli::{cli, commands, logging};

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = cli::Cli::parse();

    match args.command {
        cli::Command::Provision(opts) => {
            logging::init_subscriber(args.verbose, "provision");
            commands::install_interrupt_handler();
            let log = Arc::new(logging::Logger::new("provision"));
            commands::provision::run(&args.global, &opts, &log)
        }
        cli::Command::Validate => {
            logging::init_subscriber(args.verbose, "validate");
            let log = logging::Logger::new("validate");
            commands::validate::run(&args.global, &log)
        }
        cli::Command::Vars(opts) => commands::vars::run(&args.global, &opts),
        cli::Command::Roles => commands::roles::run(),
        cli::Command::Completions { shell } => {
            commands::completions::run(shell);
            Ok(())
        }
        cli::Command::Version => {
            #[allow(clippy::print_stdout)]
            {
                println!("devenv {}", commands::version());
            }
            Ok(())
        }
    }
}
