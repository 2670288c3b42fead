//! Command-line interface definition.
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI entry point for the provisioning engine.
#[derive(Parser, Debug)]
#[command(
    name = "devenv",
    about = "Provision a development environment on local or remote hosts",
    version
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Options shared across all subcommands.
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// Preview changes without applying
    #[arg(short = 'd', long, visible_alias = "check", global = true)]
    pub dry_run: bool,

    /// Override the repository root directory (must contain conf/ and files/)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the playbook against the inventory
    Provision(ProvisionOpts),
    /// Validate configuration, variables and deployment sources
    Validate,
    /// Print the resolved variable set
    Vars(VarsOpts),
    /// List roles and their tasks in execution order
    Roles,
    /// Generate a shell completion script
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Print version information
    Version,
}

/// Command-line variable overrides.
#[derive(Parser, Debug, Clone, Default)]
pub struct VarOverrides {
    /// Override a variable (`key=value`, value parsed as TOML when possible)
    #[arg(short = 'e', long = "extra-vars", value_name = "KEY=VALUE")]
    pub extra_vars: Vec<String>,
}

/// Options for the `provision` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct ProvisionOpts {
    /// Playbook file (defaults to conf/playbook.toml)
    pub playbook: Option<PathBuf>,

    /// Inventory file or comma-separated host list
    #[arg(short = 'i', long)]
    pub inventory: Option<String>,

    /// Login user for SSH connections
    #[arg(short = 'u', long = "user", value_name = "LOGIN_USER")]
    pub login_user: Option<String>,

    /// Allow SSH to prompt for the connection password
    #[arg(short = 'k', long)]
    pub ask_pass: bool,

    /// Run privileged steps through sudo
    #[arg(short = 'b', long = "become")]
    pub elevate: bool,

    /// Prompt for the sudo password (implies --become)
    #[arg(short = 'K', long, visible_alias = "ask-become")]
    pub ask_become_pass: bool,

    /// Maximum number of hosts provisioned in parallel
    #[arg(short = 'f', long, default_value_t = 5)]
    pub forks: usize,

    /// Skip tasks whose role or task name matches
    #[arg(long, value_delimiter = ',')]
    pub skip: Vec<String>,

    /// Run only tasks whose role or task name matches
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,

    /// Variable overrides.
    #[command(flatten)]
    pub vars: VarOverrides,
}

/// Options for the `vars` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct VarsOpts {
    /// Playbook whose `[vars]` table is layered over the defaults
    pub playbook: Option<PathBuf>,

    /// Variable overrides.
    #[command(flatten)]
    pub vars: VarOverrides,
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_provision_like_a_playbook_runner() {
        let cli = Cli::parse_from([
            "devenv",
            "provision",
            "-u",
            "admin",
            "--ask-pass",
            "--become",
            "--ask-become",
            "-i",
            "devbox,build01",
            "site.toml",
        ]);
        let Command::Provision(opts) = cli.command else {
            panic!("expected provision command");
        };
        assert_eq!(opts.login_user.as_deref(), Some("admin"));
        assert!(opts.ask_pass);
        assert!(opts.elevate);
        assert!(opts.ask_become_pass);
        assert_eq!(opts.inventory.as_deref(), Some("devbox,build01"));
        assert_eq!(opts.playbook, Some(PathBuf::from("site.toml")));
    }

    #[test]
    fn parse_provision_defaults() {
        let cli = Cli::parse_from(["devenv", "provision"]);
        let Command::Provision(opts) = cli.command else {
            panic!("expected provision command");
        };
        assert!(opts.playbook.is_none());
        assert!(opts.inventory.is_none());
        assert!(!opts.elevate);
        assert_eq!(opts.forks, 5);
    }

    #[test]
    fn parse_extra_vars_repeated() {
        let cli = Cli::parse_from([
            "devenv",
            "provision",
            "-e",
            "user_name=alice",
            "--extra-vars",
            "create_user=false",
        ]);
        let Command::Provision(opts) = cli.command else {
            panic!("expected provision command");
        };
        assert_eq!(
            opts.vars.extra_vars,
            vec!["user_name=alice", "create_user=false"]
        );
    }

    #[test]
    fn parse_skip_and_only() {
        let cli = Cli::parse_from(["devenv", "provision", "--skip", "packages,tmux"]);
        let Command::Provision(opts) = cli.command else {
            panic!("expected provision command");
        };
        assert_eq!(opts.skip, vec!["packages", "tmux"]);

        let cli = Cli::parse_from(["devenv", "provision", "--only", "neovim"]);
        let Command::Provision(opts) = cli.command else {
            panic!("expected provision command");
        };
        assert_eq!(opts.only, vec!["neovim"]);
    }

    #[test]
    fn parse_check_alias_sets_dry_run() {
        let cli = Cli::parse_from(["devenv", "--check", "provision"]);
        assert!(cli.global.dry_run);
        let cli = Cli::parse_from(["devenv", "-d", "provision"]);
        assert!(cli.global.dry_run);
    }

    #[test]
    fn parse_root_override() {
        let cli = Cli::parse_from(["devenv", "--root", "/tmp/devenv", "validate"]);
        assert_eq!(cli.global.root, Some(PathBuf::from("/tmp/devenv")));
        assert!(matches!(cli.command, Command::Validate));
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::parse_from(["devenv", "-v", "roles"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Roles));
    }

    #[test]
    fn parse_vars_with_overrides() {
        let cli = Cli::parse_from(["devenv", "vars", "-e", "user_name=bob"]);
        let Command::Vars(opts) = cli.command else {
            panic!("expected vars command");
        };
        assert_eq!(opts.vars.extra_vars, vec!["user_name=bob"]);
    }

    #[test]
    fn parse_completions() {
        let cli = Cli::parse_from(["devenv", "completions", "bash"]);
        assert!(matches!(
            cli.command,
            Command::Completions {
                shell: clap_complete::Shell::Bash
            }
        ));
    }

    #[test]
    fn parse_version() {
        let cli = Cli::parse_from(["devenv", "version"]);
        assert!(matches!(cli.command, Command::Version));
    }
}
