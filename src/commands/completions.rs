//! Command: generate shell completions.
use clap::CommandFactory as _;
use clap_complete::Shell;

use crate::cli::Cli;

/// Write the completion script for `shell` to stdout.
pub fn run(shell: Shell) {
    let mut command = Cli::command();
    let name = command.get_name().to_string();
    clap_complete::generate(shell, &mut command, name, &mut std::io::stdout());
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn bash_script_names_subcommands() {
        let mut buf = Vec::new();
        clap_complete::generate(Shell::Bash, &mut Cli::command(), "devenv", &mut buf);
        let script = String::from_utf8(buf).unwrap();
        assert!(script.contains("provision"));
        assert!(script.contains("--ask-become-pass"));
    }
}
