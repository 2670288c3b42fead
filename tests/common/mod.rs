// Shared helpers for integration tests.
//
// Provides a temporary repository plus a temporary home directory, and a
// fluent builder so each test can declare the variables, roles and files it
// needs without repeating filesystem boilerplate.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use devenv_cli::commands::provision::{RunSettings, provision_hosts};
use devenv_cli::config::{Config, LoadOptions};
use devenv_cli::logging::{Logger, TaskStatus};

/// Root of this crate, holding the shipped `conf/` and `files/`.
pub fn crate_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// An isolated repository and target home directory.
///
/// Both directories are deleted when dropped.
pub struct TestRepo {
    /// Repository root containing `conf/` and `files/`.
    pub root: tempfile::TempDir,
    /// Home directory the target user's files are deployed into.
    pub home: tempfile::TempDir,
}

impl TestRepo {
    /// Path to the repository root.
    pub fn root_path(&self) -> &Path {
        self.root.path()
    }

    /// Path to the home directory.
    pub fn home_path(&self) -> &Path {
        self.home.path()
    }

    /// Load configuration with `extra_vars` layered on top.
    pub fn load_config(&self, extra_vars: &[&str]) -> Config {
        let extra: Vec<String> = extra_vars.iter().map(ToString::to_string).collect();
        Config::load(
            self.root.path(),
            &LoadOptions {
                extra_vars: &extra,
                ..LoadOptions::default()
            },
        )
        .expect("load config")
    }

    /// Provision the local host once and return the logger holding the
    /// recorded tasks.
    pub fn provision(&self, settings: &RunSettings, extra_vars: &[&str]) -> Arc<Logger> {
        let config = Arc::new(self.load_config(extra_vars));
        let log = Arc::new(Logger::new("test"));
        provision_hosts(&config, settings, &log, &AtomicBool::new(false)).expect("provision");
        log
    }
}

/// Task names and statuses recorded by `log`, in order.
pub fn statuses(log: &Logger) -> Vec<(String, TaskStatus)> {
    log.task_entries()
        .into_iter()
        .map(|e| (e.name, e.status))
        .collect()
}

/// Login name of whoever runs the tests.
///
/// Fixtures deploy for this user: a root test run hands files to the
/// configured user, which must therefore exist.
pub fn current_user() -> String {
    let output = std::process::Command::new("id")
        .arg("-un")
        .output()
        .expect("run id -un");
    String::from_utf8(output.stdout)
        .expect("utf-8 user name")
        .trim()
        .to_string()
}

/// Settings for a plain local run: no escalation, one fork.
pub fn local_settings() -> RunSettings {
    RunSettings {
        forks: 1,
        ..RunSettings::default()
    }
}

/// Fluent builder for [`TestRepo`].
pub struct TestRepoBuilder {
    repo: TestRepo,
    roles: Vec<String>,
    vars: Vec<String>,
    files_toml: String,
}

impl TestRepoBuilder {
    /// Start with an empty repository whose variables deploy into the
    /// temporary home, for the current user, without touching accounts,
    /// packages or the network.
    pub fn new() -> Self {
        let repo = TestRepo {
            root: tempfile::tempdir().expect("create repo dir"),
            home: tempfile::tempdir().expect("create home dir"),
        };
        std::fs::create_dir_all(repo.root.path().join("conf")).expect("create conf dir");
        std::fs::create_dir_all(repo.root.path().join("files")).expect("create files dir");
        let home = repo.home.path().to_str().expect("utf-8 home").to_string();
        Self {
            repo,
            roles: Vec::new(),
            vars: vec![
                format!("user_name = \"{}\"", current_user()),
                "create_user = false".to_string(),
                "tmux_plugin_manager = false".to_string(),
                format!("user_home = \"{home}\""),
            ],
            files_toml: String::new(),
        }
    }

    /// Roles listed by the playbook.
    pub fn roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(ToString::to_string).collect();
        self
    }

    /// Add a raw `key = value` line to `conf/vars.toml`.
    pub fn var(mut self, line: &str) -> Self {
        self.vars.push(line.to_string());
        self
    }

    /// Use the shipped `conf/files.toml` and `files/` tree.
    pub fn with_shipped_files(mut self) -> Self {
        self.files_toml =
            std::fs::read_to_string(crate_root().join("conf/files.toml")).expect("read files.toml");
        copy_tree(&crate_root().join("files"), &self.repo.root.path().join("files"));
        self
    }

    /// Finish building: write `conf/` and return the repository.
    pub fn build(self) -> TestRepo {
        let conf = self.repo.root.path().join("conf");
        let mut vars = self.vars.join("\n");
        vars.push('\n');
        std::fs::write(conf.join("vars.toml"), vars).expect("write vars.toml");

        let roles: Vec<String> = self.roles.iter().map(|r| format!("\"{r}\"")).collect();
        std::fs::write(
            conf.join("playbook.toml"),
            format!("name = \"test\"\nroles = [{}]\n", roles.join(", ")),
        )
        .expect("write playbook.toml");
        std::fs::write(conf.join("files.toml"), self.files_toml).expect("write files.toml");
        self.repo
    }
}

fn copy_tree(from: &Path, to: &Path) {
    std::fs::create_dir_all(to).expect("create directory");
    for entry in std::fs::read_dir(from).expect("read directory") {
        let entry = entry.expect("directory entry");
        let dest = to.join(entry.file_name());
        if entry.file_type().expect("file type").is_dir() {
            copy_tree(&entry.path(), &dest);
        } else {
            std::fs::copy(entry.path(), dest).expect("copy file");
        }
    }
}
