//! Configuration loading: variables, playbook, inventory and file manifest.
pub mod files;
pub mod inventory;
pub mod playbook;
pub mod toml_loader;
pub mod validation;
pub mod vars;

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Everything a run needs from `conf/`, fully resolved.
#[derive(Debug)]
pub struct Config {
    /// Repository root (contains `conf/` and `files/`).
    pub root: PathBuf,
    /// Playbook with its roles in execution order.
    pub playbook: playbook::Playbook,
    /// Variables after layering defaults, playbook vars and overrides.
    pub vars: vars::Vars,
    /// Target hosts.
    pub inventory: inventory::Inventory,
    /// Files deployed per role.
    pub files: files::Manifest,
}

/// Where to load configuration from and what to layer on top of it.
#[derive(Debug, Default, Clone)]
pub struct LoadOptions<'a> {
    /// Playbook path; `conf/playbook.toml` when absent.
    pub playbook: Option<&'a Path>,
    /// Inventory file or host list; a single local host when absent.
    pub inventory: Option<&'a str>,
    /// Raw `key=value` overrides from `-e`.
    pub extra_vars: &'a [String],
}

impl Config {
    /// Load and resolve all configuration below `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if any file fails to parse, an override is
    /// malformed, a variable has the wrong type, or the playbook names an
    /// unknown role.
    pub fn load(root: &Path, opts: &LoadOptions<'_>) -> Result<Self, ConfigError> {
        let conf = root.join("conf");

        let playbook_path = opts
            .playbook
            .map_or_else(|| conf.join("playbook.toml"), Path::to_path_buf);
        let playbook = playbook::load(&playbook_path)?;

        let vars = vars::resolve(&conf.join("vars.toml"), &playbook.vars, opts.extra_vars)?;

        let inventory = match opts.inventory {
            Some(spec) => inventory::parse_arg(spec)?,
            None => inventory::Inventory::local(),
        };

        let files = files::load(&conf.join("files.toml"))?;

        Ok(Self {
            root: root.to_path_buf(),
            playbook,
            vars,
            inventory,
            files,
        })
    }

    /// Directory holding the files deployed by the configuration roles.
    #[must_use]
    pub fn files_dir(&self) -> PathBuf {
        self.root.join("files")
    }
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use std::path::PathBuf;

    /// Write `content` to a `config.toml` in a fresh temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the directory or file cannot be created.
    #[allow(clippy::expect_used)]
    pub fn write_temp_toml(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, content).expect("write temp toml");
        (dir, path)
    }
}
