//! Variable store.
//!
//! Variables are layered from lowest to highest precedence:
//!
//! 1. `conf/vars.toml`
//! 2. the playbook's `[vars]` table
//! 3. `-e key=value` overrides from the command line
//!
//! The merged table is then deserialized into [`Vars`], so a misspelled or
//! mistyped variable at any layer is reported instead of ignored.
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::toml_loader;
use crate::error::ConfigError;

/// Default repository for the tmux plugin manager.
pub const DEFAULT_TPM_URL: &str = "https://github.com/tmux-plugins/tpm";

/// Resolved variables for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Vars {
    /// Account to create and deploy configuration for.
    pub user_name: String,
    /// Public key authorized for the account; may be empty when
    /// `create_user` is false.
    pub ssh_public_key: String,
    /// Whether the `user` role runs.
    pub create_user: bool,
    /// Login shell for the account.
    pub user_shell: String,
    /// Primary group.
    pub user_group: String,
    /// Supplementary groups.
    pub user_groups: Vec<String>,
    /// Home directory override; looked up on the target when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_home: Option<String>,
    /// OS packages ensured by the `packages` role.
    pub packages: Vec<String>,
    /// Whether the `tmux` role installs the plugin manager.
    pub tmux_plugin_manager: bool,
    /// Git URL the plugin manager is cloned from.
    pub tmux_plugin_manager_url: String,
}

impl Default for Vars {
    fn default() -> Self {
        Self {
            user_name: String::new(),
            ssh_public_key: String::new(),
            create_user: true,
            user_shell: "/bin/bash".to_string(),
            user_group: "root".to_string(),
            user_groups: Vec::new(),
            user_home: None,
            packages: Vec::new(),
            tmux_plugin_manager: true,
            tmux_plugin_manager_url: DEFAULT_TPM_URL.to_string(),
        }
    }
}

impl Vars {
    /// Render the variables as a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }
}

/// A single `key=value` override.
#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    /// Variable name.
    pub key: String,
    /// Parsed value.
    pub value: toml::Value,
}

/// Parse a `key=value` override.
///
/// The value is read as a TOML value when it is one (`true`, `42`,
/// `["a", "b"]`, `"quoted"`) and kept as a plain string otherwise, so
/// `user_name=alice` does not need quoting.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidOverride`] if there is no `=` or the key
/// is empty.
pub fn parse_override(raw: &str) -> Result<Override, ConfigError> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| ConfigError::InvalidOverride(raw.to_string()))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(ConfigError::InvalidOverride(raw.to_string()));
    }

    let value = toml::from_str::<toml::Table>(&format!("v = {value}"))
        .ok()
        .and_then(|mut t| t.remove("v"))
        .unwrap_or_else(|| toml::Value::String(value.to_string()));

    Ok(Override {
        key: key.to_string(),
        value,
    })
}

/// Merge the three variable layers and deserialize the result.
///
/// # Errors
///
/// Returns an error if `defaults_path` cannot be read or parsed, an
/// override is malformed, or the merged table does not fit [`Vars`].
pub fn resolve(
    defaults_path: &Path,
    playbook_vars: &toml::Table,
    extra_vars: &[String],
) -> Result<Vars, ConfigError> {
    let mut merged: toml::Table = toml_loader::load_config(defaults_path)?;

    for (key, value) in playbook_vars {
        merged.insert(key.clone(), value.clone());
    }
    for raw in extra_vars {
        let o = parse_override(raw)?;
        merged.insert(o.key, o.value);
    }

    toml::Value::Table(merged)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::InvalidSyntax {
            file: "resolved variables".to_string(),
            message: e.message().to_string(),
        })
}
