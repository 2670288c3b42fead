//! Playbook: the ordered list of roles to apply plus playbook-level variables.
use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use super::toml_loader;
use crate::error::ConfigError;

/// Roles the engine knows how to run, in their conventional order.
pub const KNOWN_ROLES: &[&str] = &["user", "packages", "bash", "tmux", "neovim"];

/// A parsed playbook.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Playbook {
    /// Display name.
    pub name: String,
    /// Roles in execution order.
    pub roles: Vec<String>,
    /// Variables layered over `conf/vars.toml`.
    pub vars: toml::Table,
}

/// Load a playbook file.
///
/// # Errors
///
/// Returns an error if the file is missing or unparsable, names an unknown
/// role, or lists a role twice.
pub fn load(path: &Path) -> Result<Playbook, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::Io {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "playbook not found"),
        });
    }
    let mut playbook: Playbook = toml_loader::load_config(path)?;
    if playbook.name.is_empty() {
        playbook.name = path
            .file_stem()
            .map_or_else(|| "playbook".to_string(), |s| s.to_string_lossy().to_string());
    }
    check_roles(&playbook.roles)?;
    Ok(playbook)
}

fn check_roles(roles: &[String]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for role in roles {
        if !KNOWN_ROLES.contains(&role.as_str()) {
            return Err(ConfigError::UnknownRole(role.clone()));
        }
        if !seen.insert(role.as_str()) {
            return Err(ConfigError::InvalidSyntax {
                file: "playbook".to_string(),
                message: format!("role '{role}' is listed more than once"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::test_helpers::write_temp_toml;

    #[test]
    fn load_roles_in_order() {
        let (_dir, path) = write_temp_toml(
            r#"name = "workstation"
roles = ["packages", "user", "neovim"]

[vars]
user_name = "alice"
"#,
        );
        let playbook = load(&path).unwrap();
        assert_eq!(playbook.name, "workstation");
        assert_eq!(playbook.roles, vec!["packages", "user", "neovim"]);
        assert_eq!(
            playbook.vars.get("user_name").and_then(toml::Value::as_str),
            Some("alice")
        );
    }

    #[test]
    fn name_defaults_to_file_stem() {
        let (_dir, path) = write_temp_toml("roles = [\"bash\"]\n");
        assert_eq!(load(&path).unwrap().name, "config");
    }

    #[test]
    fn unknown_role_is_rejected() {
        let (_dir, path) = write_temp_toml("roles = [\"emacs\"]\n");
        assert!(matches!(load(&path), Err(ConfigError::UnknownRole(r)) if r == "emacs"));
    }

    #[test]
    fn duplicate_role_is_rejected() {
        let (_dir, path) = write_temp_toml("roles = [\"bash\", \"bash\"]\n");
        let err = load(&path).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn missing_playbook_is_an_error() {
        assert!(matches!(
            load(Path::new("/nonexistent/site.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
