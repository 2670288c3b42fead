//! File deployment manifest.
//!
//! `conf/files.toml` has one section per role:
//!
//! ```toml
//! [neovim]
//! files = [
//!   { source = "nvim/init.lua", target = ".config/nvim/init.lua" },
//! ]
//! ```
//!
//! `source` is relative to `files/`, `target` to the user's home directory.
use std::collections::BTreeMap;
use std::path::{Component, Path};

use serde::Deserialize;

use super::toml_loader;
use crate::error::ConfigError;

/// Mode applied when an entry does not set one.
pub const DEFAULT_MODE: u32 = 0o644;

/// A file to deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path below `files/`.
    pub source: String,
    /// Path below the user's home directory.
    pub target: String,
    /// Permission bits.
    pub mode: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntry {
    source: String,
    target: String,
    mode: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSection {
    files: Vec<RawEntry>,
}

/// Files grouped by role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    roles: BTreeMap<String, Vec<FileEntry>>,
}

impl Manifest {
    /// Files deployed by `role`, in manifest order.
    #[must_use]
    pub fn for_role(&self, role: &str) -> &[FileEntry] {
        self.roles.get(role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Append `entry` to `role`.
    #[cfg(test)]
    pub(crate) fn insert(&mut self, role: &str, entry: FileEntry) {
        self.roles.entry(role.to_string()).or_default().push(entry);
    }

    /// Every entry with the role it belongs to.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileEntry)> {
        self.roles
            .iter()
            .flat_map(|(role, files)| files.iter().map(move |f| (role.as_str(), f)))
    }
}

/// Load the manifest.
///
/// # Errors
///
/// Returns an error if the file cannot be parsed or an entry has an
/// invalid mode or a target outside the home directory.
pub fn load(path: &Path) -> Result<Manifest, ConfigError> {
    let sections = toml_loader::load_section_items(path, |s: FileSection| s.files)?;
    let mut roles = BTreeMap::new();
    for (role, raw) in sections {
        let entries = raw
            .into_iter()
            .map(FileEntry::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        roles.insert(role, entries);
    }
    Ok(Manifest { roles })
}

impl TryFrom<RawEntry> for FileEntry {
    type Error = ConfigError;

    fn try_from(raw: RawEntry) -> Result<Self, Self::Error> {
        let invalid = |reason: &str| ConfigError::InvalidManifest {
            entry: raw.target.clone(),
            reason: reason.to_string(),
        };

        if raw.source.is_empty() || raw.target.is_empty() {
            return Err(invalid("source and target must not be empty"));
        }
        if !is_contained(&raw.target) {
            return Err(invalid("target must be a relative path inside the home directory"));
        }
        if !is_contained(&raw.source) {
            return Err(invalid("source must be a relative path inside files/"));
        }
        let mode = match &raw.mode {
            Some(m) => parse_mode(m)
                .ok_or_else(|| invalid("mode must be an octal string such as \"0644\""))?,
            None => DEFAULT_MODE,
        };

        Ok(Self {
            source: raw.source,
            target: raw.target,
            mode,
        })
    }
}

/// Relative path with no `..`, root or prefix components.
fn is_contained(path: &str) -> bool {
    Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Parse a 3 or 4 digit octal permission string.
#[must_use]
pub fn parse_mode(mode: &str) -> Option<u32> {
    if !(3..=4).contains(&mode.len()) {
        return None;
    }
    u32::from_str_radix(mode, 8).ok().filter(|m| *m <= 0o7777)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::test_helpers::write_temp_toml;

    #[test]
    fn load_sections_per_role() {
        let (_dir, path) = write_temp_toml(
            r#"[bash]
files = [{ source = "bash/bashrc", target = ".bashrc" }]

[neovim]
files = [
  { source = "nvim/init.lua", target = ".config/nvim/init.lua" },
  { source = "nvim/lua/keymaps.lua", target = ".config/nvim/lua/keymaps.lua", mode = "0600" },
]
"#,
        );
        let manifest = load(&path).unwrap();
        assert_eq!(manifest.for_role("bash").len(), 1);
        assert_eq!(manifest.for_role("bash")[0].mode, DEFAULT_MODE);
        let nvim = manifest.for_role("neovim");
        assert_eq!(nvim.len(), 2);
        assert_eq!(nvim[1].mode, 0o600);
        assert!(manifest.for_role("tmux").is_empty());
        assert_eq!(manifest.iter().count(), 3);
    }

    #[test]
    fn missing_file_is_empty_manifest() {
        let manifest = load(Path::new("/nonexistent/files.toml")).unwrap();
        assert_eq!(manifest, Manifest::default());
    }

    #[test]
    fn absolute_target_is_rejected() {
        let (_dir, path) = write_temp_toml(
            "[bash]\nfiles = [{ source = \"bash/bashrc\", target = \"/etc/bashrc\" }]\n",
        );
        assert!(matches!(
            load(&path),
            Err(ConfigError::InvalidManifest { .. })
        ));
    }

    #[test]
    fn escaping_target_is_rejected() {
        let (_dir, path) = write_temp_toml(
            "[bash]\nfiles = [{ source = \"bash/bashrc\", target = \"../other/.bashrc\" }]\n",
        );
        let err = load(&path).unwrap_err();
        assert!(err.to_string().contains("inside the home directory"));
    }

    #[test]
    fn bad_mode_is_rejected() {
        let (_dir, path) = write_temp_toml(
            "[bash]\nfiles = [{ source = \"bash/bashrc\", target = \".bashrc\", mode = \"0999\" }]\n",
        );
        assert!(load(&path).is_err());
    }

    #[test]
    fn parse_mode_accepts_three_and_four_digits() {
        assert_eq!(parse_mode("644"), Some(0o644));
        assert_eq!(parse_mode("0755"), Some(0o755));
        assert_eq!(parse_mode("4755"), Some(0o4755));
        assert_eq!(parse_mode("75"), None);
        assert_eq!(parse_mode("rwx"), None);
    }
}
