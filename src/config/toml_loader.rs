//! TOML configuration file parsing.
use std::collections::BTreeMap;
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::ConfigError;

/// Read and deserialize a TOML file.
///
/// A missing file deserializes from an empty document, so types whose
/// fields all carry defaults load successfully.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file exists but cannot be read and
/// [`ConfigError::InvalidSyntax`] if it does not parse into `T`.
pub fn load_config<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = if path.exists() {
        std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?
    } else {
        String::new()
    };
    parse(&content, path)
}

/// Deserialize TOML text, attributing errors to `path`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidSyntax`] if the text does not parse into `T`.
pub fn parse<T: DeserializeOwned>(content: &str, path: &Path) -> Result<T, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::InvalidSyntax {
        file: path.display().to_string(),
        message: e.message().to_string(),
    })
}

/// Load a TOML config file where each top-level section contains a single
/// repeated field, and return all items as `(section_name, Vec<T>)` pairs
/// in section-name order.
///
/// `extract` receives the deserialized section value and returns the `Vec<T>`
/// stored inside it (e.g. `|s: FileSection| s.files`).
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_section_items<S, T>(
    path: &Path,
    extract: impl Fn(S) -> Vec<T>,
) -> Result<Vec<(String, Vec<T>)>, ConfigError>
where
    S: DeserializeOwned,
{
    let config: BTreeMap<String, S> = load_config(path)?;
    Ok(config.into_iter().map(|(k, v)| (k, extract(v))).collect())
}
