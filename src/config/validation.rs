//! Pre-flight validation of configuration.
//!
//! Two kinds of checks live here: strict parsers used by tasks right
//! before they act ([`check_user_name`], [`SshPublicKey::parse`]), and
//! [`ConfigValidator`] implementations that collect non-fatal
//! [`ValidationWarning`]s for `devenv validate` and the start of a run.
use std::fmt;
use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use super::Config;
use super::playbook::KNOWN_ROLES;
use crate::error::ConfigError;

/// Longest user name accepted by `useradd`.
const USER_NAME_MAX_LEN: usize = 32;

/// Key types accepted in `ssh_public_key`.
pub const SUPPORTED_KEY_TYPES: &[&str] = &[
    "ssh-ed25519",
    "ssh-rsa",
    "ecdsa-sha2-nistp256",
    "ecdsa-sha2-nistp384",
    "ecdsa-sha2-nistp521",
    "sk-ssh-ed25519@openssh.com",
    "sk-ecdsa-sha2-nistp256@openssh.com",
];

/// Check a user name against `[a-z_][a-z0-9_-]{0,31}`.
///
/// The name ends up in a sudoers drop-in path and rule, so anything
/// outside this conservative set is refused.
///
/// # Errors
///
/// Returns [`ConfigError::MissingVariable`] for an empty name and
/// [`ConfigError::InvalidVariable`] otherwise.
pub fn check_user_name(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidVariable {
        name: "user_name".to_string(),
        reason: format!("'{name}' {reason}"),
    };

    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(ConfigError::MissingVariable("user_name".to_string()));
    };
    if name.len() > USER_NAME_MAX_LEN {
        return Err(invalid("is longer than 32 characters"));
    }
    if !(first.is_ascii_lowercase() || first == '_') {
        return Err(invalid("must start with a lowercase letter or underscore"));
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-') {
        return Err(invalid(
            "may only contain lowercase letters, digits, '_' and '-'",
        ));
    }
    Ok(())
}

/// A parsed OpenSSH public key line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshPublicKey {
    /// Algorithm name, e.g. `ssh-ed25519`.
    pub key_type: String,
    /// Base64 key blob.
    pub blob: String,
    /// Trailing comment, if any.
    pub comment: Option<String>,
}

impl SshPublicKey {
    /// Parse and verify `<type> <base64-blob> [comment]`.
    ///
    /// The blob must decode and start with the same key type in SSH wire
    /// format (big-endian `u32` length followed by the name).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVariable`] for an empty key and
    /// [`ConfigError::InvalidVariable`] for anything malformed.
    pub fn parse(line: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidVariable {
            name: "ssh_public_key".to_string(),
            reason,
        };

        let line = line.trim();
        if line.is_empty() {
            return Err(ConfigError::MissingVariable("ssh_public_key".to_string()));
        }
        if line.contains('\n') {
            return Err(invalid("must be a single line".to_string()));
        }

        let mut fields = line.split_whitespace();
        let key_type = fields.next().unwrap_or_default();
        if !SUPPORTED_KEY_TYPES.contains(&key_type) {
            return Err(invalid(format!("unsupported key type '{key_type}'")));
        }
        let blob = fields
            .next()
            .ok_or_else(|| invalid("missing key data".to_string()))?;
        let comment = fields.collect::<Vec<_>>().join(" ");

        let decoded = STANDARD
            .decode(blob)
            .map_err(|e| invalid(format!("key data is not valid base64: {e}")))?;
        if embedded_type(&decoded) != Some(key_type.as_bytes()) {
            return Err(invalid(format!("key data does not contain a {key_type} key")));
        }

        Ok(Self {
            key_type: key_type.to_string(),
            blob: blob.to_string(),
            comment: (!comment.is_empty()).then_some(comment),
        })
    }

    /// Whether an `authorized_keys` line holds this key.
    ///
    /// Lines may start with an options field; comments are ignored.
    #[must_use]
    pub fn matches_line(&self, line: &str) -> bool {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let wanted = [self.key_type.as_str(), self.blob.as_str()];
        fields.windows(2).any(|w| w == wanted)
    }
}

impl fmt::Display for SshPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.key_type, self.blob)?;
        if let Some(comment) = &self.comment {
            write!(f, " {comment}")?;
        }
        Ok(())
    }
}

/// The key type name at the start of an SSH wire-format blob.
fn embedded_type(blob: &[u8]) -> Option<&[u8]> {
    let len_bytes: [u8; 4] = blob.get(..4)?.try_into().ok()?;
    let len = usize::try_from(u32::from_be_bytes(len_bytes)).ok()?;
    blob.get(4..4_usize.checked_add(len)?)
}

/// A validation warning detected during configuration loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    /// The configuration source (e.g., "vars", "files.toml").
    pub source: String,
    /// The specific item that triggered the warning.
    pub item: String,
    /// Human-readable warning message.
    pub message: String,
}

impl ValidationWarning {
    /// Warning about `item` from `source`.
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        item: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            item: item.into(),
            message: message.into(),
        }
    }
}

/// Trait for configuration validators.
pub trait ConfigValidator {
    /// Validate the configuration and return any warnings found.
    fn validate(&self, config: &Config) -> Vec<ValidationWarning>;

    /// Return a human-readable name for this validator.
    fn name(&self) -> &'static str;
}

/// Validates the variable set against the roles that will consume it.
#[derive(Debug, Default)]
pub struct VarsValidator;

impl ConfigValidator for VarsValidator {
    fn validate(&self, config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        let vars = &config.vars;

        if let Err(e) = check_user_name(&vars.user_name) {
            warnings.push(ValidationWarning::new("vars", "user_name", e.to_string()));
        }

        let runs_user_role = config.playbook.roles.iter().any(|r| r == "user");
        if vars.create_user && runs_user_role {
            if let Err(e) = SshPublicKey::parse(&vars.ssh_public_key) {
                warnings.push(ValidationWarning::new("vars", "ssh_public_key", e.to_string()));
            }
            if !vars.user_shell.starts_with('/') {
                warnings.push(ValidationWarning::new(
                    "vars",
                    "user_shell",
                    "shell should be an absolute path",
                ));
            }
        }

        if let Some(home) = &vars.user_home
            && !home.starts_with('/')
        {
            warnings.push(ValidationWarning::new(
                "vars",
                "user_home",
                "home directory should be an absolute path",
            ));
        }

        for package in &vars.packages {
            if package.trim().is_empty() || package.starts_with('-') {
                warnings.push(ValidationWarning::new(
                    "vars",
                    package,
                    "package name is empty or looks like an option",
                ));
            }
        }

        warnings
    }

    fn name(&self) -> &'static str {
        "vars"
    }
}

/// Validates the deployment manifest against `files/`.
#[derive(Debug, Default)]
pub struct FilesValidator;

impl ConfigValidator for FilesValidator {
    fn validate(&self, config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        let files_dir = config.files_dir();

        for (role, entry) in config.files.iter() {
            if !KNOWN_ROLES.contains(&role) {
                warnings.push(ValidationWarning::new(
                    "files.toml",
                    role,
                    "section does not name a known role",
                ));
            }
            let source = files_dir.join(&entry.source);
            if !source.is_file() {
                warnings.push(ValidationWarning::new(
                    "files.toml",
                    &entry.source,
                    format!("source file does not exist: {}", source.display()),
                ));
            }
        }

        warnings
    }

    fn name(&self) -> &'static str {
        "files"
    }
}

/// Validate all configuration and return collected warnings.
#[must_use]
pub fn validate_all(config: &Config) -> Vec<ValidationWarning> {
    let validators: Vec<Box<dyn ConfigValidator>> =
        vec![Box::new(VarsValidator), Box::new(FilesValidator)];

    let mut all_warnings = Vec::new();
    for validator in validators {
        let warnings = validator.validate(config);
        tracing::debug!(
            "validator {}: {} warning(s)",
            validator.name(),
            warnings.len()
        );
        all_warnings.extend(warnings);
    }
    all_warnings
}

/// Whether `path` looks like a repository root.
#[must_use]
pub fn is_repo_root(path: &Path) -> bool {
    path.join("conf").is_dir() && path.join("files").is_dir()
}
