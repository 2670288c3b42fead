//! Domain-specific error types for the provisioning engine.
//!
//! Internal modules return typed errors (e.g., [`ConfigError`], [`TaskError`])
//! while command handlers at the CLI boundary convert them to
//! [`anyhow::Error`] via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! DevenvError
//! ├── Config(ConfigError)         : TOML parsing, variables, inventory, playbook
//! ├── Task(TaskError)             : task failure, halted runs, interruption
//! ├── Connection(ConnectionError) : unreachable hosts, transport setup
//! └── Resource(ResourceError)     : command failures, privilege errors
//! ```

use thiserror::Error;

pub use crate::resources::error::ResourceError;

/// Top-level error type for the provisioning engine.
#[derive(Error, Debug)]
pub enum DevenvError {
    /// Configuration-related error (parsing, variables, inventory).
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Task execution error.
    #[error("Task execution error: {0}")]
    Task(#[from] TaskError),

    /// Connectivity error for a target host.
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Resource operation error (command failure, permission denied).
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),
}

/// Errors that arise from loading configuration and resolving variables.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A variable has a value that cannot be used (bad username, bad key).
    #[error("invalid value for variable '{name}': {reason}")]
    InvalidVariable {
        /// Variable name.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A variable required by the current run is empty or absent.
    #[error("variable '{0}' is required")]
    MissingVariable(String),

    /// A `-e key=value` override could not be parsed.
    #[error("invalid override '{0}': expected KEY=VALUE")]
    InvalidOverride(String),

    /// The playbook names a role that does not exist.
    #[error("unknown role '{0}'")]
    UnknownRole(String),

    /// The inventory is empty or malformed.
    #[error("invalid inventory: {0}")]
    InvalidInventory(String),

    /// The file deployment manifest is malformed.
    #[error("invalid file manifest entry '{entry}': {reason}")]
    InvalidManifest {
        /// Offending entry (source or target path).
        entry: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The TOML file contains a syntax or schema error.
    #[error("invalid TOML in {file}: {message}")]
    InvalidSyntax {
        /// File that failed to parse.
        file: String,
        /// Parser message.
        message: String,
    },

    /// An I/O error occurred while reading a config file.
    #[error("IO error reading config file {path}: {source}")]
    Io {
        /// Path to the file that could not be read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors that arise during task execution.
#[derive(Error, Debug)]
pub enum TaskError {
    /// A task failed to execute.
    #[error("Task '{task}' failed: {reason}")]
    ExecutionFailed {
        /// Name of the task that failed.
        task: String,
        /// Human-readable reason for the failure.
        reason: String,
    },

    /// The run was interrupted before the task started.
    #[error("interrupted before '{0}'")]
    Interrupted(String),
}

/// Errors that arise from reaching a target host.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The host could not be reached (ssh exit 255, DNS, refused, timeout).
    #[error("host '{host}' is unreachable: {reason}")]
    Unreachable {
        /// Host name from the inventory.
        host: String,
        /// Transport diagnostic.
        reason: String,
    },

    /// The become password could not be read.
    #[error("failed to read become password: {0}")]
    PasswordPrompt(String),
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use std::io;

    // -----------------------------------------------------------------------
    // ConfigError
    // -----------------------------------------------------------------------

    #[test]
    fn config_error_invalid_variable_display() {
        let e = ConfigError::InvalidVariable {
            name: "user_name".to_string(),
            reason: "contains '/'".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "invalid value for variable 'user_name': contains '/'"
        );
    }

    #[test]
    fn config_error_missing_variable_display() {
        let e = ConfigError::MissingVariable("ssh_public_key".to_string());
        assert_eq!(e.to_string(), "variable 'ssh_public_key' is required");
    }

    #[test]
    fn config_error_unknown_role_display() {
        let e = ConfigError::UnknownRole("emacs".to_string());
        assert_eq!(e.to_string(), "unknown role 'emacs'");
    }

    #[test]
    fn config_error_io_has_source() {
        use std::error::Error as StdError;
        let e = ConfigError::Io {
            path: "/conf/vars.toml".to_string(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
        };
        assert!(e.to_string().contains("/conf/vars.toml"));
        assert!(e.source().is_some());
    }

    // -----------------------------------------------------------------------
    // TaskError / ConnectionError
    // -----------------------------------------------------------------------

    #[test]
    fn task_error_execution_failed_display() {
        let e = TaskError::ExecutionFailed {
            task: "user: authorize ssh key".to_string(),
            reason: "key is malformed".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "Task 'user: authorize ssh key' failed: key is malformed"
        );
    }

    #[test]
    fn connection_error_unreachable_display() {
        let e = ConnectionError::Unreachable {
            host: "devbox".to_string(),
            reason: "Connection refused".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "host 'devbox' is unreachable: Connection refused"
        );
    }

    // -----------------------------------------------------------------------
    // DevenvError conversions
    // -----------------------------------------------------------------------

    #[test]
    fn devenv_error_from_config_error() {
        let e: DevenvError = ConfigError::UnknownRole("x".to_string()).into();
        assert!(e.to_string().contains("Configuration error"));
    }

    #[test]
    fn devenv_error_from_connection_error() {
        let e: DevenvError = ConnectionError::PasswordPrompt("eof".to_string()).into();
        assert!(e.to_string().contains("Connection error"));
    }

    #[test]
    fn devenv_error_from_resource_error() {
        let e: DevenvError = ResourceError::NotFound {
            resource: "git".to_string(),
        }
        .into();
        assert!(e.to_string().contains("Resource error"));
    }

    #[test]
    fn unreachable_is_recoverable_from_anyhow() {
        let err: anyhow::Error = ConnectionError::Unreachable {
            host: "h".to_string(),
            reason: "timeout".to_string(),
        }
        .into();
        assert!(matches!(
            err.downcast_ref::<ConnectionError>(),
            Some(ConnectionError::Unreachable { .. })
        ));
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn all_error_types_are_send_sync() {
        assert_send_sync::<DevenvError>();
        assert_send_sync::<ConfigError>();
        assert_send_sync::<TaskError>();
        assert_send_sync::<ConnectionError>();
    }
}
