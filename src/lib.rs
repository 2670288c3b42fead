//! Development-environment provisioning engine.
//!
//! Converges one or more hosts to a declared state: a user account with an
//! authorized SSH key and passwordless sudo, a set of OS packages, and the
//! static bash/tmux/neovim configuration shipped under `files/`. Everything
//! is driven by TOML files in `conf/` and every step is idempotent, so a
//! second run over the same host reports no changes.
//!
//! The public API is organised into layers:
//!
//! - **[`config`]**: load and validate variables, inventory, playbook and manifest
//! - **[`exec`]** / **[`connection`]**: run commands locally, over SSH, and via sudo
//! - **[`resources`]**: idempotent `check + apply` primitives (users, files, packages, …)
//! - **[`tasks`]**: named, guarded units of work grouped into roles
//! - **[`commands`]**: top-level subcommand orchestration (`provision`, `validate`, …)
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod exec;
pub mod logging;
pub mod resources;
pub mod tasks;
