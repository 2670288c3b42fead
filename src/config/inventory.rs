//! Target host inventory.
//!
//! `-i` accepts either a path to a TOML inventory file or a comma-separated
//! host list (`host`, `user@host`, `host:port`).
use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use super::toml_loader;
use crate::error::ConfigError;

/// Addresses that are always reached through the local transport.
const LOCAL_ADDRESSES: &[&str] = &["localhost", "127.0.0.1", "::1"];

/// How commands reach a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Processes on this machine.
    Local,
    /// The system `ssh` client.
    Ssh,
}

/// A target host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    /// Name used in output.
    pub name: String,
    /// Address passed to `ssh` (defaults to the name).
    pub address: String,
    /// SSH port when not the default.
    pub port: Option<u16>,
    /// Login user for this host.
    pub user: Option<String>,
    /// Transport.
    pub transport: Transport,
}

impl Host {
    /// A host reached through the local transport.
    #[must_use]
    pub fn local(name: &str) -> Self {
        Self {
            name: name.to_string(),
            address: name.to_string(),
            port: None,
            user: None,
            transport: Transport::Local,
        }
    }

    /// Whether `address` refers to this machine.
    #[must_use]
    pub fn is_local_address(address: &str) -> bool {
        LOCAL_ADDRESSES.contains(&address)
    }
}

/// Ordered, duplicate-free list of hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inventory {
    /// Hosts in declaration order.
    pub hosts: Vec<Host>,
}

impl Inventory {
    /// The default inventory: this machine only.
    #[must_use]
    pub fn local() -> Self {
        Self {
            hosts: vec![Host::local("localhost")],
        }
    }

    fn new(hosts: Vec<Host>) -> Result<Self, ConfigError> {
        if hosts.is_empty() {
            return Err(ConfigError::InvalidInventory("no hosts defined".to_string()));
        }
        let mut seen = HashSet::new();
        for host in &hosts {
            if !seen.insert(host.name.as_str()) {
                return Err(ConfigError::InvalidInventory(format!(
                    "duplicate host '{}'",
                    host.name
                )));
            }
        }
        Ok(Self { hosts })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InventoryFile {
    #[serde(default)]
    hosts: Vec<HostEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HostEntry {
    name: String,
    address: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    connection: Option<Transport>,
}

impl From<HostEntry> for Host {
    fn from(entry: HostEntry) -> Self {
        let address = entry.address.unwrap_or_else(|| entry.name.clone());
        let transport = entry.connection.unwrap_or(if Self::is_local_address(&address) {
            Transport::Local
        } else {
            Transport::Ssh
        });
        Self {
            name: entry.name,
            address,
            port: entry.port,
            user: entry.user,
            transport,
        }
    }
}

/// Load an inventory file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, defines no hosts,
/// or repeats a host name.
pub fn load(path: &Path) -> Result<Inventory, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::InvalidInventory(format!(
            "inventory file not found: {}",
            path.display()
        )));
    }
    let file: InventoryFile = toml_loader::load_config(path)?;
    Inventory::new(file.hosts.into_iter().map(Host::from).collect())
}

/// Interpret the `-i` argument.
///
/// Anything containing a comma, or not naming an existing file, is read as
/// a host list.
///
/// # Errors
///
/// Returns an error if the inventory is empty, malformed, or has duplicates.
pub fn parse_arg(arg: &str) -> Result<Inventory, ConfigError> {
    let path = Path::new(arg);
    if !arg.contains(',') && path.is_file() {
        return load(path);
    }
    let hosts = arg
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_host)
        .collect::<Result<Vec<_>, _>>()?;
    Inventory::new(hosts)
}

/// Parse `[user@]host[:port]`.
fn parse_host(spec: &str) -> Result<Host, ConfigError> {
    let (user, rest) = match spec.split_once('@') {
        Some((user, rest)) if !user.is_empty() => (Some(user.to_string()), rest),
        Some(_) => {
            return Err(ConfigError::InvalidInventory(format!(
                "empty user in '{spec}'"
            )));
        }
        None => (None, spec),
    };

    // A bare IPv6 address has several colons and no port.
    let (address, port) = match rest.rsplit_once(':') {
        Some((addr, port)) if !addr.contains(':') => {
            let port = port.parse::<u16>().map_err(|_| {
                ConfigError::InvalidInventory(format!("invalid port in '{spec}'"))
            })?;
            (addr, Some(port))
        }
        _ => (rest, None),
    };
    if address.is_empty() {
        return Err(ConfigError::InvalidInventory(format!(
            "empty host in '{spec}'"
        )));
    }

    let transport = if Host::is_local_address(address) && user.is_none() && port.is_none() {
        Transport::Local
    } else {
        Transport::Ssh
    };
    Ok(Host {
        name: address.to_string(),
        address: address.to_string(),
        port,
        user,
        transport,
    })
}
