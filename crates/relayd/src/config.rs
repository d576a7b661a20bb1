//! Daemon configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default loopback address for the debug transport.
pub const DEFAULT_DEBUG_ADDRESS: &str = "127.0.0.1:44080";

/// Endpoint ACL for a Windows named-pipe deployment, in SDDL form. Treated
/// as opaque configuration by the core; the policy denies network-originated
/// access and pipe-instance creation by unprivileged principals, grants full
/// access to administrators and the local system account, and read/write to
/// authenticated users and the built-in guest account.
pub const DEFAULT_PIPE_SECURITY_DESCRIPTOR: &str = "D:(D;OICI;GA;;;S-1-5-2)(A;OICI;GA;;;S-1-5-32-544)(A;OICI;GA;;;S-1-5-18)(D;OICI;0x4;;;S-1-1-0)(A;OICI;GRGW;;;S-1-5-11)(A;OICI;GRGW;;;S-1-5-32-546)";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub server: ServerSettings,
    #[serde(default)]
    pub transport: TransportSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Run headless under a service manager
    pub service_mode: bool,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    /// Listen on loopback TCP instead of the local socket
    #[serde(default)]
    pub debug: bool,
    /// Address for the debug transport
    #[serde(default = "TransportSettings::default_address")]
    pub address: String,
    /// Local socket path for the production transport
    #[serde(default = "TransportSettings::default_socket_path")]
    pub socket_path: PathBuf,
    /// File mode applied to the local socket at creation (the endpoint's
    /// access policy on Unix hosts)
    #[serde(default = "TransportSettings::default_socket_mode")]
    pub socket_mode: u32,
    /// Endpoint ACL for a named-pipe deployment; opaque to the core
    #[serde(default = "TransportSettings::default_security_descriptor")]
    pub security_descriptor: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            service_mode: false,
            log_level: "info".to_string(),
        }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            debug: false,
            address: Self::default_address(),
            socket_path: Self::default_socket_path(),
            socket_mode: Self::default_socket_mode(),
            security_descriptor: Self::default_security_descriptor(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            transport: TransportSettings::default(),
        }
    }
}

impl TransportSettings {
    fn default_address() -> String {
        DEFAULT_DEBUG_ADDRESS.to_string()
    }

    fn default_socket_path() -> PathBuf {
        if let Some(runtime_dir) = dirs::runtime_dir() {
            runtime_dir.join("ctaphid-relay").join("relay.sock")
        } else {
            PathBuf::from("/run/ctaphid-relay/relay.sock")
        }
    }

    fn default_socket_mode() -> u32 {
        0o660
    }

    fn default_security_descriptor() -> String {
        DEFAULT_PIPE_SECURITY_DESCRIPTOR.to_string()
    }
}

impl RelayConfig {
    /// Default configuration file location.
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("ctaphid-relay").join("relayd.toml")
        } else {
            PathBuf::from("/etc/ctaphid-relay/relayd.toml")
        }
    }

    /// Load configuration from a specific path, or from the default path
    /// when none is given.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = path.unwrap_or_else(Self::default_path);
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load from the default path chain, falling back to built-in defaults
    /// when no config file exists.
    pub fn load_or_default() -> Self {
        let candidates = [
            Self::default_path(),
            PathBuf::from("/etc/ctaphid-relay/relayd.toml"),
        ];

        for path in candidates {
            if path.exists() {
                match Self::load(Some(path.clone())) {
                    Ok(config) => return config,
                    Err(e) => {
                        eprintln!("Warning: ignoring unreadable config {}: {e:#}", path.display());
                    }
                }
            }
        }

        Self::default()
    }

    /// Write this configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}
