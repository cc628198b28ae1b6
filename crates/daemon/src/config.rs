//! Daemon configuration

use logonbroker_common::protocol::DEFAULT_MAX_MESSAGE_BYTES;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// IPC endpoint configuration
    pub ipc: IpcConfig,

    /// Log the type of every received message
    pub trace_message_traffic: bool,

    /// Message-of-the-day template served for the `MOTD` label
    pub motd: String,

    /// Plugin ordering
    pub plugins: PluginConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            ipc: IpcConfig::default(),
            trace_message_traffic: false,
            motd: "Logon broker version: %v".to_string(),
            plugins: PluginConfig::default(),
        }
    }
}

/// IPC endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    /// Endpoint name; the named pipe name on Windows
    pub pipe_name: String,

    /// Unix socket path, derived from the pipe name when unset
    pub socket_path: Option<PathBuf>,

    /// Maximum concurrent client connections
    pub max_clients: usize,

    /// Maximum length of one encoded message
    pub max_message_bytes: usize,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            pipe_name: logonbroker_common::DEFAULT_PIPE_NAME.to_string(),
            socket_path: None,
            max_clients: 25,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

impl IpcConfig {
    /// Resolved Unix socket path
    pub fn socket_path(&self) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(|| logonbroker_common::default_socket_path(&self.pipe_name))
    }
}

/// Plugin configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    pub order: PluginOrder,
}

/// Execution order per capability, as plugin UUIDs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginOrder {
    pub authenticate: Vec<Uuid>,
    pub change_password: Vec<Uuid>,
    pub notify: Vec<Uuid>,
    pub defer_logoff: Vec<Uuid>,
    pub lifecycle: Vec<Uuid>,
}

impl DaemonConfig {
    /// Load configuration from file
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> logonbroker_common::Result<()> {
        use logonbroker_common::Error;

        if self.ipc.pipe_name.trim().is_empty() {
            return Err(Error::InvalidConfig("ipc.pipe_name is empty".to_string()));
        }
        if self.ipc.max_clients == 0 {
            return Err(Error::InvalidConfig(
                "ipc.max_clients must be at least 1".to_string(),
            ));
        }
        if self.ipc.max_message_bytes < 64 {
            return Err(Error::InvalidConfig(
                "ipc.max_message_bytes is too small".to_string(),
            ));
        }
        Ok(())
    }
}
