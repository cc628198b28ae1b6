//! Broker connection

use anyhow::{Context, Result};
use logonbroker_common::PipeClient;
use std::path::Path;

#[cfg(unix)]
pub type BrokerClient = PipeClient<tokio::net::UnixStream>;

#[cfg(windows)]
pub type BrokerClient = PipeClient<tokio::net::windows::named_pipe::NamedPipeClient>;

/// Connect to the broker's Unix socket; `socket` overrides the path derived from `pipe`
#[cfg(unix)]
pub async fn connect(pipe: &str, socket: Option<&Path>) -> Result<BrokerClient> {
    let path = socket
        .map(Path::to_path_buf)
        .unwrap_or_else(|| logonbroker_common::default_socket_path(pipe));
    PipeClient::connect(&path)
        .await
        .with_context(|| format!("cannot reach broker at {}", path.display()))
}

/// Connect to the broker's named pipe
#[cfg(windows)]
pub async fn connect(pipe: &str, _socket: Option<&Path>) -> Result<BrokerClient> {
    PipeClient::connect(pipe)
        .await
        .with_context(|| format!("cannot reach broker pipe {}", pipe))
}
