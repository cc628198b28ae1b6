//! Logon broker common library
//!
//! Data model, session property cache and the line protocol shared by the
//! broker daemon and its clients.

pub mod cache;
pub mod client;
pub mod error;
pub mod protocol;
pub mod types;

// Re-export commonly used types
pub use cache::{CacheGuard, SessionEntryList, SessionPropertyCache};
pub use client::PipeClient;
pub use error::{Error, Result};
pub use protocol::{MessageType, Request, Response};
pub use types::*;

/// Broker version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default IPC endpoint name
pub const DEFAULT_PIPE_NAME: &str = "LogonBrokerPipe";

/// Full path of a named pipe on Windows
pub fn named_pipe_path(pipe_name: &str) -> String {
    format!(r"\\.\pipe\{}", pipe_name)
}

/// Default Unix socket path for an endpoint name
pub fn default_socket_path(pipe_name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("{}.sock", pipe_name))
}
