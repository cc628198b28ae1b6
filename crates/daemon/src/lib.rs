//! Logon broker daemon
//!
//! Runs authentication, password-change and session notifications through
//! ordered plugins and keeps the per-session identity cache consistent
//! across logons and logoffs.

pub mod builtin;
pub mod config;
pub mod dispatch;
pub mod environment;
pub mod motd;
pub mod pipeline;
pub mod plugins;
pub mod reconciler;
pub mod server;
pub mod service;
pub mod state;

#[cfg(test)]
mod testing;

pub use config::DaemonConfig;
pub use dispatch::Dispatcher;
pub use pipeline::{LoginProcess, Pipeline};
pub use plugins::PluginRegistry;
pub use reconciler::Reconciler;
pub use service::Service;
pub use state::BrokerState;
