//! Shared broker state

use crate::config::DaemonConfig;
use crate::environment::SessionEnvironment;
use crate::motd::{HostInfo, SystemHostInfo};
use crate::pipeline::{LoginProcess, OrderedAuthentication};
use crate::plugins::PluginRegistry;
use logonbroker_common::SessionPropertyCache;
use std::sync::Arc;

/// Everything request handlers and session workers share
#[derive(Clone)]
pub struct BrokerState {
    config: Arc<DaemonConfig>,
    cache: Arc<SessionPropertyCache>,
    registry: Arc<PluginRegistry>,
    login_process: Arc<dyn LoginProcess>,
    environment: Arc<dyn SessionEnvironment>,
    host: Arc<dyn HostInfo>,
}

impl BrokerState {
    /// Create broker state with an empty cache
    ///
    /// Logins run the registry's Authenticate plugins in order unless a
    /// different login process is supplied.
    pub fn new(
        config: DaemonConfig,
        registry: PluginRegistry,
        environment: Arc<dyn SessionEnvironment>,
    ) -> Self {
        let login_process = Arc::new(OrderedAuthentication::from_registry(&registry));
        Self {
            config: Arc::new(config),
            cache: Arc::new(SessionPropertyCache::new()),
            registry: Arc::new(registry),
            login_process,
            environment,
            host: Arc::new(SystemHostInfo),
        }
    }

    /// Replace the authentication pipeline
    pub fn with_login_process(mut self, login_process: Arc<dyn LoginProcess>) -> Self {
        self.login_process = login_process;
        self
    }

    /// Replace the host facts used by templates
    pub fn with_host_info(mut self, host: Arc<dyn HostInfo>) -> Self {
        self.host = host;
        self
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn cache(&self) -> &SessionPropertyCache {
        &self.cache
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn login_process(&self) -> &dyn LoginProcess {
        self.login_process.as_ref()
    }

    pub fn environment(&self) -> &dyn SessionEnvironment {
        self.environment.as_ref()
    }

    pub fn host(&self) -> &dyn HostInfo {
        self.host.as_ref()
    }
}
