//! Service lifecycle
//!
//! Explicit startup and teardown around the IPC server, plus the entry
//! points the host's service control handler calls into.

use crate::dispatch::Dispatcher;
use crate::pipeline::Pipeline;
use crate::plugins::{Lifecycle, Plugin};
use crate::reconciler::Reconciler;
use crate::server::{Endpoint, IpcServer};
use crate::state::BrokerState;
use logonbroker_common::{Error, Result, SessionChangeReason, SessionId};
use std::panic;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

struct RunningServer {
    endpoint: String,
    panic_hook: PanicHookGuard,
    shutdown: CancellationToken,
    handle: JoinHandle<Result<()>>,
}

/// The broker service
pub struct Service {
    state: BrokerState,
    dispatcher: Arc<Dispatcher>,
    reconciler: Arc<Reconciler>,
    pipeline: Pipeline,
    running: Option<RunningServer>,
}

impl Service {
    pub fn new(state: BrokerState) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(state.clone())),
            reconciler: Arc::new(Reconciler::new(state.clone())),
            pipeline: Pipeline::new(state.clone()),
            state,
            running: None,
        }
    }

    pub fn state(&self) -> &BrokerState {
        &self.state
    }

    /// Bind the endpoint, start accepting clients and tell lifecycle plugins
    pub async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Err(Error::Internal("service already started".to_string()));
        }

        let panic_hook = install_panic_hook();

        let config = &self.state.config().ipc;
        let endpoint = match Endpoint::bind(config) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                panic_hook.restore();
                return Err(e);
            }
        };
        let description = endpoint.describe();

        let shutdown = CancellationToken::new();
        let server = Arc::new(IpcServer::new(
            Arc::clone(&self.dispatcher),
            config,
            shutdown.clone(),
        ));
        let handle = tokio::spawn(server.run(endpoint));

        for plugin in self.state.registry().lifecycle() {
            debug!("Starting plugin {} ({})", plugin.name(), plugin.uuid());
            plugin.starting();
        }

        info!("Logon broker service started on {}", description);
        self.running = Some(RunningServer {
            endpoint: description,
            panic_hook,
            shutdown,
            handle,
        });
        Ok(())
    }

    /// Tell lifecycle plugins, stop accepting clients and wait for the server
    pub async fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        for plugin in self.state.registry().lifecycle() {
            debug!("Stopping plugin {} ({})", plugin.name(), plugin.uuid());
            plugin.stopping();
        }

        running.shutdown.cancel();
        let result = match running.handle.await {
            Ok(result) => result,
            Err(e) => {
                error!("IPC server task failed: {}", e);
                Err(Error::Internal(e.to_string()))
            }
        };

        running.panic_hook.restore();
        info!("Logon broker service stopped");
        result
    }

    /// Handle a session change on its own blocking worker
    pub fn session_change(&self, session: SessionId, reason: SessionChangeReason) -> JoinHandle<()> {
        let reconciler = Arc::clone(&self.reconciler);
        tokio::task::spawn_blocking(move || reconciler.handle_session_change(session, reason))
    }

    /// Whether any plugin asks for more time before a logoff completes
    pub fn custom_command(&self) -> bool {
        self.pipeline.logoff_request_add_time()
    }

    /// Endpoint the server is listening on, while running
    pub fn endpoint(&self) -> Option<&str> {
        self.running.as_ref().map(|r| r.endpoint.as_str())
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

/// Puts back the panic hook that was active before the service started
struct PanicHookGuard {
    restore: Box<dyn FnOnce() + Send>,
}

impl PanicHookGuard {
    fn restore(self) {
        (self.restore)();
    }
}

/// Log panics through tracing, then hand them to the previous hook
fn install_panic_hook() -> PanicHookGuard {
    let previous = Arc::new(panic::take_hook());
    let chained = Arc::clone(&previous);
    panic::set_hook(Box::new(move |info| {
        error!("Panic: {}", info);
        chained(info);
    }));

    PanicHookGuard {
        restore: Box::new(move || {
            drop(panic::take_hook());
            panic::set_hook(Box::new(move |info| previous(info)));
        }),
    }
}
