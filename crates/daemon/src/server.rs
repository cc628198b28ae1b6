//! IPC server
//!
//! Accepts clients on a Unix socket or a Windows named pipe and runs one
//! task per connection. Each request is handled on a blocking worker so
//! slow plugins never stall the reactor.

use crate::config::IpcConfig;
use crate::dispatch::Dispatcher;
use futures::{SinkExt, StreamExt};
use logonbroker_common::{Response, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Semaphore;
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Bound listening endpoint
#[cfg(unix)]
pub struct Endpoint {
    listener: tokio::net::UnixListener,
    path: std::path::PathBuf,
}

#[cfg(unix)]
impl Endpoint {
    /// Bind the socket, replacing a stale file from an earlier run
    pub fn bind(config: &IpcConfig) -> Result<Self> {
        let path = config.socket_path();
        if path.exists() {
            debug!("Removing stale socket {}", path.display());
            std::fs::remove_file(&path)?;
        }
        let listener = tokio::net::UnixListener::bind(&path)?;
        Ok(Self { listener, path })
    }

    pub fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn accept(&mut self) -> Result<tokio::net::UnixStream> {
        let (stream, _) = self.listener.accept().await?;
        Ok(stream)
    }
}

#[cfg(unix)]
impl Drop for Endpoint {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Bound listening endpoint
#[cfg(windows)]
pub struct Endpoint {
    next: tokio::net::windows::named_pipe::NamedPipeServer,
    path: String,
}

#[cfg(windows)]
impl Endpoint {
    /// Create the first pipe instance; fails if another broker owns the name
    pub fn bind(config: &IpcConfig) -> Result<Self> {
        use tokio::net::windows::named_pipe::ServerOptions;

        let path = logonbroker_common::named_pipe_path(&config.pipe_name);
        let next = ServerOptions::new().first_pipe_instance(true).create(&path)?;
        Ok(Self { next, path })
    }

    pub fn describe(&self) -> String {
        self.path.clone()
    }

    async fn accept(&mut self) -> Result<tokio::net::windows::named_pipe::NamedPipeServer> {
        use tokio::net::windows::named_pipe::ServerOptions;

        self.next.connect().await?;
        // a fresh instance must exist before the connected one is handed off
        let next = ServerOptions::new().create(&self.path)?;
        Ok(std::mem::replace(&mut self.next, next))
    }
}

/// Connection acceptor and per-connection protocol loop
pub struct IpcServer {
    dispatcher: Arc<Dispatcher>,
    limiter: Arc<Semaphore>,
    max_message_bytes: usize,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl IpcServer {
    pub fn new(dispatcher: Arc<Dispatcher>, config: &IpcConfig, shutdown: CancellationToken) -> Self {
        Self {
            dispatcher,
            limiter: Arc::new(Semaphore::new(config.max_clients)),
            max_message_bytes: config.max_message_bytes,
            next_id: AtomicU64::new(1),
            shutdown,
        }
    }

    /// Accept clients until shutdown is requested
    pub async fn run(self: Arc<Self>, mut endpoint: Endpoint) -> Result<()> {
        info!("IPC server listening on {}", endpoint.describe());

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("IPC server stopping");
                    break;
                }
                accepted = endpoint.accept() => match accepted {
                    Ok(stream) => self.admit(stream),
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }

        Ok(())
    }

    /// Start a connection task, or refuse the client when at capacity
    pub fn admit<S>(self: &Arc<Self>, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let permit = match Arc::clone(&self.limiter).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Connection limit reached, refusing client");
                drop(stream);
                return;
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let server = Arc::clone(self);
        let span = info_span!("connection", id);

        tokio::spawn(
            async move {
                let _permit = permit;
                tokio::select! {
                    _ = server.shutdown.cancelled() => debug!("Connection closed by shutdown"),
                    result = server.serve_connection(stream) => {
                        if let Err(e) = result {
                            warn!("Connection ended with error: {}", e);
                        }
                    }
                }
            }
            .instrument(span),
        );
    }

    /// Request/response loop for one client
    ///
    /// Ends on the terminal ack, on a message that cannot be dispatched, or
    /// when the client goes away.
    pub async fn serve_connection<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(self.max_message_bytes));
        debug!("Client connected");

        while let Some(line) = framed.next().await {
            let line = line?;
            let Some(request) = self.dispatcher.decode(&line) else {
                break;
            };

            let kind = request.message_type();
            let dispatcher = Arc::clone(&self.dispatcher);
            let response = match tokio::task::spawn_blocking(move || dispatcher.handle(request)).await
            {
                Ok(response) => response,
                Err(e) => {
                    error!("Handler for {} failed: {}", kind, e);
                    Response::internal_error(kind)
                }
            };

            let Some(response) = response else {
                break;
            };
            let last = response.is_last();
            framed.send(response.encode()?).await?;
            if last {
                break;
            }
        }

        debug!("Client disconnected");
        Ok(())
    }
}
