//! Broker client
//!
//! Speaks the line protocol from the client side. Used by the diagnostic
//! CLI and the integration tests.

use crate::protocol::{
    ChangePasswordRequest, ChangePasswordResponse, DynLabelRequest, DynLabelResponse, LogMessage,
    LoginInfoChange, LoginRequest, LoginResponse, Request, Response, UserInfoRequest,
    UserInfoResponse, DEFAULT_MAX_MESSAGE_BYTES,
};
use crate::types::SessionId;
use crate::{Error, Result};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LinesCodec};
use tracing::trace;

/// Client side of one broker connection
pub struct PipeClient<S> {
    framed: Framed<S, LinesCodec>,
}

impl<S> PipeClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already connected stream
    pub fn new(stream: S) -> Self {
        Self {
            framed: Framed::new(stream, LinesCodec::new_with_max_length(DEFAULT_MAX_MESSAGE_BYTES)),
        }
    }

    /// Send one request and wait for its reply
    pub async fn request(&mut self, request: &Request) -> Result<Response> {
        let line = request.encode()?;
        trace!("-> {}", line);
        self.framed.send(line).await?;

        match self.framed.next().await {
            Some(line) => {
                let line = line?;
                trace!("<- {}", line);
                Response::decode(&line)
            }
            None => Err(Error::Protocol("connection closed by broker".to_string())),
        }
    }

    pub async fn hello(&mut self) -> Result<()> {
        match self.request(&Request::Hello).await? {
            Response::Hello => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// End the conversation; the broker closes after its terminal ack
    pub async fn disconnect(&mut self) -> Result<()> {
        match self.request(&Request::Disconnect).await? {
            Response::Ack { last: true } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn log(&mut self, message: LogMessage) -> Result<()> {
        match self.request(&Request::Log(message)).await? {
            Response::Ack { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn login(&mut self, request: LoginRequest) -> Result<LoginResponse> {
        match self.request(&Request::Login(request)).await? {
            Response::Login(response) => Ok(response),
            other => Err(unexpected(other)),
        }
    }

    pub async fn dyn_label(&mut self, name: impl Into<String>) -> Result<DynLabelResponse> {
        let request = Request::DynLabel(DynLabelRequest { name: name.into() });
        match self.request(&request).await? {
            Response::DynLabel(response) => Ok(response),
            other => Err(unexpected(other)),
        }
    }

    pub async fn login_info_change(&mut self, change: LoginInfoChange) -> Result<()> {
        match self.request(&Request::LoginInfoChange(change)).await? {
            Response::Ack { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn user_info(&mut self, session: SessionId) -> Result<UserInfoResponse> {
        let request = Request::UserInfo(UserInfoRequest { session_id: session });
        match self.request(&request).await? {
            Response::UserInfo(response) => Ok(response),
            other => Err(unexpected(other)),
        }
    }

    pub async fn change_password(
        &mut self,
        request: ChangePasswordRequest,
    ) -> Result<ChangePasswordResponse> {
        match self.request(&Request::ChangePassword(request)).await? {
            Response::ChangePassword(response) => Ok(response),
            other => Err(unexpected(other)),
        }
    }
}

#[cfg(unix)]
impl PipeClient<tokio::net::UnixStream> {
    /// Connect to the broker's Unix socket
    pub async fn connect(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = tokio::net::UnixStream::connect(path).await.map_err(|e| {
            Error::Protocol(format!("Failed to connect to {}: {}", path.display(), e))
        })?;
        Ok(Self::new(stream))
    }
}

#[cfg(windows)]
impl PipeClient<tokio::net::windows::named_pipe::NamedPipeClient> {
    /// Connect to the broker's named pipe
    pub async fn connect(pipe_name: &str) -> Result<Self> {
        let path = crate::named_pipe_path(pipe_name);
        let client = tokio::net::windows::named_pipe::ClientOptions::new()
            .open(&path)
            .map_err(|e| Error::Protocol(format!("Failed to connect to {}: {}", path, e)))?;
        Ok(Self::new(client))
    }
}

fn unexpected(response: Response) -> Error {
    Error::Protocol(format!("unexpected {} reply", response.message_type()))
}
