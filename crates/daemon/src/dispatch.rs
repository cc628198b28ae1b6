//! Request dispatch
//!
//! Maps each decoded request to its handler and each handler fault to the
//! failure shape the client expects for that request type.

use crate::motd::format_motd;
use crate::pipeline::Pipeline;
use crate::state::BrokerState;
use logonbroker_common::protocol::{
    DynLabelRequest, DynLabelResponse, LogMessage, LoginInfoChange, UserInfoRequest,
    UserInfoResponse,
};
use logonbroker_common::{Request, Response, Result};
use tracing::{debug, error, info, warn};

/// Label name answered with the message of the day
pub const MOTD_LABEL: &str = "MOTD";

/// Stateless front of the broker; one shared instance serves every connection
pub struct Dispatcher {
    state: BrokerState,
    pipeline: Pipeline,
}

impl Dispatcher {
    pub fn new(state: BrokerState) -> Self {
        Self {
            pipeline: Pipeline::new(state.clone()),
            state,
        }
    }

    pub fn state(&self) -> &BrokerState {
        &self.state
    }

    /// Decode one line, `None` when the connection should be closed
    pub fn decode(&self, line: &str) -> Option<Request> {
        match Request::decode(line) {
            Ok(Some(request)) => Some(request),
            Ok(None) => {
                error!("Invalid message type received, closing connection");
                None
            }
            Err(e) => {
                error!("Undecodable message received: {}", e);
                None
            }
        }
    }

    /// Build the reply for `request`
    ///
    /// A handler error becomes the failure shape of the request type.
    pub fn handle(&self, request: Request) -> Option<Response> {
        let kind = request.message_type();
        if self.state.config().trace_message_traffic {
            debug!("Received message of type {}", kind);
        }

        match self.respond(request) {
            Ok(response) => Some(response),
            Err(e) => {
                error!("Error handling {}: {}", kind, e);
                Response::internal_error(kind)
            }
        }
    }

    fn respond(&self, request: Request) -> Result<Response> {
        Ok(match request {
            Request::Disconnect => Response::Ack { last: true },
            Request::Hello => Response::Hello,
            Request::Log(message) => {
                remote_log(&message);
                Response::ack()
            }
            Request::Login(login) => Response::Login(self.pipeline.login(&login)?),
            Request::DynLabel(label) => Response::DynLabel(self.dynamic_label(&label)),
            Request::LoginInfoChange(change) => {
                self.login_info_change(&change);
                Response::ack()
            }
            Request::UserInfo(query) => Response::UserInfo(self.user_info(&query)),
            Request::ChangePassword(change) => {
                Response::ChangePassword(self.pipeline.change_password(&change)?)
            }
        })
    }

    fn dynamic_label(&self, request: &DynLabelRequest) -> DynLabelResponse {
        if request.name != MOTD_LABEL {
            return DynLabelResponse::default();
        }
        DynLabelResponse {
            name: request.name.clone(),
            text: format_motd(&self.state.config().motd, self.state.host()),
        }
    }

    fn login_info_change(&self, change: &LoginInfoChange) {
        debug!(
            "Moving {} from session {} to session {}",
            change.username, change.from_session, change.to_session
        );
        let mut cache = self.state.cache().lock();
        if let Some(entries) = cache.remove(change.from_session) {
            cache.put(change.to_session, entries);
        }
    }

    fn user_info(&self, request: &UserInfoRequest) -> UserInfoResponse {
        let cache = self.state.cache().lock();
        match cache.peek(request.session_id).and_then(|entries| entries.first()) {
            Some(record) => UserInfoResponse {
                original_username: record.user.original_username.clone(),
                username: record.user.username.clone(),
                domain: record.user.domain.clone(),
            },
            None => UserInfoResponse::default(),
        }
    }
}

/// Re-emit a client log line through the broker's own subscriber
fn remote_log(message: &LogMessage) {
    let logger = message.logger_name.as_str();
    let text = message.logged_message.as_str();
    match message.level.to_lowercase().as_str() {
        "info" => info!(target: "remote", logger = %logger, "{}", text),
        "error" => error!(target: "remote", logger = %logger, "{}", text),
        "warn" => warn!(target: "remote", logger = %logger, "{}", text),
        _ => debug!(target: "remote", logger = %logger, "{}", text),
    }
}
