//! Broker wire protocol
//!
//! One JSON object per line. Every object carries an integer
//! `MessageType` tag; the remaining keys are the PascalCase fields of
//! that message type.
//!
//! `Reason` in a login request is the only enum sent by name rather than
//! by number: one of `"Login"`, `"CredUI"` or `"Parse"`.

use crate::types::{LoginReason, SessionId};
use crate::{Error, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// Key carrying the message discriminant
pub const MESSAGE_TYPE_KEY: &str = "MessageType";

/// Key set on the acknowledgement that ends a conversation
pub const LAST_MESSAGE_KEY: &str = "LastMessage";

/// Default upper bound on a single encoded message
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024;

/// Message reply to an internal fault
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal error";

/// Wire discriminant of every message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Unknown = 0,
    Hello = 1,
    Disconnect = 2,
    Ack = 3,
    Log = 4,
    LoginRequest = 5,
    LoginResponse = 6,
    DynLabelRequest = 7,
    DynLabelResponse = 8,
    LoginInfoChange = 9,
    UserInfoRequest = 10,
    UserInfoResponse = 11,
    ChangePasswordRequest = 12,
    ChangePasswordResponse = 13,
}

impl MessageType {
    /// Map a wire value, `None` for values this broker does not know
    pub fn from_wire(value: u64) -> Option<Self> {
        Some(match value {
            0 => Self::Unknown,
            1 => Self::Hello,
            2 => Self::Disconnect,
            3 => Self::Ack,
            4 => Self::Log,
            5 => Self::LoginRequest,
            6 => Self::LoginResponse,
            7 => Self::DynLabelRequest,
            8 => Self::DynLabelResponse,
            9 => Self::LoginInfoChange,
            10 => Self::UserInfoRequest,
            11 => Self::UserInfoResponse,
            12 => Self::ChangePasswordRequest,
            13 => Self::ChangePasswordResponse,
            _ => return None,
        })
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LogMessage {
    pub logger_name: String,
    pub level: String,
    pub logged_message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub session: SessionId,
    pub reason: LoginReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LoginResponse {
    pub result: bool,
    pub message: String,
    pub username: String,
    pub domain: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DynLabelRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DynLabelResponse {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LoginInfoChange {
    pub username: String,
    pub from_session: SessionId,
    pub to_session: SessionId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserInfoRequest {
    #[serde(rename = "SessionID")]
    pub session_id: SessionId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UserInfoResponse {
    pub original_username: String,
    pub username: String,
    pub domain: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ChangePasswordRequest {
    pub username: String,
    pub domain: String,
    pub old_password: String,
    pub new_password: String,
    pub session: SessionId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ChangePasswordResponse {
    pub result: bool,
    pub message: String,
    pub username: String,
    pub domain: String,
}

/// Messages a client may send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Disconnect,
    Hello,
    Log(LogMessage),
    Login(LoginRequest),
    DynLabel(DynLabelRequest),
    LoginInfoChange(LoginInfoChange),
    UserInfo(UserInfoRequest),
    ChangePassword(ChangePasswordRequest),
}

impl Request {
    pub fn message_type(&self) -> MessageType {
        match self {
            Request::Disconnect => MessageType::Disconnect,
            Request::Hello => MessageType::Hello,
            Request::Log(_) => MessageType::Log,
            Request::Login(_) => MessageType::LoginRequest,
            Request::DynLabel(_) => MessageType::DynLabelRequest,
            Request::LoginInfoChange(_) => MessageType::LoginInfoChange,
            Request::UserInfo(_) => MessageType::UserInfoRequest,
            Request::ChangePassword(_) => MessageType::ChangePasswordRequest,
        }
    }

    /// Parse one line; `Ok(None)` when the type is not a request this broker serves
    pub fn decode(line: &str) -> Result<Option<Self>> {
        let (kind, value) = split_tagged(line)?;
        let request = match kind {
            Some(MessageType::Disconnect) => Request::Disconnect,
            Some(MessageType::Hello) => Request::Hello,
            Some(MessageType::Log) => Request::Log(body(value)?),
            Some(MessageType::LoginRequest) => Request::Login(body(value)?),
            Some(MessageType::DynLabelRequest) => Request::DynLabel(body(value)?),
            Some(MessageType::LoginInfoChange) => Request::LoginInfoChange(body(value)?),
            Some(MessageType::UserInfoRequest) => Request::UserInfo(body(value)?),
            Some(MessageType::ChangePasswordRequest) => Request::ChangePassword(body(value)?),
            _ => return Ok(None),
        };
        Ok(Some(request))
    }

    pub fn encode(&self) -> Result<String> {
        let kind = self.message_type();
        match self {
            Request::Disconnect | Request::Hello => encode_tagged(kind, &empty_body()),
            Request::Log(m) => encode_tagged(kind, m),
            Request::Login(m) => encode_tagged(kind, m),
            Request::DynLabel(m) => encode_tagged(kind, m),
            Request::LoginInfoChange(m) => encode_tagged(kind, m),
            Request::UserInfo(m) => encode_tagged(kind, m),
            Request::ChangePassword(m) => encode_tagged(kind, m),
        }
    }
}

/// Messages the broker sends back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Plain acknowledgement; `last` ends the conversation
    Ack { last: bool },
    Hello,
    Login(LoginResponse),
    DynLabel(DynLabelResponse),
    UserInfo(UserInfoResponse),
    ChangePassword(ChangePasswordResponse),
}

impl Response {
    pub fn ack() -> Self {
        Response::Ack { last: false }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Response::Ack { .. } => MessageType::Ack,
            Response::Hello => MessageType::Hello,
            Response::Login(_) => MessageType::LoginResponse,
            Response::DynLabel(_) => MessageType::DynLabelResponse,
            Response::UserInfo(_) => MessageType::UserInfoResponse,
            Response::ChangePassword(_) => MessageType::ChangePasswordResponse,
        }
    }

    /// Whether the client expects nothing further on this connection
    pub fn is_last(&self) -> bool {
        matches!(self, Response::Ack { last: true })
    }

    /// Reply for a request whose handler faulted
    pub fn internal_error(request: MessageType) -> Option<Self> {
        Some(match request {
            MessageType::Disconnect => Response::Ack { last: true },
            MessageType::Hello => Response::Hello,
            MessageType::Log | MessageType::LoginInfoChange => Response::ack(),
            MessageType::LoginRequest => Response::Login(LoginResponse {
                result: false,
                message: INTERNAL_ERROR_MESSAGE.to_string(),
                ..Default::default()
            }),
            MessageType::DynLabelRequest => Response::DynLabel(DynLabelResponse::default()),
            MessageType::UserInfoRequest => Response::UserInfo(UserInfoResponse::default()),
            MessageType::ChangePasswordRequest => Response::ChangePassword(ChangePasswordResponse {
                result: false,
                message: INTERNAL_ERROR_MESSAGE.to_string(),
                ..Default::default()
            }),
            _ => return None,
        })
    }

    pub fn decode(line: &str) -> Result<Self> {
        let (kind, value) = split_tagged(line)?;
        Ok(match kind {
            Some(MessageType::Ack) => Response::Ack {
                last: value
                    .get(LAST_MESSAGE_KEY)
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
            Some(MessageType::Hello) => Response::Hello,
            Some(MessageType::LoginResponse) => Response::Login(body(value)?),
            Some(MessageType::DynLabelResponse) => Response::DynLabel(body(value)?),
            Some(MessageType::UserInfoResponse) => Response::UserInfo(body(value)?),
            Some(MessageType::ChangePasswordResponse) => Response::ChangePassword(body(value)?),
            other => {
                return Err(Error::Protocol(format!(
                    "unexpected response type {:?}",
                    other
                )))
            }
        })
    }

    pub fn encode(&self) -> Result<String> {
        let kind = self.message_type();
        match self {
            Response::Ack { last: true } => {
                let mut body = serde_json::Map::new();
                body.insert(LAST_MESSAGE_KEY.to_string(), Value::Bool(true));
                encode_tagged(kind, &body)
            }
            Response::Ack { last: false } | Response::Hello => encode_tagged(kind, &empty_body()),
            Response::Login(m) => encode_tagged(kind, m),
            Response::DynLabel(m) => encode_tagged(kind, m),
            Response::UserInfo(m) => encode_tagged(kind, m),
            Response::ChangePassword(m) => encode_tagged(kind, m),
        }
    }
}

fn empty_body() -> Value {
    Value::Object(serde_json::Map::new())
}

fn encode_tagged<T: Serialize>(kind: MessageType, body: &T) -> Result<String> {
    let mut value = serde_json::to_value(body)?;
    let map = value
        .as_object_mut()
        .ok_or_else(|| Error::Protocol("message body must be an object".to_string()))?;
    map.insert(MESSAGE_TYPE_KEY.to_string(), Value::from(kind as u8));
    Ok(serde_json::to_string(&value)?)
}

fn split_tagged(line: &str) -> Result<(Option<MessageType>, Value)> {
    let value: Value = serde_json::from_str(line)?;
    let tag = value
        .get(MESSAGE_TYPE_KEY)
        .and_then(Value::as_u64)
        .ok_or_else(|| Error::Protocol(format!("missing {}", MESSAGE_TYPE_KEY)))?;
    Ok((MessageType::from_wire(tag), value))
}

fn body<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}
