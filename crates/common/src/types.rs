//! Core types for the logon broker

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier the OS assigns to a logon session
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SessionId(pub u32);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SessionId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Case-insensitive username comparison used throughout the broker
pub fn same_user(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Account attributes tracked for one identity
#[derive(Clone, Default, PartialEq, Eq)]
pub struct UserInformation {
    pub username: String,
    pub domain: String,
    /// Username as typed, before any plugin resolved it
    pub original_username: String,
    pub description: String,
    pub password: String,
    pub old_password: String,
}

impl UserInformation {
    /// Start a record for a freshly submitted credential
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            original_username: username.clone(),
            username,
            password: password.into(),
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for UserInformation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserInformation")
            .field("username", &self.username)
            .field("domain", &self.domain)
            .field("original_username", &self.original_username)
            .field("description", &self.description)
            .field("password", &"<redacted>")
            .field("old_password", &"<redacted>")
            .finish()
    }
}

/// One identity tracked for a session
///
/// Index 0 of a session's entry list is the interactive identity of that
/// session. Later entries were introduced by secondary credentials or
/// observed running in the session on behalf of another session's user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    pub id: Uuid,
    pub secondary_credential: bool,
    pub user: UserInformation,
}

impl IdentityRecord {
    pub fn new(user: UserInformation, secondary_credential: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            secondary_credential,
            user,
        }
    }

    pub fn username(&self) -> &str {
        &self.user.username
    }

    pub fn is_user(&self, username: &str) -> bool {
        same_user(&self.user.username, username)
    }
}

/// Success flag plus a human-readable message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BooleanResult {
    pub success: bool,
    pub message: String,
}

impl BooleanResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Why the credential-entry component submitted a login
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoginReason {
    /// Interactive logon
    Login,
    /// Credential prompt for a secondary identity
    CredUI,
    /// Validate and normalise only
    Parse,
}

impl Default for LoginReason {
    fn default() -> Self {
        Self::Login
    }
}

impl std::fmt::Display for LoginReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoginReason::Login => write!(f, "login"),
            LoginReason::CredUI => write!(f, "credui"),
            LoginReason::Parse => write!(f, "parse"),
        }
    }
}

/// Session lifecycle notification kinds, numbered as Windows numbers them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionChangeReason {
    ConsoleConnect = 1,
    ConsoleDisconnect = 2,
    RemoteConnect = 3,
    RemoteDisconnect = 4,
    SessionLogon = 5,
    SessionLogoff = 6,
    SessionLock = 7,
    SessionUnlock = 8,
    SessionRemoteControl = 9,
}

impl TryFrom<u32> for SessionChangeReason {
    type Error = crate::Error;

    fn try_from(value: u32) -> crate::Result<Self> {
        Ok(match value {
            1 => Self::ConsoleConnect,
            2 => Self::ConsoleDisconnect,
            3 => Self::RemoteConnect,
            4 => Self::RemoteDisconnect,
            5 => Self::SessionLogon,
            6 => Self::SessionLogoff,
            7 => Self::SessionLock,
            8 => Self::SessionUnlock,
            9 => Self::SessionRemoteControl,
            other => {
                return Err(crate::Error::Protocol(format!(
                    "unknown session change reason {}",
                    other
                )))
            }
        })
    }
}

impl std::fmt::Display for SessionChangeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionChangeReason::ConsoleConnect => "console_connect",
            SessionChangeReason::ConsoleDisconnect => "console_disconnect",
            SessionChangeReason::RemoteConnect => "remote_connect",
            SessionChangeReason::RemoteDisconnect => "remote_disconnect",
            SessionChangeReason::SessionLogon => "session_logon",
            SessionChangeReason::SessionLogoff => "session_logoff",
            SessionChangeReason::SessionLock => "session_lock",
            SessionChangeReason::SessionUnlock => "session_unlock",
            SessionChangeReason::SessionRemoteControl => "session_remote_control",
        };
        write!(f, "{}", name)
    }
}

/// A user with an interactive desktop in a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractiveUser {
    pub session: SessionId,
    pub username: String,
}

impl InteractiveUser {
    pub fn new(session: impl Into<SessionId>, username: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            username: username.into(),
        }
    }
}
