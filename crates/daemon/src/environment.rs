//! OS session queries
//!
//! The reconciler and the login pipeline only see the machine through
//! [`SessionEnvironment`]. Platform integrations implement it; the daemon
//! falls back to [`DetachedEnvironment`] when none is linked in.

use logonbroker_common::{same_user, InteractiveUser, Result, SessionId};
use tracing::debug;

/// Queries about logon sessions and the processes inside them
pub trait SessionEnvironment: Send + Sync {
    /// Users with an interactive desktop, with the session holding it
    fn interactive_users(&self) -> Result<Vec<InteractiveUser>>;

    /// Usernames whose processes run inside `session`
    fn session_process_users(&self, session: SessionId) -> Result<Vec<String>>;
}

/// Environment for hosts without session integration: nobody is interactive
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedEnvironment;

impl SessionEnvironment for DetachedEnvironment {
    fn interactive_users(&self) -> Result<Vec<InteractiveUser>> {
        debug!("No session integration; reporting no interactive users");
        Ok(Vec::new())
    }

    fn session_process_users(&self, _session: SessionId) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Whether `username` is interactive in any session
pub fn interactive_anywhere(users: &[InteractiveUser], username: &str) -> bool {
    users.iter().any(|u| same_user(&u.username, username))
}

/// Whether `username` is the interactive user of `session`
pub fn interactive_in(users: &[InteractiveUser], session: SessionId, username: &str) -> bool {
    users
        .iter()
        .any(|u| u.session == session && same_user(&u.username, username))
}
