//! Session property cache
//!
//! Maps each tracked session to its ordered identity list. One mutex
//! guards the whole map; callers that read, modify and write back take
//! [`SessionPropertyCache::lock`] and keep the guard for the whole sequence.

use crate::types::{IdentityRecord, SessionId, UserInformation};
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;

/// Ordered identity list for one session
pub type SessionEntryList = Vec<IdentityRecord>;

/// Concurrent store of session entry lists
#[derive(Debug, Default)]
pub struct SessionPropertyCache {
    sessions: Mutex<BTreeMap<SessionId, SessionEntryList>>,
}

impl SessionPropertyCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the cache lock for a multi-step sequence
    pub fn lock(&self) -> CacheGuard<'_> {
        CacheGuard {
            sessions: self.sessions.lock(),
        }
    }

    pub fn exists(&self, session: SessionId) -> bool {
        self.lock().exists(session)
    }

    pub fn get(&self, session: SessionId) -> Option<SessionEntryList> {
        self.lock().get(session)
    }

    pub fn put(&self, session: SessionId, entries: SessionEntryList) {
        self.lock().put(session, entries)
    }

    pub fn remove(&self, session: SessionId) -> Option<SessionEntryList> {
        self.lock().remove(session)
    }

    pub fn keys(&self) -> Vec<SessionId> {
        self.lock().keys()
    }
}

/// Exclusive view of the cache, held for the lifetime of the guard
pub struct CacheGuard<'a> {
    sessions: MutexGuard<'a, BTreeMap<SessionId, SessionEntryList>>,
}

impl CacheGuard<'_> {
    /// Whether the session is tracked
    pub fn exists(&self, session: SessionId) -> bool {
        self.sessions.contains_key(&session)
    }

    /// Copy of the session's entry list
    pub fn get(&self, session: SessionId) -> Option<SessionEntryList> {
        self.sessions.get(&session).cloned()
    }

    /// Borrow the session's entry list without copying it
    pub fn peek(&self, session: SessionId) -> Option<&[IdentityRecord]> {
        self.sessions.get(&session).map(Vec::as_slice)
    }

    /// Mutable access to a tracked session's entry list
    pub fn get_mut(&mut self, session: SessionId) -> Option<&mut SessionEntryList> {
        self.sessions.get_mut(&session)
    }

    /// Store or replace the session's entry list
    pub fn put(&mut self, session: SessionId, entries: SessionEntryList) {
        self.sessions.insert(session, entries);
    }

    pub fn remove(&mut self, session: SessionId) -> Option<SessionEntryList> {
        self.sessions.remove(&session)
    }

    /// Tracked sessions in ascending id order
    pub fn keys(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }

    /// Every (session, index) holding a record for `username`, in scan order
    pub fn find_user(&self, username: &str) -> Vec<(SessionId, usize)> {
        self.sessions
            .iter()
            .flat_map(|(session, entries)| {
                entries
                    .iter()
                    .enumerate()
                    .filter(|(_, record)| record.is_user(username))
                    .map(move |(index, _)| (*session, index))
            })
            .collect()
    }

    /// Attributes of a cached record for `username`
    ///
    /// A record at index 0 of any session wins; otherwise the last match.
    pub fn find_user_information(&self, username: &str) -> Option<UserInformation> {
        let mut found = None;
        for (session, index) in self.find_user(username) {
            let record = &self.sessions[&session][index];
            if index == 0 {
                return Some(record.user.clone());
            }
            found = Some(record.user.clone());
        }
        found
    }
}
