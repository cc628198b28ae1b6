//! Test doubles for plugins, the session environment and host facts

use crate::config::DaemonConfig;
use crate::environment::SessionEnvironment;
use crate::motd::HostInfo;
use crate::plugins::{
    Authenticate, ChangePassword, ChangePasswordActivity, DeferLogoff, Notify, Plugin,
    PluginRegistry,
};
use crate::state::BrokerState;
use chrono::NaiveDate;
use logonbroker_common::{
    same_user, BooleanResult, Error, IdentityRecord, InteractiveUser, Result,
    SessionChangeReason, SessionId, UserInformation,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Cache record for `username` with password "pw"
pub fn record(username: &str, secondary_credential: bool) -> IdentityRecord {
    IdentityRecord::new(UserInformation::new(username, "pw"), secondary_credential)
}

/// Broker state with default config and fixed host facts
pub fn broker_state(registry: PluginRegistry, env: Arc<FakeEnvironment>) -> BrokerState {
    BrokerState::new(DaemonConfig::default(), registry, env).with_host_info(Arc::new(FixedHost))
}

#[derive(Debug, Clone)]
pub struct NotifyCall {
    pub session: SessionId,
    pub reason: SessionChangeReason,
    pub entries: Option<Vec<IdentityRecord>>,
}

#[derive(Debug, Clone, Copy)]
enum Behaviour {
    Succeed,
    Fail,
    Panic,
}

/// Notify plugin that remembers every call
pub struct RecordingNotify {
    name: String,
    uuid: Uuid,
    behaviour: Behaviour,
    calls: Mutex<Vec<NotifyCall>>,
}

impl RecordingNotify {
    pub fn new(name: &str) -> Self {
        Self::with_behaviour(name, Behaviour::Succeed)
    }

    pub fn failing(name: &str) -> Self {
        Self::with_behaviour(name, Behaviour::Fail)
    }

    pub fn panicking(name: &str) -> Self {
        Self::with_behaviour(name, Behaviour::Panic)
    }

    fn with_behaviour(name: &str, behaviour: Behaviour) -> Self {
        Self {
            name: name.to_string(),
            uuid: Uuid::new_v4(),
            behaviour,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<NotifyCall> {
        self.calls.lock().clone()
    }
}

impl Plugin for RecordingNotify {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Notify for RecordingNotify {
    fn session_change(
        &self,
        session: SessionId,
        reason: SessionChangeReason,
        entries: Option<&[IdentityRecord]>,
    ) -> Result<()> {
        self.calls.lock().push(NotifyCall {
            session,
            reason,
            entries: entries.map(<[IdentityRecord]>::to_vec),
        });
        match self.behaviour {
            Behaviour::Succeed => Ok(()),
            Behaviour::Fail => Err(Error::plugin(&self.name, "notification rejected")),
            Behaviour::Panic => panic!("{} exploded", self.name),
        }
    }
}

/// Authenticate plugin with a fixed verdict
pub struct StaticAuthenticator {
    name: String,
    uuid: Uuid,
    verdict: Option<BooleanResult>,
    domain: Option<String>,
    panics: bool,
    calls: AtomicUsize,
}

impl StaticAuthenticator {
    pub fn accepting(name: &str) -> Self {
        Self::with_verdict(name, Some(BooleanResult::success("")))
    }

    pub fn rejecting(name: &str, message: &str) -> Self {
        Self::with_verdict(name, Some(BooleanResult::failure(message)))
    }

    /// Fails with an error instead of a verdict
    pub fn erroring(name: &str) -> Self {
        Self::with_verdict(name, None)
    }

    /// Panics instead of returning a verdict
    pub fn panicking(name: &str) -> Self {
        Self {
            panics: true,
            ..Self::with_verdict(name, None)
        }
    }

    fn with_verdict(name: &str, verdict: Option<BooleanResult>) -> Self {
        Self {
            name: name.to_string(),
            uuid: Uuid::new_v4(),
            verdict,
            domain: None,
            panics: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Resolve the domain on success
    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Plugin for StaticAuthenticator {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Authenticate for StaticAuthenticator {
    fn authenticate(&self, user: &mut UserInformation) -> Result<BooleanResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panics {
            panic!("{} exploded", self.name);
        }
        let verdict = self
            .verdict
            .clone()
            .ok_or_else(|| Error::plugin(&self.name, "directory unreachable"))?;
        if verdict.success {
            if let Some(domain) = &self.domain {
                user.domain = domain.clone();
            }
        }
        Ok(verdict)
    }
}

/// Password-change plugin with a fixed verdict
pub struct ScriptedPasswordChanger {
    name: String,
    uuid: Uuid,
    verdict: BooleanResult,
    panics: bool,
    seen_passwords: Mutex<Vec<String>>,
    prior_results: Mutex<Vec<usize>>,
}

impl ScriptedPasswordChanger {
    pub fn succeeding(name: &str, message: &str) -> Self {
        Self::with_verdict(name, BooleanResult::success(message))
    }

    pub fn failing(name: &str, message: &str) -> Self {
        Self::with_verdict(name, BooleanResult::failure(message))
    }

    /// Panics instead of returning a verdict
    pub fn panicking(name: &str) -> Self {
        Self {
            panics: true,
            ..Self::with_verdict(name, BooleanResult::default())
        }
    }

    fn with_verdict(name: &str, verdict: BooleanResult) -> Self {
        Self {
            name: name.to_string(),
            uuid: Uuid::new_v4(),
            verdict,
            panics: false,
            seen_passwords: Mutex::new(Vec::new()),
            prior_results: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen_passwords.lock().len()
    }

    /// Password of the record at each call
    pub fn seen_passwords(&self) -> Vec<String> {
        self.seen_passwords.lock().clone()
    }

    /// Number of earlier results visible at each call
    pub fn prior_results(&self) -> Vec<usize> {
        self.prior_results.lock().clone()
    }
}

impl Plugin for ScriptedPasswordChanger {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl ChangePassword for ScriptedPasswordChanger {
    fn change_password(
        &self,
        record: &IdentityRecord,
        activity: &ChangePasswordActivity,
    ) -> Result<BooleanResult> {
        self.seen_passwords.lock().push(record.user.password.clone());
        self.prior_results.lock().push(activity.results.len());
        if self.panics {
            panic!("{} exploded", self.name);
        }
        Ok(self.verdict.clone())
    }
}

/// Defer-logoff plugin with pending work for a fixed set of users
pub struct PendingLogoff {
    uuid: Uuid,
    pending_for: Vec<String>,
    add_time: bool,
}

impl PendingLogoff {
    pub fn for_users(users: &[&str]) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            pending_for: users.iter().map(|u| u.to_string()).collect(),
            add_time: false,
        }
    }

    pub fn wanting_time(mut self) -> Self {
        self.add_time = true;
        self
    }
}

impl Plugin for PendingLogoff {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn name(&self) -> &str {
        "pending-logoff"
    }
}

impl DeferLogoff for PendingLogoff {
    fn login_user_request(&self, username: &str) -> Result<bool> {
        Ok(self.pending_for.iter().any(|u| same_user(u, username)))
    }

    fn logoff_request_add_time(&self) -> Result<bool> {
        Ok(self.add_time)
    }
}

/// Scriptable session environment
#[derive(Default)]
pub struct FakeEnvironment {
    interactive: Mutex<Vec<InteractiveUser>>,
    processes: Mutex<HashMap<SessionId, Vec<String>>>,
    failing: AtomicBool,
}

impl FakeEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_interactive(&self, session: u32, username: &str) {
        self.interactive
            .lock()
            .push(InteractiveUser::new(session, username));
    }

    pub fn set_interactive(&self, users: Vec<InteractiveUser>) {
        *self.interactive.lock() = users;
    }

    /// Report a process of `username` running in `session`
    pub fn add_process(&self, session: u32, username: &str) {
        self.processes
            .lock()
            .entry(SessionId(session))
            .or_default()
            .push(username.to_string());
    }

    /// Make every query fail from now on
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Environment("session enumeration failed".to_string()));
        }
        Ok(())
    }
}

impl SessionEnvironment for FakeEnvironment {
    fn interactive_users(&self) -> Result<Vec<InteractiveUser>> {
        self.check()?;
        Ok(self.interactive.lock().clone())
    }

    fn session_process_users(&self, session: SessionId) -> Result<Vec<String>> {
        self.check()?;
        Ok(self
            .processes
            .lock()
            .get(&session)
            .cloned()
            .unwrap_or_default())
    }
}

pub struct FixedHost;

impl HostInfo for FixedHost {
    fn version(&self) -> String {
        "9.9.9".to_string()
    }

    fn first_ipv4(&self) -> Option<Ipv4Addr> {
        Some(Ipv4Addr::new(192, 168, 1, 20))
    }

    fn machine_name(&self) -> String {
        "KIOSK".to_string()
    }

    fn today(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap_or_default()
    }

    fn dns_hostname(&self) -> String {
        "kiosk.example".to_string()
    }
}
