//! Plugin capability contracts and the ordered registry
//!
//! A plugin is any `Send + Sync` type with a stable UUID. It takes part in
//! a pipeline stage by implementing that stage's capability trait and being
//! registered for it. Stage order comes from configuration.

use crate::config::PluginOrder;
use logonbroker_common::{
    BooleanResult, IdentityRecord, Result, SessionChangeReason, SessionId, UserInformation,
};
use std::sync::Arc;
use uuid::Uuid;

/// Identity shared by every plugin
pub trait Plugin: Send + Sync {
    fn uuid(&self) -> Uuid;
    fn name(&self) -> &str;
}

/// Verifies credentials, possibly resolving username and domain in place
pub trait Authenticate: Plugin {
    fn authenticate(&self, user: &mut UserInformation) -> Result<BooleanResult>;
}

/// Changes the password of a tracked identity
pub trait ChangePassword: Plugin {
    fn change_password(
        &self,
        record: &IdentityRecord,
        activity: &ChangePasswordActivity,
    ) -> Result<BooleanResult>;
}

/// Observes session lifecycle events
pub trait Notify: Plugin {
    /// `entries` is `None` when the session was never tracked
    fn session_change(
        &self,
        session: SessionId,
        reason: SessionChangeReason,
        entries: Option<&[IdentityRecord]>,
    ) -> Result<()>;
}

/// Holds logins back while asynchronous logoff cleanup is pending
pub trait DeferLogoff: Plugin {
    /// True while cleanup for `username` is still running
    fn login_user_request(&self, username: &str) -> Result<bool>;

    /// True to ask the OS for more time before completing a logoff
    fn logoff_request_add_time(&self) -> Result<bool>;
}

/// Told when the service starts and stops
pub trait Lifecycle: Plugin {
    fn starting(&self);
    fn stopping(&self);
}

/// What a password-change plugin can see about the running stage
#[derive(Debug, Clone, Default)]
pub struct ChangePasswordActivity {
    /// Every plugin of the stage, in execution order
    pub loaded_plugins: Vec<Uuid>,
    /// Outcomes of the plugins that already ran
    pub results: Vec<(Uuid, BooleanResult)>,
}

impl ChangePasswordActivity {
    pub fn record(&mut self, plugin: Uuid, result: BooleanResult) {
        self.results.push((plugin, result));
    }
}

/// Ordered plugin sets, one per capability
#[derive(Clone, Default)]
pub struct PluginRegistry {
    authenticate: Vec<Arc<dyn Authenticate>>,
    change_password: Vec<Arc<dyn ChangePassword>>,
    notify: Vec<Arc<dyn Notify>>,
    defer_logoff: Vec<Arc<dyn DeferLogoff>>,
    lifecycle: Vec<Arc<dyn Lifecycle>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_authenticate(&mut self, plugin: Arc<dyn Authenticate>) -> &mut Self {
        self.authenticate.push(plugin);
        self
    }

    pub fn register_change_password(&mut self, plugin: Arc<dyn ChangePassword>) -> &mut Self {
        self.change_password.push(plugin);
        self
    }

    pub fn register_notify(&mut self, plugin: Arc<dyn Notify>) -> &mut Self {
        self.notify.push(plugin);
        self
    }

    pub fn register_defer_logoff(&mut self, plugin: Arc<dyn DeferLogoff>) -> &mut Self {
        self.defer_logoff.push(plugin);
        self
    }

    pub fn register_lifecycle(&mut self, plugin: Arc<dyn Lifecycle>) -> &mut Self {
        self.lifecycle.push(plugin);
        self
    }

    /// Sort every stage by the configured order
    ///
    /// Listed plugins run first, in list order. Unlisted plugins follow in
    /// registration order.
    pub fn apply_order(&mut self, order: &PluginOrder) {
        sort_stage(&mut self.authenticate, &order.authenticate, |p| p.uuid());
        sort_stage(&mut self.change_password, &order.change_password, |p| p.uuid());
        sort_stage(&mut self.notify, &order.notify, |p| p.uuid());
        sort_stage(&mut self.defer_logoff, &order.defer_logoff, |p| p.uuid());
        sort_stage(&mut self.lifecycle, &order.lifecycle, |p| p.uuid());
    }

    pub fn authenticate(&self) -> &[Arc<dyn Authenticate>] {
        &self.authenticate
    }

    pub fn change_password(&self) -> &[Arc<dyn ChangePassword>] {
        &self.change_password
    }

    pub fn notify(&self) -> &[Arc<dyn Notify>] {
        &self.notify
    }

    pub fn defer_logoff(&self) -> &[Arc<dyn DeferLogoff>] {
        &self.defer_logoff
    }

    pub fn lifecycle(&self) -> &[Arc<dyn Lifecycle>] {
        &self.lifecycle
    }
}

fn sort_stage<T: ?Sized>(stage: &mut [Arc<T>], order: &[Uuid], uuid: impl Fn(&T) -> Uuid) {
    // stable sort keeps registration order among unlisted plugins
    stage.sort_by_key(|plugin| {
        let id = uuid(plugin.as_ref());
        order
            .iter()
            .position(|listed| *listed == id)
            .unwrap_or(order.len())
    });
}
