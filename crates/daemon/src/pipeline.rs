//! Plugin pipeline orchestration
//!
//! Runs login, password change, session notification and deferred-logoff
//! queries through the registered plugins.

use crate::environment::interactive_anywhere;
use crate::plugins::{
    Authenticate, ChangePassword, ChangePasswordActivity, DeferLogoff, Notify, Plugin,
    PluginRegistry,
};
use crate::state::BrokerState;
use logonbroker_common::protocol::{
    ChangePasswordRequest, ChangePasswordResponse, LoginRequest, LoginResponse,
};
use logonbroker_common::{
    BooleanResult, Error, IdentityRecord, LoginReason, Result, SessionChangeReason, SessionId,
    UserInformation,
};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const NO_USERNAME_MESSAGE: &str = "No Username supplied";
pub const NO_AUTHENTICATE_PLUGIN_MESSAGE: &str = "No authentication plugin is configured";
pub const NO_CHANGE_PASSWORD_PLUGIN_MESSAGE: &str = "No password change plugin is configured";

/// Authentication stage of a login
pub trait LoginProcess: Send + Sync {
    /// Verify `user`, resolving its username and domain in place
    fn perform_login(&self, user: &mut UserInformation) -> Result<BooleanResult>;
}

/// Runs Authenticate plugins in order until one succeeds
pub struct OrderedAuthentication {
    plugins: Vec<Arc<dyn Authenticate>>,
}

impl OrderedAuthentication {
    pub fn from_registry(registry: &PluginRegistry) -> Self {
        Self {
            plugins: registry.authenticate().to_vec(),
        }
    }
}

impl LoginProcess for OrderedAuthentication {
    fn perform_login(&self, user: &mut UserInformation) -> Result<BooleanResult> {
        let mut outcome = BooleanResult::failure(NO_AUTHENTICATE_PLUGIN_MESSAGE);

        for plugin in &self.plugins {
            debug!("Authenticate: executing {} ({})", plugin.name(), plugin.uuid());
            outcome = match plugin.authenticate(user) {
                Ok(result) => result,
                Err(e) => {
                    warn!("Authenticate plugin {} failed: {}", plugin.uuid(), e);
                    BooleanResult::failure(e.to_string())
                }
            };
            debug!(
                "Authenticate: result from {} is {} message: {}",
                plugin.uuid(),
                outcome.success,
                outcome.message
            );
            if outcome.success {
                break;
            }
        }

        Ok(outcome)
    }
}

/// Plugin pipeline over the shared broker state
#[derive(Clone)]
pub struct Pipeline {
    state: BrokerState,
}

impl Pipeline {
    pub fn new(state: BrokerState) -> Self {
        Self { state }
    }

    /// Handle a login, tracking the identity in the session cache on success
    pub fn login(&self, request: &LoginRequest) -> Result<LoginResponse> {
        let username = request.username.trim();
        if username.is_empty() {
            return Ok(LoginResponse {
                result: false,
                message: NO_USERNAME_MESSAGE.to_string(),
                ..Default::default()
            });
        }

        let mut user = UserInformation::new(username, request.password.clone());

        if self.logoff_pending(&user.username)? {
            let result = BooleanResult::failure(format!(
                "Still logoff work to do for user {}\nWait a few seconds and retry",
                user.username
            ));
            return Ok(login_response(result, &user));
        }

        let mut result = BooleanResult::success("");

        match request.reason {
            LoginReason::Parse => {
                debug!(
                    "Parse request for: {} in session: {}",
                    user.username, request.session
                );
            }
            LoginReason::Login | LoginReason::CredUI => {
                debug!(
                    "Processing LoginRequest for: {} in session: {} reason: {}",
                    user.username, request.session, request.reason
                );

                let interactive = self.state.environment().interactive_users()?;
                let logged_in = interactive_anywhere(&interactive, &user.username);
                if logged_in {
                    debug!("User {} is already interactive", user.username);
                } else {
                    result = self.state.login_process().perform_login(&mut user)?;
                }

                let credui = request.reason == LoginReason::CredUI;
                if result.success && (!logged_in || credui) {
                    self.track(request.session, &mut user, logged_in, credui);
                }
            }
        }

        Ok(login_response(result, &user))
    }

    /// Append `user` to the session's list unless it is already there
    fn track(&self, session: SessionId, user: &mut UserInformation, logged_in: bool, credui: bool) {
        let mut cache = self.state.cache().lock();
        let mut entries = cache.get(session).unwrap_or_default();

        if let Some(existing) = entries.iter().find(|r| r.is_user(&user.username)) {
            info!(
                "User {} already tracked in session {} ({})",
                user.username, session, existing.id
            );
            return;
        }

        // nothing was authenticated, so reuse what the cache knows
        if logged_in {
            if let Some(cached) = cache.find_user_information(&user.username) {
                *user = cached;
            }
        }

        let record = IdentityRecord::new(user.clone(), credui);
        info!(
            "Tracking user {} in session {} ({}) secondary_credential: {}",
            user.username, session, record.id, credui
        );
        entries.push(record);
        cache.put(session, entries);
    }

    /// Change the password of the session's primary identity
    pub fn change_password(&self, request: &ChangePasswordRequest) -> Result<ChangePasswordResponse> {
        debug!(
            "Processing ChangePasswordRequest for: {} domain: {} session: {}",
            request.username, request.domain, request.session
        );

        let record = {
            let mut cache = self.state.cache().lock();
            let record = cache
                .get_mut(request.session)
                .and_then(|entries| entries.first_mut())
                .ok_or_else(|| Error::NotFound {
                    kind: "session".to_string(),
                    id: request.session.to_string(),
                })?;
            record.user.old_password = request.old_password.clone();
            record.user.password = request.new_password.clone();
            record.clone()
        };

        let plugins = self.state.registry().change_password();
        let mut activity = ChangePasswordActivity {
            loaded_plugins: plugins.iter().map(|p| p.uuid()).collect(),
            results: Vec::new(),
        };
        let mut result = BooleanResult::failure(NO_CHANGE_PASSWORD_PLUGIN_MESSAGE);

        for plugin in plugins {
            debug!("ChangePassword: executing {}", plugin.uuid());
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                plugin.change_password(&record, &activity)
            }));
            result = match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    warn!("ChangePassword plugin {} failed: {}", plugin.uuid(), e);
                    BooleanResult::failure(e.to_string())
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!("ChangePassword plugin {} panicked: {}", plugin.uuid(), message);
                    BooleanResult::failure(message)
                }
            };
            debug!(
                "ChangePassword: result from {} is {} message: {}",
                plugin.uuid(),
                result.success,
                result.message
            );
            activity.record(plugin.uuid(), result.clone());
            if !result.success {
                break;
            }
        }

        if !result.success {
            let mut cache = self.state.cache().lock();
            let stored = cache
                .get_mut(request.session)
                .and_then(|entries| entries.iter_mut().find(|r| r.id == record.id));
            if let Some(stored) = stored {
                stored.user.password = request.old_password.clone();
            }
        }

        Ok(ChangePasswordResponse {
            result: result.success,
            message: result.message,
            username: request.username.clone(),
            domain: request.domain.clone(),
        })
    }

    /// Tell every Notify plugin about a session change
    ///
    /// A failing or panicking plugin is logged and skipped.
    pub fn notify_session_change(
        &self,
        session: SessionId,
        reason: SessionChangeReason,
        entries: Option<&[IdentityRecord]>,
    ) {
        for plugin in self.state.registry().notify() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                plugin.session_change(session, reason, entries)
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Ignoring error from {} ({}): {}", plugin.name(), plugin.uuid(), e)
                }
                Err(_) => error!("Ignoring panic from {} ({})", plugin.name(), plugin.uuid()),
            }
        }
    }

    /// Whether any plugin still has logoff work running for `username`
    pub fn logoff_pending(&self, username: &str) -> Result<bool> {
        let mut pending = false;
        for plugin in self.state.registry().defer_logoff() {
            if plugin.login_user_request(username)? {
                debug!("{} still has logoff work for {}", plugin.uuid(), username);
                pending = true;
            }
        }
        Ok(pending)
    }

    /// Whether any plugin wants more time before a logoff completes
    pub fn logoff_request_add_time(&self) -> bool {
        let mut result = false;
        for plugin in self.state.registry().defer_logoff() {
            match plugin.logoff_request_add_time() {
                Ok(true) => result = true,
                Ok(false) => {}
                Err(e) => {
                    error!("Ignoring error from {}: {}", plugin.uuid(), e);
                    result = false;
                }
            }
        }
        result
    }
}

/// Text of a caught panic payload
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "plugin panicked".to_string()
    }
}

fn login_response(result: BooleanResult, user: &UserInformation) -> LoginResponse {
    LoginResponse {
        result: result.success,
        message: result.message,
        username: user.username.clone(),
        domain: user.domain.clone(),
        password: user.password.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use logonbroker_common::InteractiveUser;

    fn login_request(username: &str, session: u32, reason: LoginReason) -> LoginRequest {
        LoginRequest {
            username: username.to_string(),
            password: "secret".to_string(),
            session: SessionId(session),
            reason,
        }
    }

    fn setup(registry: PluginRegistry) -> (Pipeline, BrokerState, Arc<FakeEnvironment>) {
        let env = Arc::new(FakeEnvironment::new());
        let state = broker_state(registry, env.clone());
        (Pipeline::new(state.clone()), state, env)
    }

    #[test]
    fn test_first_login_tracks_primary_identity() {
        let auth = Arc::new(StaticAuthenticator::accepting("auth"));
        let mut registry = PluginRegistry::new();
        registry.register_authenticate(auth.clone());
        let (pipeline, state, _env) = setup(registry);

        let response = pipeline
            .login(&login_request("alice", 1, LoginReason::Login))
            .unwrap();

        assert!(response.result);
        assert_eq!(response.username, "alice");
        assert_eq!(response.password, "secret");
        assert_eq!(auth.calls(), 1);

        let entries = state.cache().get(SessionId(1)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].username(), "alice");
        assert!(!entries[0].secondary_credential);
    }

    #[test]
    fn test_repeated_login_does_not_duplicate() {
        let mut registry = PluginRegistry::new();
        registry.register_authenticate(Arc::new(StaticAuthenticator::accepting("auth")));
        let (pipeline, state, _env) = setup(registry);

        for _ in 0..3 {
            let response = pipeline
                .login(&login_request("alice", 1, LoginReason::Login))
                .unwrap();
            assert!(response.result);
        }
        pipeline
            .login(&login_request("ALICE", 1, LoginReason::Login))
            .unwrap();

        assert_eq!(state.cache().get(SessionId(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_credui_for_interactive_user_skips_authentication() {
        let auth = Arc::new(StaticAuthenticator::accepting("auth"));
        let mut registry = PluginRegistry::new();
        registry.register_authenticate(auth.clone());
        let (pipeline, state, env) = setup(registry);

        let mut primary = record("alice", false);
        primary.user.domain = "CORP".to_string();
        state.cache().put(SessionId(2), vec![primary]);
        state.cache().put(SessionId(1), vec![record("bob", false)]);
        env.add_interactive(2, "alice");
        env.add_interactive(1, "bob");

        let response = pipeline
            .login(&login_request("alice", 1, LoginReason::CredUI))
            .unwrap();

        assert!(response.result);
        assert_eq!(auth.calls(), 0);
        assert_eq!(response.domain, "CORP");

        let entries = state.cache().get(SessionId(1)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].username(), "alice");
        assert!(entries[1].secondary_credential);
        assert_eq!(entries[1].user.domain, "CORP");
    }

    #[test]
    fn test_login_for_interactive_user_is_not_tracked_again() {
        let auth = Arc::new(StaticAuthenticator::accepting("auth"));
        let mut registry = PluginRegistry::new();
        registry.register_authenticate(auth.clone());
        let (pipeline, state, env) = setup(registry);
        env.add_interactive(2, "alice");

        let response = pipeline
            .login(&login_request("alice", 3, LoginReason::Login))
            .unwrap();

        assert!(response.result);
        assert_eq!(auth.calls(), 0);
        assert!(!state.cache().exists(SessionId(3)));
    }

    #[test]
    fn test_empty_username_is_rejected() {
        let auth = Arc::new(StaticAuthenticator::accepting("auth"));
        let mut registry = PluginRegistry::new();
        registry.register_authenticate(auth.clone());
        let (pipeline, state, _env) = setup(registry);

        let response = pipeline
            .login(&login_request("   ", 1, LoginReason::Login))
            .unwrap();

        assert!(!response.result);
        assert_eq!(response.message, NO_USERNAME_MESSAGE);
        assert_eq!(auth.calls(), 0);
        assert!(state.cache().keys().is_empty());
    }

    #[test]
    fn test_pending_logoff_blocks_login() {
        let auth = Arc::new(StaticAuthenticator::accepting("auth"));
        let mut registry = PluginRegistry::new();
        registry
            .register_authenticate(auth.clone())
            .register_defer_logoff(Arc::new(PendingLogoff::for_users(&["Alice"])));
        let (pipeline, state, _env) = setup(registry);

        let response = pipeline
            .login(&login_request("alice", 1, LoginReason::Login))
            .unwrap();

        assert!(!response.result);
        assert!(response.message.contains("Still logoff work to do for user alice"));
        assert!(response.message.contains("retry"));
        assert_eq!(auth.calls(), 0);
        assert!(!state.cache().exists(SessionId(1)));
    }

    #[test]
    fn test_parse_is_a_dry_run() {
        let auth = Arc::new(StaticAuthenticator::accepting("auth"));
        let mut registry = PluginRegistry::new();
        registry.register_authenticate(auth.clone());
        let (pipeline, state, _env) = setup(registry);

        let response = pipeline
            .login(&login_request("  alice  ", 1, LoginReason::Parse))
            .unwrap();

        assert!(response.result);
        assert_eq!(response.username, "alice");
        assert_eq!(auth.calls(), 0);
        assert!(!state.cache().exists(SessionId(1)));
    }

    #[test]
    fn test_failed_authentication_is_reported_verbatim() {
        let mut registry = PluginRegistry::new();
        registry.register_authenticate(Arc::new(StaticAuthenticator::rejecting(
            "auth",
            "Invalid credentials",
        )));
        let (pipeline, state, _env) = setup(registry);

        let response = pipeline
            .login(&login_request("alice", 1, LoginReason::Login))
            .unwrap();

        assert!(!response.result);
        assert_eq!(response.message, "Invalid credentials");
        assert_eq!(response.username, "alice");
        assert!(!state.cache().exists(SessionId(1)));
    }

    #[test]
    fn test_environment_failure_surfaces_as_error() {
        let (pipeline, _state, env) = setup(PluginRegistry::new());
        env.fail();
        assert!(pipeline
            .login(&login_request("alice", 1, LoginReason::Login))
            .is_err());
    }

    #[test]
    fn test_ordered_authentication_first_success_wins() {
        let first = Arc::new(StaticAuthenticator::rejecting("first", "no"));
        let second = Arc::new(StaticAuthenticator::accepting("second").with_domain("CORP"));
        let third = Arc::new(StaticAuthenticator::accepting("third"));
        let mut registry = PluginRegistry::new();
        registry
            .register_authenticate(first.clone())
            .register_authenticate(second.clone())
            .register_authenticate(third.clone());

        let mut user = UserInformation::new("alice", "pw");
        let result = OrderedAuthentication::from_registry(&registry)
            .perform_login(&mut user)
            .unwrap();

        assert!(result.success);
        assert_eq!(user.domain, "CORP");
        assert_eq!((first.calls(), second.calls(), third.calls()), (1, 1, 0));
    }

    #[test]
    fn test_ordered_authentication_reports_last_failure() {
        let mut registry = PluginRegistry::new();
        registry
            .register_authenticate(Arc::new(StaticAuthenticator::rejecting("a", "first")))
            .register_authenticate(Arc::new(StaticAuthenticator::erroring("b")));

        let mut user = UserInformation::new("alice", "pw");
        let result = OrderedAuthentication::from_registry(&registry)
            .perform_login(&mut user)
            .unwrap();
        assert!(!result.success);
        assert!(result.message.contains("directory unreachable"));

        let empty = OrderedAuthentication::from_registry(&PluginRegistry::new())
            .perform_login(&mut user)
            .unwrap();
        assert_eq!(empty, BooleanResult::failure(NO_AUTHENTICATE_PLUGIN_MESSAGE));
    }

    fn change_request(session: u32) -> ChangePasswordRequest {
        ChangePasswordRequest {
            username: "alice".to_string(),
            domain: "CORP".to_string(),
            old_password: "old".to_string(),
            new_password: "new".to_string(),
            session: SessionId(session),
        }
    }

    #[test]
    fn test_change_password_first_failure_restores_password() {
        let first = Arc::new(ScriptedPasswordChanger::failing("first", "Password too short"));
        let second = Arc::new(ScriptedPasswordChanger::succeeding("second", "done"));
        let mut registry = PluginRegistry::new();
        registry
            .register_change_password(first.clone())
            .register_change_password(second.clone());
        let (pipeline, state, _env) = setup(registry);

        let mut alice = record("alice", false);
        alice.user.password = "old".to_string();
        state.cache().put(SessionId(1), vec![alice]);

        let response = pipeline.change_password(&change_request(1)).unwrap();

        assert!(!response.result);
        assert_eq!(response.message, "Password too short");
        assert_eq!(response.username, "alice");
        assert_eq!(response.domain, "CORP");
        assert_eq!(first.seen_passwords(), vec!["new".to_string()]);
        assert_eq!(second.calls(), 0);

        let stored = &state.cache().get(SessionId(1)).unwrap()[0];
        assert_eq!(stored.user.password, "old");
    }

    #[test]
    fn test_change_password_success_keeps_new_password() {
        let first = Arc::new(ScriptedPasswordChanger::succeeding("first", "first ok"));
        let second = Arc::new(ScriptedPasswordChanger::succeeding("second", "second ok"));
        let mut registry = PluginRegistry::new();
        registry
            .register_change_password(first.clone())
            .register_change_password(second.clone());
        let (pipeline, state, _env) = setup(registry);
        state
            .cache()
            .put(SessionId(1), vec![record("alice", false), record("bob", true)]);

        let response = pipeline.change_password(&change_request(1)).unwrap();

        assert!(response.result);
        assert_eq!(response.message, "second ok");
        assert_eq!(second.prior_results(), vec![1]);

        let entries = state.cache().get(SessionId(1)).unwrap();
        assert_eq!(entries[0].user.password, "new");
        assert_eq!(entries[0].user.old_password, "old");
        assert_eq!(entries[1].user.password, "pw");
    }

    #[test]
    fn test_change_password_without_plugins_fails() {
        let (pipeline, state, _env) = setup(PluginRegistry::new());
        let mut alice = record("alice", false);
        alice.user.password = "old".to_string();
        state.cache().put(SessionId(1), vec![alice]);

        let response = pipeline.change_password(&change_request(1)).unwrap();
        assert!(!response.result);
        assert_eq!(response.message, NO_CHANGE_PASSWORD_PLUGIN_MESSAGE);
        assert_eq!(state.cache().get(SessionId(1)).unwrap()[0].user.password, "old");
    }

    #[test]
    fn test_change_password_panic_restores_password() {
        let exploding = Arc::new(ScriptedPasswordChanger::panicking("exploding"));
        let after = Arc::new(ScriptedPasswordChanger::succeeding("after", "done"));
        let mut registry = PluginRegistry::new();
        registry
            .register_change_password(exploding.clone())
            .register_change_password(after.clone());
        let (pipeline, state, _env) = setup(registry);

        let mut alice = record("alice", false);
        alice.user.password = "old".to_string();
        state.cache().put(SessionId(1), vec![alice]);

        let response = pipeline.change_password(&change_request(1)).unwrap();

        assert!(!response.result);
        assert!(response.message.contains("exploding"));
        assert_eq!(exploding.calls(), 1);
        assert_eq!(after.calls(), 0);
        assert_eq!(state.cache().get(SessionId(1)).unwrap()[0].user.password, "old");
    }

    #[test]
    fn test_change_password_untracked_session_is_an_error() {
        let (pipeline, _state, _env) = setup(PluginRegistry::new());
        assert!(matches!(
            pipeline.change_password(&change_request(9)),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_defective_notify_plugins_do_not_block_the_rest() {
        let failing = Arc::new(RecordingNotify::failing("failing"));
        let panicking = Arc::new(RecordingNotify::panicking("panicking"));
        let healthy = Arc::new(RecordingNotify::new("healthy"));
        let mut registry = PluginRegistry::new();
        registry
            .register_notify(failing.clone())
            .register_notify(panicking.clone())
            .register_notify(healthy.clone());
        let (pipeline, _state, _env) = setup(registry);

        let entries = vec![record("alice", false)];
        pipeline.notify_session_change(
            SessionId(4),
            SessionChangeReason::SessionLock,
            Some(&entries),
        );

        assert_eq!(failing.calls().len(), 1);
        assert_eq!(panicking.calls().len(), 1);
        let calls = healthy.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].session, SessionId(4));
        assert_eq!(calls[0].entries.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_logoff_request_add_time_is_any() {
        let mut registry = PluginRegistry::new();
        registry
            .register_defer_logoff(Arc::new(PendingLogoff::for_users(&[])))
            .register_defer_logoff(Arc::new(PendingLogoff::for_users(&[]).wanting_time()));
        let (pipeline, _state, _env) = setup(registry);
        assert!(pipeline.logoff_request_add_time());

        let (quiet, _state, _env) = setup(PluginRegistry::new());
        assert!(!quiet.logoff_request_add_time());
    }

    #[test]
    fn test_interactive_users_are_matched_exactly() {
        let mut registry = PluginRegistry::new();
        let auth = Arc::new(StaticAuthenticator::accepting("auth"));
        registry.register_authenticate(auth.clone());
        let (pipeline, _state, env) = setup(registry);
        env.set_interactive(vec![InteractiveUser::new(1, "jimbob")]);

        pipeline
            .login(&login_request("bob", 2, LoginReason::Login))
            .unwrap();
        assert_eq!(auth.calls(), 1);
    }
}
