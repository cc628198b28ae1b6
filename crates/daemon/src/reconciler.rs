//! Session lifecycle reconciliation
//!
//! Keeps the session property cache consistent when sessions log off
//! while identities introduced by secondary credentials still own
//! processes elsewhere on the machine.

use crate::environment::{interactive_anywhere, interactive_in, SessionEnvironment};
use crate::pipeline::Pipeline;
use crate::state::BrokerState;
use logonbroker_common::{
    same_user, CacheGuard, IdentityRecord, InteractiveUser, Result, SessionChangeReason,
    SessionId,
};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, info, info_span};

/// Handles one session change event at a time per worker
pub struct Reconciler {
    state: BrokerState,
    pipeline: Pipeline,
}

impl Reconciler {
    /// Create a new reconciler
    pub fn new(state: BrokerState) -> Self {
        Self {
            pipeline: Pipeline::new(state.clone()),
            state,
        }
    }

    /// Reconcile the cache for a session change and notify plugins
    ///
    /// Errors and panics are logged and the event is dropped. The cache may
    /// be left partially reconciled in that case.
    pub fn handle_session_change(&self, session: SessionId, reason: SessionChangeReason) {
        let span = info_span!("session_change", %session, %reason);
        let _enter = span.enter();

        match panic::catch_unwind(AssertUnwindSafe(|| self.process(session, reason))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Dropping session change event: {}", e),
            Err(_) => error!("Session change handler panicked; event dropped"),
        }
    }

    fn process(&self, session: SessionId, reason: SessionChangeReason) -> Result<()> {
        let logoff = reason == SessionChangeReason::SessionLogoff;
        let mut cache = self.state.cache().lock();

        if logoff && cache.exists(session) {
            reconcile_logoff(&mut cache, session, self.state.environment())?;
        }

        let entries = cache.peek(session);
        self.pipeline.notify_session_change(session, reason, entries);

        if logoff && cache.remove(session).is_some() {
            info!("Session {} removed from cache", session);
        }
        Ok(())
    }
}

/// Rewrite the cache for a session that is logging off
///
/// Runs under the caller's lock. Other sessions are scanned in ascending
/// id order, which decides where primary ownership ends up when several
/// sessions know the same user.
pub fn reconcile_logoff(
    cache: &mut CacheGuard<'_>,
    session: SessionId,
    env: &dyn SessionEnvironment,
) -> Result<()> {
    let Some(mut mine) = cache.get(session) else {
        return Ok(());
    };
    let others: Vec<SessionId> = cache.keys().into_iter().filter(|s| *s != session).collect();

    let interactive = env.interactive_users()?;
    let mut contexts = Vec::with_capacity(others.len());
    for other in &others {
        contexts.push((*other, env.session_process_users(*other)?));
    }

    propagate(cache, &mine, &contexts, &interactive);

    // cross-flag: the later side of each shared username ends up primary
    for record in mine.iter_mut() {
        let username = record.user.username.clone();
        for other in &others {
            let Some(entries) = cache.get_mut(*other) else {
                continue;
            };
            for theirs in entries.iter_mut().filter(|r| r.is_user(&username)) {
                record.secondary_credential = true;
                theirs.secondary_credential = false;
            }
        }
    }

    let mut index = 0;
    mine.retain(|record| {
        let keep = index == 0 || !interactive_anywhere(&interactive, record.username());
        if !keep {
            debug!("Pruning {}: interactive elsewhere", record.username());
        }
        index += 1;
        keep
    });

    for x in (1..mine.len()).rev() {
        let username = mine[x].username();
        let owned_elsewhere = others.iter().any(|other| {
            cache
                .peek(*other)
                .map_or(false, |entries| entries.iter().any(|r| r.is_user(username)))
        });
        if owned_elsewhere {
            debug!("Dropping {} from session {}: owned elsewhere", username, session);
            mine.remove(x);
        } else {
            debug!("{} is owned by session {} only", username, session);
            mine[x].secondary_credential = false;
        }
    }

    cache.put(session, mine);
    Ok(())
}

/// Copy secondary identities into sessions where their processes still run
fn propagate(
    cache: &mut CacheGuard<'_>,
    mine: &[IdentityRecord],
    contexts: &[(SessionId, Vec<String>)],
    interactive: &[InteractiveUser],
) {
    for record in mine.iter().skip(1) {
        let username = record.username();
        for (other, users) in contexts {
            if !users.iter().any(|u| same_user(u, username))
                || interactive_in(interactive, *other, username)
            {
                continue;
            }
            let Some(entries) = cache.get_mut(*other) else {
                continue;
            };
            if entries.iter().any(|r| r.is_user(username)) {
                continue;
            }
            info!("Carrying {} over to session {}", username, other);
            entries.push(IdentityRecord::new(record.user.clone(), true));
        }
    }
}
