//! Plugins shipped with the daemon

use crate::plugins::{Notify, Plugin};
use logonbroker_common::{IdentityRecord, Result, SessionChangeReason, SessionId};
use tracing::info;
use uuid::Uuid;

/// Stable id of [`SessionLogPlugin`], usable in `plugins.order.notify`
pub const SESSION_LOG_PLUGIN_UUID: Uuid = Uuid::from_u128(0x5e55_10a6_7c1e_4d2b_9f03_8a64_c2d1_b7e9);

/// Logs every session change with the identities tracked for the session
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionLogPlugin;

impl Plugin for SessionLogPlugin {
    fn uuid(&self) -> Uuid {
        SESSION_LOG_PLUGIN_UUID
    }

    fn name(&self) -> &str {
        "Session Log"
    }
}

impl Notify for SessionLogPlugin {
    fn session_change(
        &self,
        session: SessionId,
        reason: SessionChangeReason,
        entries: Option<&[IdentityRecord]>,
    ) -> Result<()> {
        match entries {
            None => info!(%session, %reason, "Session change for untracked session"),
            Some(entries) => {
                let identities: Vec<String> = entries.iter().map(describe).collect();
                info!(%session, %reason, "Session change: [{}]", identities.join(", "));
            }
        }
        Ok(())
    }
}

fn describe(record: &IdentityRecord) -> String {
    if record.secondary_credential {
        format!("{} (secondary)", record.username())
    } else {
        record.username().to_string()
    }
}
