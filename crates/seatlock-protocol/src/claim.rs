//! Seat claims: the registry-visible projection of a session.
//!
//! One claim per account lives in the cross-context registry. Whoever wrote
//! the claim last holds the seat; everyone else discovers the supersession
//! through change notifications or their fallback poll and terminates.

use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, DeviceId, SessionId};
use crate::session::SessionRecord;

/// The externally visible slice of a [`SessionRecord`].
///
/// Carries just enough for arbitration: who holds the seat, from which
/// device, since when, and how recently the holder was alive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatClaim {
    /// Account whose seat this is.
    pub account_id: AccountId,
    /// Session currently holding the seat.
    pub session_id: SessionId,
    /// Device the holding session runs on.
    pub device_id: DeviceId,
    /// Holder's login time in unix millis.
    pub logged_in_at: u64,
    /// Last heartbeat in unix millis; refreshed while the holder is alive.
    pub last_activity: u64,
}

impl SeatClaim {
    /// Projects a session record into a claim, stamping the first heartbeat.
    pub fn of(record: &SessionRecord, now_ms: u64) -> Self {
        Self {
            account_id: record.account_id.clone(),
            session_id: record.session_id.clone(),
            device_id: record.device_id.clone(),
            logged_in_at: record.logged_in_at,
            last_activity: now_ms,
        }
    }

    /// Copy of this claim with the heartbeat moved to `now_ms`.
    pub fn refreshed(&self, now_ms: u64) -> Self {
        Self {
            last_activity: now_ms,
            ..self.clone()
        }
    }

    /// True when the claim belongs to the given session.
    pub fn held_by(&self, session_id: &SessionId) -> bool {
        self.session_id == *session_id
    }

    /// True once the heartbeat is older than `ttl_ms`.
    ///
    /// A stale claim's holder is presumed dead (crashed tab, dropped
    /// connection that never fired its disconnect hook) and can be swept
    /// without a force-logout signal.
    pub fn is_stale(&self, now_ms: u64, ttl_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_activity) > ttl_ms
    }
}
