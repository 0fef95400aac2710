//! Event and signal vocabulary.
//!
//! [`SessionEvent`] is what a manager tells its host: one terminal
//! notification per session that ended involuntarily. [`RelaySignal`] is what
//! co-located managers tell each other over the in-process relay.

use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, SessionId};

/// Terminal session notifications surfaced to the host application.
///
/// Exactly one event fires per involuntarily terminated session, and never
/// both: a session that expires is not also reported as replaced. Explicit
/// `logout` calls fire nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SessionEvent {
    /// The trial countdown ran out.
    TrialExpired {
        account_id: AccountId,
        session_id: SessionId,
    },
    /// A newer login took this account's seat.
    SessionReplaced {
        account_id: AccountId,
        session_id: SessionId,
    },
}

impl SessionEvent {
    /// Account the ended session belonged to.
    pub fn account_id(&self) -> &AccountId {
        match self {
            SessionEvent::TrialExpired { account_id, .. } => account_id,
            SessionEvent::SessionReplaced { account_id, .. } => account_id,
        }
    }

    /// Id of the ended session.
    pub fn session_id(&self) -> &SessionId {
        match self {
            SessionEvent::TrialExpired { session_id, .. } => session_id,
            SessionEvent::SessionReplaced { session_id, .. } => session_id,
        }
    }
}

/// Signals exchanged between managers sharing a process.
///
/// The relay is fire-and-forget: publishing with no listeners is fine, and a
/// manager always ignores signals about its own winning session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RelaySignal {
    /// A new login for `account_id` supersedes every older co-located
    /// session of that account.
    ForceLogout {
        account_id: AccountId,
        /// The session that now holds the seat.
        winner: SessionId,
        /// When the supersession happened, unix millis.
        at_ms: u64,
    },
}
