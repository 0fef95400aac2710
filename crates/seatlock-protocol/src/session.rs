//! Session records and remaining-time arithmetic.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, DeviceId, SessionId};

/// Default length of a trial session in milliseconds (two minutes).
pub const DEFAULT_TRIAL_DURATION_MS: u64 = 120_000;

/// Remaining time below this threshold counts as the low-time warning window.
pub const LOW_TIME_THRESHOLD_MS: u64 = 30_000;

/// The authoritative description of one login.
///
/// A record is created on successful login, persisted to the local session
/// store, and projected into the cross-context registry as a seat claim. The
/// session id changes on every login; the device id does not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Normalized account this session belongs to.
    pub account_id: AccountId,
    /// Unique id minted for this login.
    pub session_id: SessionId,
    /// Stable id of the device profile the login happened on.
    pub device_id: DeviceId,
    /// Login time in unix-epoch milliseconds.
    pub logged_in_at: u64,
    /// Whether this is the shared trial account.
    pub trial: bool,
    /// Countdown length for trial sessions; `None` means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial_duration_ms: Option<u64>,
}

impl SessionRecord {
    /// Milliseconds elapsed since login, saturating at zero for skewed clocks.
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.logged_in_at)
    }

    /// Remaining time at `now_ms`.
    ///
    /// Pure arithmetic over the record: trial sessions count down from their
    /// configured duration and clamp at zero, everything else is unbounded.
    pub fn remaining(&self, now_ms: u64) -> RemainingTime {
        match (self.trial, self.trial_duration_ms) {
            (true, Some(duration_ms)) => {
                let left = duration_ms.saturating_sub(self.elapsed_ms(now_ms));
                RemainingTime::Finite(Duration::from_millis(left))
            }
            _ => RemainingTime::Unbounded,
        }
    }

    /// True once a trial session's countdown has fully elapsed.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.remaining(now_ms).is_expired()
    }

    /// Absolute expiry instant in unix millis, if this session has one.
    pub fn deadline_ms(&self) -> Option<u64> {
        if self.trial {
            self.trial_duration_ms
                .map(|d| self.logged_in_at.saturating_add(d))
        } else {
            None
        }
    }
}

/// Time left on a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemainingTime {
    /// Standard sessions never run out on their own.
    Unbounded,
    /// Countdown state of a trial session, clamped at zero.
    Finite(Duration),
}

impl RemainingTime {
    /// True when a finite countdown has reached zero.
    pub fn is_expired(&self) -> bool {
        matches!(self, RemainingTime::Finite(d) if d.is_zero())
    }

    /// True while a finite countdown is inside the warning window but not
    /// yet expired.
    pub fn is_low(&self, threshold: Duration) -> bool {
        matches!(self, RemainingTime::Finite(d) if !d.is_zero() && *d <= threshold)
    }

    /// Remaining milliseconds, or `None` when unbounded.
    pub fn as_millis(&self) -> Option<u64> {
        match self {
            RemainingTime::Unbounded => None,
            RemainingTime::Finite(d) => Some(d.as_millis() as u64),
        }
    }
}

impl std::fmt::Display for RemainingTime {
    /// Renders a countdown as `m:ss`, the format the timer widget shows.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemainingTime::Unbounded => write!(f, "unlimited"),
            RemainingTime::Finite(d) => {
                let total_ms = d.as_millis() as u64;
                let minutes = total_ms / 60_000;
                let seconds = (total_ms % 60_000) / 1_000;
                write!(f, "{}:{:02}", minutes, seconds)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trial_record(logged_in_at: u64) -> SessionRecord {
        SessionRecord {
            account_id: AccountId::new("trial@seatlock.dev"),
            session_id: SessionId::generate(),
            device_id: DeviceId::generate(),
            logged_in_at,
            trial: true,
            trial_duration_ms: Some(DEFAULT_TRIAL_DURATION_MS),
        }
    }

    fn standard_record(logged_in_at: u64) -> SessionRecord {
        SessionRecord {
            account_id: AccountId::new("user@example.com"),
            session_id: SessionId::generate(),
            device_id: DeviceId::generate(),
            logged_in_at,
            trial: false,
            trial_duration_ms: None,
        }
    }

    #[test]
    fn test_fresh_trial_has_full_duration() {
        let record = trial_record(1_000_000);

        assert_eq!(
            record.remaining(1_000_000),
            RemainingTime::Finite(Duration::from_millis(DEFAULT_TRIAL_DURATION_MS))
        );
    }

    #[test]
    fn test_trial_remaining_counts_down_and_clamps() {
        let record = trial_record(1_000_000);

        assert_eq!(
            record.remaining(1_030_000).as_millis(),
            Some(DEFAULT_TRIAL_DURATION_MS - 30_000)
        );
        // Well past the deadline still reads zero, never underflows.
        assert_eq!(record.remaining(9_000_000).as_millis(), Some(0));
        assert!(record.is_expired(9_000_000));
    }

    #[test]
    fn test_standard_session_is_unbounded() {
        let record = standard_record(1_000_000);

        assert_eq!(record.remaining(99_000_000), RemainingTime::Unbounded);
        assert!(!record.is_expired(99_000_000));
        assert_eq!(record.deadline_ms(), None);
    }

    #[test]
    fn test_clock_skew_before_login_reads_full_duration() {
        let record = trial_record(1_000_000);

        // A reading taken "before" login must not underflow elapsed time.
        assert_eq!(
            record.remaining(999_000).as_millis(),
            Some(DEFAULT_TRIAL_DURATION_MS)
        );
    }

    #[test]
    fn test_deadline_is_login_plus_duration() {
        let record = trial_record(1_000_000);

        assert_eq!(record.deadline_ms(), Some(1_000_000 + DEFAULT_TRIAL_DURATION_MS));
    }

    #[test]
    fn test_remaining_display_format() {
        assert_eq!(
            RemainingTime::Finite(Duration::from_millis(119_999)).to_string(),
            "1:59"
        );
        assert_eq!(
            RemainingTime::Finite(Duration::from_millis(61_000)).to_string(),
            "1:01"
        );
        assert_eq!(RemainingTime::Finite(Duration::ZERO).to_string(), "0:00");
        assert_eq!(RemainingTime::Unbounded.to_string(), "unlimited");
    }

    #[test]
    fn test_low_time_window() {
        let threshold = Duration::from_millis(LOW_TIME_THRESHOLD_MS);

        assert!(RemainingTime::Finite(Duration::from_secs(29)).is_low(threshold));
        assert!(!RemainingTime::Finite(Duration::from_secs(31)).is_low(threshold));
        // Expired is not "low", it is gone.
        assert!(!RemainingTime::Finite(Duration::ZERO).is_low(threshold));
        assert!(!RemainingTime::Unbounded.is_low(threshold));
    }

    #[test]
    fn test_record_roundtrip() {
        let record = trial_record(42);
        let json = serde_json::to_string(&record).unwrap();
        let restored: SessionRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(record, restored);
    }

    #[test]
    fn test_record_without_duration_field_deserializes() {
        // Standard sessions omit the duration on the wire.
        let json = r#"{
            "account_id": "user@example.com",
            "session_id": "s-1",
            "device_id": "d-1",
            "logged_in_at": 7,
            "trial": false
        }"#;
        let record: SessionRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.trial_duration_ms, None);
        assert_eq!(record.remaining(1_000_000), RemainingTime::Unbounded);
    }
}
