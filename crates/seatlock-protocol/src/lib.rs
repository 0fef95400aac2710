//! # Seatlock Protocol Library
//!
//! This crate provides the shared data model for the seatlock session
//! coordination system.
//!
//! ## Overview
//!
//! The protocol crate is the vocabulary every seatlock component speaks,
//! providing:
//!
//! - **Identifiers**: normalized account ids, per-login session ids, and
//!   persistent device ids
//! - **Session Records**: the authoritative description of a login and its
//!   trial countdown arithmetic
//! - **Seat Claims**: the registry-visible projection used for
//!   single-seat arbitration
//! - **Events and Signals**: terminal session notifications and
//!   cross-context relay messages
//! - **Errors**: the session and registry failure taxonomy
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐  relay signals  ┌───────────────┐
//! │ session mgr A │◄───────────────►│ session mgr B │   same process
//! └───────┬───────┘                 └───────┬───────┘
//!         │ seat claims                     │
//!         ▼                                 ▼
//! ┌─────────────────────────────────────────────────┐
//! │           cross-context registry                │   last writer wins
//! │        one claim slot per account               │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use seatlock_protocol::{
//!     AccountId, DeviceId, SessionId, SessionRecord, DEFAULT_TRIAL_DURATION_MS,
//! };
//!
//! // Describe a fresh trial login.
//! let record = SessionRecord {
//!     account_id: AccountId::new(" Trial@Seatlock.dev "),
//!     session_id: SessionId::generate(),
//!     device_id: DeviceId::generate(),
//!     logged_in_at: 1_000_000,
//!     trial: true,
//!     trial_duration_ms: Some(DEFAULT_TRIAL_DURATION_MS),
//! };
//!
//! // Thirty seconds in, ninety seconds remain.
//! let remaining = record.remaining(record.logged_in_at + 30_000);
//! assert_eq!(remaining.to_string(), "1:30");
//!
//! // Account ids are normalized on construction.
//! assert_eq!(record.account_id.as_str(), "trial@seatlock.dev");
//! ```
//!
//! ## Modules
//!
//! - [`ids`]: account, session, and device identifiers
//! - [`session`]: session records and remaining-time arithmetic
//! - [`claim`]: seat claims published to the registry
//! - [`events`]: session events and relay signals
//! - [`error`]: error types
//! - [`time`]: wall-clock helpers

pub mod claim;
pub mod error;
pub mod events;
pub mod ids;
pub mod session;
pub mod time;

pub use claim::SeatClaim;
pub use error::{RegistryError, Result, SessionError};
pub use events::{RelaySignal, SessionEvent};
pub use ids::{AccountId, DeviceId, SessionId};
pub use session::{
    RemainingTime, SessionRecord, DEFAULT_TRIAL_DURATION_MS, LOW_TIME_THRESHOLD_MS,
};
pub use time::now_millis;
