//! Error types shared across the seatlock crates.
//!
//! Two deliberate gaps: session conflict and trial expiry are not errors.
//! They reach the host through `SessionEvent` notifications, because by the
//! time either is detected there is no caller left to return an error to.

use thiserror::Error;

/// Error type for session manager operations.
#[derive(Debug, Error)]
pub enum SessionError {
    // Login policy errors
    /// The credential verifier rejected the login. The message is passed
    /// through verbatim from the verifier.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The trial seat was released too recently to be claimed again.
    /// Raised before any credential check, on the trial path only.
    #[error("trial seat is cooling down: available again in {retry_after_ms} ms")]
    TrialCooldownActive {
        /// Milliseconds until the cooldown window closes.
        retry_after_ms: u64,
    },

    /// `login` was called while a session is already active.
    #[error("a session is already active; log out first")]
    AlreadyActive,

    // Lifecycle errors
    /// `start` was called on a manager that is already running.
    #[error("session manager is already running")]
    AlreadyStarted,

    // Collaborator errors
    /// A registry operation failed where the registry was mandatory.
    /// During login the registry is optional and its failures degrade to
    /// local-only enforcement instead of surfacing here.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Local session persistence failed.
    #[error("session store error: {0}")]
    Store(String),
}

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Error type for cross-context registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The registry cannot be reached right now. Callers treat this as "no
    /// evidence", never as an absent entry.
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    /// The connection dropped mid-operation.
    #[error("registry connection closed")]
    ConnectionClosed,

    /// The registry did not answer in time.
    #[error("registry request timed out: {0}")]
    Timeout(String),

    /// A stored document could not be encoded or decoded.
    #[error("registry payload invalid: {0}")]
    Serialization(String),

    /// The registry answered with an explicit error.
    #[error("registry rejected the request: {0}")]
    Rejected(String),
}

// Conversions from underlying crate errors

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Serialization(err.to_string())
    }
}
