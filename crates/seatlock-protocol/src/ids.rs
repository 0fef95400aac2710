//! Identifiers for accounts, sessions, and devices.
//!
//! Three identifier types with different lifetimes: an [`AccountId`] names a
//! user and is normalized on construction, a [`SessionId`] is minted fresh on
//! every successful login, and a [`DeviceId`] is generated once per device
//! profile and persisted across restarts.

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// A normalized account identifier.
///
/// Construction trims surrounding whitespace and lowercases the value, so two
/// spellings of the same account always compare equal. Trial detection is an
/// exact match between two normalized ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Creates an account id, normalizing the raw input.
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_lowercase())
    }

    /// Returns the normalized identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Deserialization goes through `new` so stored or received ids keep the
// normalization invariant.
impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(&raw))
    }
}

/// A globally unique session identifier.
///
/// Minted once per successful login and never reused; restoring a persisted
/// session keeps its original id. Equality of session ids is what arbitration
/// decisions are made on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Mints a new unique session id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stable per-device identifier.
///
/// Generated once, persisted to disk, and reused for every later session on
/// the same device profile. Seat arbitration for standard accounts compares
/// device ids to tell a reload on the same machine from a second machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Generates a new random device id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Parses a persisted device id, rejecting empty values.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
