//! Shared seat registry.
//!
//! This module provides the coordination layer between devices:
//! - [`RegistryStore`]: a raw string-keyed JSON document store with watch
//!   and disconnect-cleanup support
//! - [`memory`]: an in-process registry for tests and single-host setups
//! - [`remote`]: a WebSocket-backed registry client for real deployments
//! - [`SeatRegistry`]: a typed facade over a store, speaking in seat claims
//!   and cooldown markers instead of raw JSON

pub mod memory;
pub mod remote;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use seatlock_protocol::{AccountId, RegistryError, SeatClaim};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Result type for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// A change observed on a watched registry key.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryChange {
    /// The key that changed.
    pub key: String,
    /// The new value, or `None` if the key was deleted.
    pub value: Option<serde_json::Value>,
}

/// A raw shared document store that all devices can reach.
///
/// This trait abstracts over registry backends (in-process, WebSocket, etc.)
/// and provides the minimal operations seat coordination needs. Values are
/// JSON documents; keys are flat strings with `/`-separated components.
///
/// A failed operation means the registry could not be consulted. It never
/// means the key is absent; `get` reports absence as `Ok(None)`.
pub trait RegistryStore: Send + Sync {
    /// Writes `value` under `key`, replacing any existing document.
    fn put<'a>(
        &'a self,
        key: &'a str,
        value: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = RegistryResult<()>> + Send + 'a>>;

    /// Reads the document under `key`, or `None` if the key is absent.
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = RegistryResult<Option<serde_json::Value>>> + Send + 'a>>;

    /// Deletes the document under `key`. Deleting an absent key succeeds.
    fn delete<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = RegistryResult<()>> + Send + 'a>>;

    /// Subscribes to changes for keys starting with `prefix`.
    ///
    /// Implementations deliver at least the changes under `prefix`; they may
    /// deliver more. Callers must filter by key.
    fn watch<'a>(
        &'a self,
        prefix: &'a str,
    ) -> Pin<Box<dyn Future<Output = RegistryResult<broadcast::Receiver<RegistryChange>>> + Send + 'a>>;

    /// Arms a cleanup hook: when this store's connection to the registry
    /// drops, delete `key` if it still holds exactly `expected`.
    ///
    /// The value comparison keeps a dying holder from deleting a claim a
    /// successor has already written over. Re-arm after every refresh, since
    /// a refreshed claim no longer matches the guarded value.
    fn delete_on_disconnect<'a>(
        &'a self,
        key: &'a str,
        expected: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = RegistryResult<()>> + Send + 'a>>;
}

/// Registry key holding the seat claim for `account`.
pub fn seat_key(account: &AccountId) -> String {
    format!("seats/{}", account)
}

/// Registry key holding the release cooldown marker for `account`.
pub fn cooldown_key(account: &AccountId) -> String {
    format!("cooldown/{}", account)
}

/// Cooldown marker stored under [`cooldown_key`] when a trial seat is freed.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReleaseMarker {
    /// When the seat was released, unix millis.
    released_at_ms: u64,
}

/// A change to a watched seat.
#[derive(Debug, Clone, PartialEq)]
pub enum SeatChange {
    /// The seat now holds this claim.
    Claimed(SeatClaim),
    /// The seat was released.
    Vacated,
}

/// A subscription to one account's seat.
pub struct SeatWatch {
    key: String,
    rx: broadcast::Receiver<RegistryChange>,
}

impl SeatWatch {
    /// Waits for the next change to the watched seat.
    ///
    /// Changes to other keys are skipped, as are malformed claim documents
    /// and lagged stretches of the underlying channel. Returns `None` once
    /// the watch stream has ended.
    pub async fn next(&mut self) -> Option<SeatChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) if change.key == self.key => match change.value {
                    Some(value) => match serde_json::from_value::<SeatClaim>(value) {
                        Ok(claim) => return Some(SeatChange::Claimed(claim)),
                        Err(e) => {
                            tracing::warn!(key = %self.key, "Ignoring malformed seat claim: {}", e);
                        }
                    },
                    None => return Some(SeatChange::Vacated),
                },
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        key = %self.key,
                        skipped,
                        "Seat watch lagged; continuing from the latest change"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Typed facade over a [`RegistryStore`] for seat coordination.
///
/// Cloning is cheap; clones share the underlying store.
#[derive(Clone)]
pub struct SeatRegistry {
    store: Arc<dyn RegistryStore>,
}

impl SeatRegistry {
    /// Creates a seat registry over the given store.
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self { store }
    }

    /// Reads the current claim on `account`'s seat.
    ///
    /// A malformed claim document is reported as an absent claim after a
    /// warning, so one corrupt write cannot wedge the seat forever.
    pub async fn claim_for(&self, account: &AccountId) -> RegistryResult<Option<SeatClaim>> {
        let key = seat_key(account);
        let Some(value) = self.store.get(&key).await? else {
            return Ok(None);
        };

        match serde_json::from_value::<SeatClaim>(value) {
            Ok(claim) => Ok(Some(claim)),
            Err(e) => {
                tracing::warn!(key = %key, "Ignoring malformed seat claim: {}", e);
                Ok(None)
            }
        }
    }

    /// Publishes `claim` as the current holder of its account's seat and
    /// arms disconnect cleanup for it.
    pub async fn publish(&self, claim: &SeatClaim) -> RegistryResult<()> {
        let key = seat_key(&claim.account_id);
        let value = serde_json::to_value(claim)?;

        self.store.put(&key, value.clone()).await?;
        self.store.delete_on_disconnect(&key, value).await?;

        tracing::debug!(key = %key, session_id = %claim.session_id, "Published seat claim");
        Ok(())
    }

    /// Releases `account`'s seat. Releasing a vacant seat succeeds.
    pub async fn release(&self, account: &AccountId) -> RegistryResult<()> {
        self.store.delete(&seat_key(account)).await
    }

    /// Subscribes to changes of `account`'s seat.
    pub async fn watch_account(&self, account: &AccountId) -> RegistryResult<SeatWatch> {
        let key = seat_key(account);
        let rx = self.store.watch(&key).await?;
        Ok(SeatWatch { key, rx })
    }

    /// Records that `account`'s seat was released at `at_ms`, for the
    /// reuse-cooldown check.
    pub async fn mark_released(&self, account: &AccountId, at_ms: u64) -> RegistryResult<()> {
        let marker = ReleaseMarker {
            released_at_ms: at_ms,
        };
        let value = serde_json::to_value(&marker)?;
        self.store.put(&cooldown_key(account), value).await
    }

    /// When `account`'s seat was last released, if the registry knows.
    pub async fn last_release(&self, account: &AccountId) -> RegistryResult<Option<u64>> {
        let Some(value) = self.store.get(&cooldown_key(account)).await? else {
            return Ok(None);
        };

        match serde_json::from_value::<ReleaseMarker>(value) {
            Ok(marker) => Ok(Some(marker.released_at_ms)),
            Err(e) => {
                tracing::warn!(account = %account, "Ignoring malformed cooldown marker: {}", e);
                Ok(None)
            }
        }
    }
}

// Re-export key types
pub use memory::{MemoryConnection, MemoryRegistry};
pub use remote::{ConnectionState, RemoteRegistryConfig, WebSocketRegistry};
