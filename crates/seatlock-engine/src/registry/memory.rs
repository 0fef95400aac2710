//! In-process registry backend.
//!
//! [`MemoryRegistry`] is the shared hub: one document map plus one change
//! feed. Each participant calls [`MemoryRegistry::connect`] for its own
//! [`MemoryConnection`]; dropping the connection runs its disconnect
//! cleanup, which is how tests exercise crash behavior without a network.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use seatlock_protocol::RegistryError;
use tokio::sync::broadcast;

use super::{RegistryChange, RegistryResult, RegistryStore};

/// Channel capacity for the change feed.
const CHANGE_CAPACITY: usize = 256;

struct MemoryInner {
    /// All documents, keyed by registry key.
    docs: DashMap<String, serde_json::Value>,
    /// Fan-out of every change to every watcher.
    changes: broadcast::Sender<RegistryChange>,
    /// When set, every operation on every connection fails.
    offline: AtomicBool,
}

impl MemoryInner {
    fn emit(&self, key: &str, value: Option<serde_json::Value>) {
        let _ = self.changes.send(RegistryChange {
            key: key.to_string(),
            value,
        });
    }
}

/// A shared in-process registry.
///
/// Cloning is cheap; clones share the same documents and change feed.
#[derive(Clone)]
pub struct MemoryRegistry {
    inner: Arc<MemoryInner>,
}

impl MemoryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            inner: Arc::new(MemoryInner {
                docs: DashMap::new(),
                changes,
                offline: AtomicBool::new(false),
            }),
        }
    }

    /// Opens a connection to this registry.
    pub fn connect(&self) -> MemoryConnection {
        MemoryConnection {
            inner: Arc::clone(&self.inner),
            guards: Mutex::new(HashMap::new()),
        }
    }

    /// Simulates a registry outage.
    ///
    /// While offline, every operation on every connection fails with
    /// [`RegistryError::Unavailable`]. Documents are kept; going back
    /// online restores access to them.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Returns the number of documents currently stored.
    pub fn len(&self) -> usize {
        self.inner.docs.len()
    }

    /// Returns whether the registry holds no documents.
    pub fn is_empty(&self) -> bool {
        self.inner.docs.is_empty()
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// One participant's connection to a [`MemoryRegistry`].
///
/// Dropping the connection deletes every guarded key whose document still
/// matches the value it was guarded with, mirroring what a real registry
/// server does when a client connection is lost.
pub struct MemoryConnection {
    inner: Arc<MemoryInner>,
    /// Keys to clean up on drop, with the value each must still hold.
    guards: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemoryConnection {
    fn check_online(&self) -> RegistryResult<()> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(RegistryError::Unavailable("registry offline".to_string()));
        }
        Ok(())
    }
}

impl RegistryStore for MemoryConnection {
    fn put<'a>(
        &'a self,
        key: &'a str,
        value: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = RegistryResult<()>> + Send + 'a>> {
        Box::pin(async move {
            self.check_online()?;
            self.inner.docs.insert(key.to_string(), value.clone());
            self.inner.emit(key, Some(value));
            Ok(())
        })
    }

    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = RegistryResult<Option<serde_json::Value>>> + Send + 'a>> {
        Box::pin(async move {
            self.check_online()?;
            Ok(self.inner.docs.get(key).map(|doc| doc.value().clone()))
        })
    }

    fn delete<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = RegistryResult<()>> + Send + 'a>> {
        Box::pin(async move {
            self.check_online()?;
            if self.inner.docs.remove(key).is_some() {
                self.inner.emit(key, None);
            }
            Ok(())
        })
    }

    fn watch<'a>(
        &'a self,
        prefix: &'a str,
    ) -> Pin<Box<dyn Future<Output = RegistryResult<broadcast::Receiver<RegistryChange>>> + Send + 'a>>
    {
        Box::pin(async move {
            self.check_online()?;
            // The change feed carries everything; watchers filter by key.
            tracing::debug!(prefix = %prefix, "Opened registry watch");
            Ok(self.inner.changes.subscribe())
        })
    }

    fn delete_on_disconnect<'a>(
        &'a self,
        key: &'a str,
        expected: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = RegistryResult<()>> + Send + 'a>> {
        Box::pin(async move {
            self.check_online()?;
            let mut guards = self
                .guards
                .lock()
                .map_err(|_| RegistryError::Rejected("disconnect guard lock poisoned".into()))?;
            guards.insert(key.to_string(), expected);
            Ok(())
        })
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        let guards = match self.guards.lock() {
            Ok(mut guards) => std::mem::take(&mut *guards),
            Err(_) => return,
        };

        for (key, expected) in guards {
            let matches = self
                .inner
                .docs
                .get(&key)
                .map(|doc| *doc.value() == expected)
                .unwrap_or(false);

            if matches {
                self.inner.docs.remove(&key);
                self.inner.emit(&key, None);
                tracing::debug!(key = %key, "Disconnect cleanup removed registry key");
            }
        }
    }
}
