//! # Seatlock Engine Library
//!
//! This crate provides the session engine for Seatlock, enforcing
//! single-seat access per account across devices and browser-style contexts.
//!
//! ## Overview
//!
//! The engine is embedded by host applications that gate content behind a
//! login. It provides:
//!
//! - **Session Lifecycle**: Login, logout, persistence, and restoration
//! - **Trial Countdown**: Time-boxed trial sessions with exactly-once expiry events
//! - **Seat Arbitration**: Last login wins, enforced through a shared registry
//! - **Degraded Mode**: Logins survive registry outages with local-only enforcement
//! - **Content Catalog**: Folder navigation with breadcrumbs and human sorting
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Session Manager                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐  │
//! │  │  Credential  │  │   Session    │  │      Signal          │  │
//! │  │  Verifier    │  │   Store      │  │      Relay           │  │
//! │  └──────────────┘  └──────────────┘  └──────────────────────┘  │
//! │                                                                  │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │              Session Watcher (one per session)             │ │
//! │  │   expiry deadline · seat changes · poll · heartbeat        │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! │                                                                  │
//! │  ┌───────────────────┐  ┌───────────────────────────────────┐  │
//! │  │  Memory Registry  │  │      WebSocket Registry           │  │
//! │  └───────────────────┘  └───────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use seatlock_engine::{
//!     Config, MemoryRegistry, SessionManager, SessionStore, SignalRelay, StaticVerifier,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Load or create configuration
//!     let config = Config::load_default()?;
//!
//!     // Wire up the collaborators
//!     let registry = MemoryRegistry::new();
//!     let verifier = Arc::new(StaticVerifier::new().with_account("trial@seatlock.dev", "trial"));
//!     let store = SessionStore::in_dir(&config.engine.data_dir);
//!     let relay = SignalRelay::new();
//!
//!     let manager = SessionManager::new(
//!         config,
//!         Arc::new(registry.connect()),
//!         verifier,
//!         store,
//!         relay,
//!     )?;
//!     manager.start().await?;
//!
//!     let session = manager.login("trial@seatlock.dev", "trial").await?;
//!     println!("logged in as {}", session.account_id);
//!     println!("time left: {}", manager.remaining_time().await);
//!
//!     manager.logout().await;
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`identity`]: Stable device id persistence
//! - [`library`]: Content catalog browsing and sorting
//! - [`logging`]: Tracing subscriber setup
//! - [`manager`]: Session lifecycle and supervision
//! - [`registry`]: Cross-context seat registry backends
//! - [`relay`]: In-process force-logout signals
//! - [`store`]: Local session persistence
//! - [`verify`]: Credential verification

pub mod config;
pub mod identity;
pub mod library;
pub mod logging;
pub mod manager;
pub mod registry;
pub mod relay;
pub mod store;
pub mod verify;

// Re-export protocol for convenience
pub use seatlock_protocol as protocol;

// Re-export config types for convenience
pub use config::Config;

// Re-export manager types for convenience
pub use manager::SessionManager;

// Re-export registry types for convenience
pub use registry::{
    ConnectionState, MemoryConnection, MemoryRegistry, RegistryChange, RegistryResult,
    RegistryStore, RemoteRegistryConfig, SeatChange, SeatRegistry, SeatWatch, WebSocketRegistry,
};

// Re-export relay types for convenience
pub use relay::SignalRelay;

// Re-export store types for convenience
pub use store::SessionStore;

// Re-export verify types for convenience
pub use verify::{CredentialVerifier, HttpVerifier, StaticVerifier, VerifyError, VerifyResult};

// Re-export library types for convenience
pub use library::{
    format_size, CatalogBrowser, CatalogError, Crumb, FileCatalog, FileEntry, FileId, FileKind,
    FileLinks, SortOrder, StaticCatalog,
};
