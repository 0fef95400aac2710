//! Session lifecycle management.
//!
//! [`SessionManager`] owns one account session end to end: it authenticates
//! logins, persists the resulting record, projects it into the cross-context
//! registry as a seat claim, and supervises the session until it ends. Three
//! things can end a session:
//!
//! - An explicit `logout` call, which is silent.
//! - The trial countdown running out, reported as [`SessionEvent::TrialExpired`].
//! - A newer login taking the seat, reported as [`SessionEvent::SessionReplaced`].
//!
//! Supervision runs on a single spawned task per session that multiplexes the
//! expiry deadline, registry change notifications, the fallback poll, the
//! heartbeat refresh, and force-logout signals from co-located managers. Both
//! involuntary endings funnel through one guarded transition, so exactly one
//! event fires per terminated session no matter how many detection paths race.

use std::sync::Arc;
use std::time::Duration;

use seatlock_protocol::{
    now_millis, AccountId, DeviceId, RelaySignal, RemainingTime, Result, SeatClaim, SessionError,
    SessionEvent, SessionId, SessionRecord,
};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::identity;
use crate::registry::{RegistryStore, SeatChange, SeatRegistry};
use crate::relay::SignalRelay;
use crate::store::SessionStore;
use crate::verify::CredentialVerifier;

/// Capacity of the session event channel.
const EVENT_CAPACITY: usize = 64;

/// Why a session ended involuntarily.
enum Termination {
    /// The trial countdown reached zero.
    Expired,
    /// A newer login took the seat.
    Replaced,
}

/// The currently held session plus the handle to its watcher task.
struct ActiveSession {
    record: SessionRecord,
    watcher_token: CancellationToken,
}

struct ManagerInner {
    config: Config,
    registry: SeatRegistry,
    verifier: Arc<dyn CredentialVerifier>,
    store: SessionStore,
    relay: SignalRelay,
    device_id: DeviceId,
    /// The active session, if any. `None` between sessions.
    active: RwLock<Option<ActiveSession>>,
    /// Serializes login, logout, restoration, and involuntary termination.
    transitions: Mutex<()>,
    running: RwLock<bool>,
    event_tx: broadcast::Sender<SessionEvent>,
}

/// Manages the lifecycle of one account session.
///
/// Cheap to clone; clones share the same session state. Collaborators are
/// injected: the registry decides how far arbitration reaches (in-process
/// with [`crate::registry::MemoryRegistry`], cross-machine with
/// [`crate::registry::WebSocketRegistry`]), the verifier decides who may log
/// in, and the relay connects co-located managers.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    /// Creates a manager.
    ///
    /// Loads or generates the device id under the configured data directory,
    /// so every session from this profile reports the same device, and loads
    /// the session store so persisted state is visible before any operation.
    /// `start` only scopes supervision; a host that never calls it still
    /// restores, honors cooldown remnants, and never clobbers stored state
    /// with an unloaded copy.
    pub fn new(
        config: Config,
        registry: Arc<dyn RegistryStore>,
        verifier: Arc<dyn CredentialVerifier>,
        store: SessionStore,
        relay: SignalRelay,
    ) -> anyhow::Result<Self> {
        let device_path = config.engine.data_dir.join(identity::DEVICE_ID_FILE);
        let device_id = identity::load_or_generate_device_id(&device_path)?;
        if let Err(e) = store.load() {
            warn!("Session store unreadable, starting logged out: {}", e);
        }
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(ManagerInner {
                config,
                registry: SeatRegistry::new(registry),
                verifier,
                store,
                relay,
                device_id,
                active: RwLock::new(None),
                transitions: Mutex::new(()),
                running: RwLock::new(false),
                event_tx,
            }),
        })
    }

    /// Starts the manager: restores a persisted session if one is still
    /// valid and resumes its supervision.
    ///
    /// Calling `start` on a running manager is an error.
    pub async fn start(&self) -> Result<()> {
        {
            let mut running = self.inner.running.write().await;
            if *running {
                return Err(SessionError::AlreadyStarted);
            }
            *running = true;
        }

        if self.restore_session().await {
            info!("Session manager started, restored an active session");
        } else {
            info!("Session manager started");
        }
        Ok(())
    }

    /// Stops supervision without ending the session.
    ///
    /// The persisted record stays in the store, so a later `start` can
    /// restore the session with its original deadline. Calling `shutdown` on
    /// a stopped manager does nothing.
    pub async fn shutdown(&self) {
        // Serialized with login, so a session armed by an in-flight login is
        // seen here and suspended rather than left running.
        let _transition = self.inner.transitions.lock().await;
        {
            let mut running = self.inner.running.write().await;
            if !*running {
                return;
            }
            *running = false;
        }

        let session = self.inner.active.write().await.take();
        if let Some(session) = session {
            session.watcher_token.cancel();
            debug!(
                "Suspended the watcher for session {}",
                session.record.session_id
            );
        }
        info!("Session manager shut down");
    }

    /// Logs in to `account` with the given credential.
    ///
    /// The policy ladder, in order: a second login while a session is active
    /// fails with [`SessionError::AlreadyActive`]; a trial login inside the
    /// configured reuse cooldown fails with
    /// [`SessionError::TrialCooldownActive`] before any credential check; a
    /// current holder of the seat is evicted (last login wins); and only then
    /// does the credential verifier decide.
    ///
    /// Registry failures never fail a login. The session proceeds with
    /// local-only enforcement and the watcher publishes the seat claim once
    /// the registry comes back.
    pub async fn login(&self, account: &str, credential: &str) -> Result<SessionRecord> {
        let _transition = self.inner.transitions.lock().await;

        if self.inner.active.read().await.is_some() {
            return Err(SessionError::AlreadyActive);
        }

        let account = AccountId::new(account);
        let trial = account == AccountId::new(&self.inner.config.trial.account_id);

        if trial {
            self.check_trial_cooldown(&account).await?;
        }

        // Minted up front so eviction signals can already name the winner.
        let session_id = SessionId::generate();

        if self.coordinated(trial) {
            self.evict_current_holder(&account, &session_id, trial).await;
        }

        self.inner
            .verifier
            .verify(&account, credential)
            .await
            .map_err(|e| SessionError::AuthenticationFailed(e.0))?;

        let record = SessionRecord {
            account_id: account,
            session_id,
            device_id: self.inner.device_id.clone(),
            logged_in_at: now_millis(),
            trial,
            trial_duration_ms: trial.then_some(self.inner.config.trial.duration_ms),
        };
        self.inner
            .store
            .set_session(record.clone())
            .map_err(|e| SessionError::Store(e.to_string()))?;

        let claim_published = if self.coordinated(trial) {
            self.publish_claim(&record).await
        } else {
            false
        };
        self.arm_watcher(record.clone(), claim_published).await;

        info!(
            "Login succeeded for {} (session {}, trial: {})",
            record.account_id, record.session_id, record.trial
        );
        Ok(record)
    }

    /// Ends the active session silently.
    ///
    /// Releases the seat claim, records the trial release for the reuse
    /// cooldown, and clears the store. No [`SessionEvent`] fires for an
    /// explicit logout, and calling it with no active session does nothing.
    pub async fn logout(&self) {
        let _transition = self.inner.transitions.lock().await;
        let session = self.inner.active.write().await.take();
        let Some(session) = session else {
            debug!("Logout called with no active session");
            return;
        };
        self.teardown(session, None).await;
    }

    /// True while a session is active.
    ///
    /// With no live session this attempts restoration from the store: an
    /// expired trial record is purged silently, a record whose seat moved to
    /// another session is purged silently, anything else resumes with its
    /// original deadline.
    pub async fn is_authenticated(&self) -> bool {
        if self.inner.active.read().await.is_some() {
            return true;
        }
        self.restore_session().await
    }

    /// Time left on the active session.
    ///
    /// Pure arithmetic over the session record. Returns
    /// [`RemainingTime::Unbounded`] when no session is active.
    pub async fn remaining_time(&self) -> RemainingTime {
        match self.inner.active.read().await.as_ref() {
            Some(session) => session.record.remaining(now_millis()),
            None => RemainingTime::Unbounded,
        }
    }

    /// The active session record, if any.
    pub async fn session_info(&self) -> Option<SessionRecord> {
        self.inner
            .active
            .read()
            .await
            .as_ref()
            .map(|s| s.record.clone())
    }

    /// Subscribes to terminal session events.
    ///
    /// Exactly one event arrives per involuntarily ended session. When expiry
    /// and replacement race, expiry wins and replacement is never reported.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.event_tx.subscribe()
    }

    /// The stable device id this manager runs under.
    pub fn device_id(&self) -> &DeviceId {
        &self.inner.device_id
    }

    /// Whether sessions of this kind take part in seat arbitration.
    ///
    /// Trial sessions always do. Standard sessions only under
    /// `enforce_standard_single_seat`; without it they publish no claim and
    /// run unsupervised.
    fn coordinated(&self, trial: bool) -> bool {
        trial || self.inner.config.session.enforce_standard_single_seat
    }

    /// Rejects a trial login while the reuse cooldown is open.
    ///
    /// The registry marker is authoritative; when it cannot be read the
    /// locally recorded trial end stands in, so a flaky connection does not
    /// disable the cooldown entirely.
    async fn check_trial_cooldown(&self, account: &AccountId) -> Result<()> {
        let Some(cooldown_ms) = self.inner.config.trial.reuse_cooldown_ms else {
            return Ok(());
        };

        let released_at = match self.inner.registry.last_release(account).await {
            Ok(marker) => marker,
            Err(e) => {
                debug!("Cooldown marker unreadable from the registry: {}", e);
                self.inner
                    .store
                    .last_trial_end(account)
                    .map_err(|e| SessionError::Store(e.to_string()))?
            }
        };

        if let Some(released_at) = released_at {
            let elapsed = now_millis().saturating_sub(released_at);
            if elapsed < cooldown_ms {
                return Err(SessionError::TrialCooldownActive {
                    retry_after_ms: cooldown_ms - elapsed,
                });
            }
        }
        Ok(())
    }

    /// Clears the way for a new login: last login wins.
    ///
    /// A fresh claim is evicted loudly, with a force-logout signal naming the
    /// winning session. A stale claim (heartbeat older than the claim TTL)
    /// belongs to a dead holder and is swept without a signal. A standard
    /// account's claim from this same device is left alone; publishing the
    /// new claim supersedes it.
    async fn evict_current_holder(&self, account: &AccountId, winner: &SessionId, trial: bool) {
        let existing = match self.inner.registry.claim_for(account).await {
            Ok(Some(existing)) => existing,
            Ok(None) => return,
            Err(e) => {
                // No evidence either way. The login proceeds and the watcher
                // sorts out any conflict later.
                warn!("Seat registry unreachable during login: {}", e);
                return;
            }
        };

        let now = now_millis();
        if !trial && existing.device_id == self.inner.device_id {
            debug!("Superseding this device's previous claim on {}", account);
        } else if existing.is_stale(now, self.inner.config.session.claim_ttl_ms) {
            debug!(
                "Sweeping the stale claim of session {} on {}",
                existing.session_id, account
            );
            if let Err(e) = self.inner.registry.release(account).await {
                warn!("Failed to sweep the stale seat claim: {}", e);
            }
        } else {
            warn!(
                "Evicting session {} from the {} seat",
                existing.session_id, account
            );
            self.inner.relay.publish(RelaySignal::ForceLogout {
                account_id: account.clone(),
                winner: winner.clone(),
                at_ms: now,
            });
            if let Err(e) = self.inner.registry.release(account).await {
                warn!("Failed to release the evicted seat claim: {}", e);
            }
        }
    }

    /// Publishes the session's seat claim, returning whether it landed.
    async fn publish_claim(&self, record: &SessionRecord) -> bool {
        let claim = SeatClaim::of(record, now_millis());
        match self.inner.registry.publish(&claim).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Seat claim not published, enforcing locally only: {}", e);
                false
            }
        }
    }

    /// Restores a persisted session if it is still valid.
    async fn restore_session(&self) -> bool {
        let _transition = self.inner.transitions.lock().await;
        if self.inner.active.read().await.is_some() {
            // A login raced us while we waited for the lock.
            return true;
        }

        let record = match self.inner.store.session() {
            Ok(Some(record)) => record,
            Ok(None) => return false,
            Err(e) => {
                warn!("Session store unreadable, treating as logged out: {}", e);
                return false;
            }
        };

        if record.is_expired(now_millis()) {
            debug!("Discarding the expired persisted session {}", record.session_id);
            self.discard_expired(&record).await;
            return false;
        }

        let claim_published = if self.coordinated(record.trial) {
            match self.inner.registry.claim_for(&record.account_id).await {
                Ok(Some(claim)) if claim.held_by(&record.session_id) => true,
                Ok(Some(claim)) => {
                    debug!(
                        "Persisted session {} was superseded by {}, discarding it",
                        record.session_id, claim.session_id
                    );
                    if let Err(e) = self.inner.store.clear_session() {
                        warn!("Failed to clear the session store: {}", e);
                    }
                    return false;
                }
                // Absent or unreachable: resume and let the heartbeat
                // republish the claim.
                Ok(None) => false,
                Err(e) => {
                    debug!("Registry unreachable during restore: {}", e);
                    false
                }
            }
        } else {
            false
        };

        info!(
            "Restored session {} for {}",
            record.session_id, record.account_id
        );
        self.arm_watcher(record, claim_published).await;
        true
    }

    /// Disposes of a persisted session whose countdown ran out while nobody
    /// was supervising it. Silent: no event fires.
    async fn discard_expired(&self, record: &SessionRecord) {
        // The claim may still be ours if the process died mid-session.
        match self.inner.registry.claim_for(&record.account_id).await {
            Ok(Some(claim)) if claim.held_by(&record.session_id) => {
                if let Err(e) = self.inner.registry.release(&record.account_id).await {
                    warn!("Failed to release the stale seat claim: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) => debug!("Stale claim check skipped, registry unreachable: {}", e),
        }

        if record.trial {
            // The countdown ran out at its deadline, not at discovery time.
            let released_at = record.deadline_ms().unwrap_or_else(now_millis);
            if let Err(e) = self
                .inner
                .registry
                .mark_released(&record.account_id, released_at)
                .await
            {
                debug!("Release marker not written to the registry: {}", e);
            }
            if let Err(e) = self
                .inner
                .store
                .record_trial_end(&record.account_id, released_at)
            {
                warn!("Failed to record the trial end locally: {}", e);
            }
        }

        if let Err(e) = self.inner.store.clear_session() {
            warn!("Failed to clear the session store: {}", e);
        }
    }

    /// Records the session as active and spawns its watcher task.
    async fn arm_watcher(&self, record: SessionRecord, claim_published: bool) {
        let token = CancellationToken::new();
        {
            let mut active = self.inner.active.write().await;
            *active = Some(ActiveSession {
                record: record.clone(),
                watcher_token: token.clone(),
            });
        }

        if !self.coordinated(record.trial) {
            // Nothing to supervise: no countdown and no seat to defend.
            return;
        }

        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_watcher(record, claim_published, token).await;
        });
    }

    /// Supervises one session until it ends or is cancelled.
    ///
    /// Multiplexes every way a session can end involuntarily. The `biased`
    /// ordering makes the expiry deadline win over conflict detection when
    /// both are ready in the same iteration.
    async fn run_watcher(
        self,
        record: SessionRecord,
        mut claim_published: bool,
        token: CancellationToken,
    ) {
        let account = record.account_id.clone();
        let session_id = record.session_id.clone();

        let expiry = async {
            match record.deadline_ms() {
                Some(deadline) => {
                    let wait = deadline.saturating_sub(now_millis());
                    tokio::time::sleep(Duration::from_millis(wait)).await;
                }
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(expiry);

        let mut poll = tokio::time::interval(Duration::from_millis(
            self.inner.config.session.poll_interval_ms.max(1),
        ));
        let mut heartbeat = tokio::time::interval(Duration::from_millis(
            self.inner.config.session.heartbeat_interval_ms.max(1),
        ));
        // Both intervals fire immediately once created; consume that tick.
        poll.tick().await;
        heartbeat.tick().await;

        let mut watch = match self.inner.registry.watch_account(&account).await {
            Ok(watch) => Some(watch),
            Err(e) => {
                debug!("Seat watch unavailable, relying on the fallback poll: {}", e);
                None
            }
        };
        let mut signals = Some(self.inner.relay.subscribe());

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => {
                    debug!("Watcher for session {} cancelled", session_id);
                    return;
                }

                _ = &mut expiry => {
                    self.terminate(&session_id, Termination::Expired).await;
                    return;
                }

                change = async {
                    match watch.as_mut() {
                        Some(w) => w.next().await,
                        None => std::future::pending().await,
                    }
                } => {
                    match change {
                        Some(SeatChange::Claimed(claim)) if !claim.held_by(&session_id) => {
                            debug!(
                                "Seat for {} now claimed by session {}",
                                account, claim.session_id
                            );
                            self.terminate(&session_id, Termination::Replaced).await;
                            return;
                        }
                        // Our own claim echoed back.
                        Some(SeatChange::Claimed(_)) => {}
                        Some(SeatChange::Vacated) => {
                            if claim_published {
                                self.terminate(&session_id, Termination::Replaced).await;
                                return;
                            }
                        }
                        None => {
                            debug!("Seat watch stream ended, relying on the fallback poll");
                            watch = None;
                        }
                    }
                }

                signal = async {
                    match signals.as_mut() {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    match signal {
                        Ok(RelaySignal::ForceLogout { account_id, winner, .. }) => {
                            if account_id == account && winner != session_id {
                                self.terminate(&session_id, Termination::Replaced).await;
                                return;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!("Relay receiver lagged, skipped {} signals", missed);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            signals = None;
                        }
                    }
                }

                _ = heartbeat.tick() => {
                    match self.inner.registry.claim_for(&account).await {
                        Ok(Some(claim)) if claim.held_by(&session_id) => {
                            let refreshed = claim.refreshed(now_millis());
                            match self.inner.registry.publish(&refreshed).await {
                                Ok(()) => claim_published = true,
                                Err(e) => debug!("Heartbeat refresh not published: {}", e),
                            }
                        }
                        Ok(Some(_)) => {
                            self.terminate(&session_id, Termination::Replaced).await;
                            return;
                        }
                        Ok(None) if claim_published => {
                            // Our claim vanished underneath us.
                            self.terminate(&session_id, Termination::Replaced).await;
                            return;
                        }
                        Ok(None) => {
                            // A local-only login finally reaching the registry.
                            if self.publish_claim(&record).await {
                                claim_published = true;
                                info!("Published the deferred seat claim for {}", account);
                            }
                        }
                        Err(e) => debug!("Heartbeat skipped, registry unreachable: {}", e),
                    }
                }

                _ = poll.tick() => {
                    if watch.is_none() {
                        watch = self.inner.registry.watch_account(&account).await.ok();
                    }
                    match self.inner.registry.claim_for(&account).await {
                        Ok(Some(claim)) if !claim.held_by(&session_id) => {
                            self.terminate(&session_id, Termination::Replaced).await;
                            return;
                        }
                        Ok(None) if claim_published => {
                            self.terminate(&session_id, Termination::Replaced).await;
                            return;
                        }
                        Ok(_) => {}
                        Err(e) => debug!("Seat poll skipped, registry unreachable: {}", e),
                    }
                }
            }
        }
    }

    /// Ends the session `session_id` involuntarily.
    ///
    /// The take-under-lock keyed by session id makes this exactly-once: the
    /// first detection path claims the session, every later one finds nothing
    /// and returns. The corresponding event fires after cleanup.
    async fn terminate(&self, session_id: &SessionId, cause: Termination) {
        let _transition = self.inner.transitions.lock().await;
        let session = {
            let mut active = self.inner.active.write().await;
            match active.as_ref() {
                Some(current) if current.record.session_id == *session_id => active.take(),
                _ => None,
            }
        };
        let Some(session) = session else {
            // Already terminated through another path.
            return;
        };

        let event = match cause {
            Termination::Expired => SessionEvent::TrialExpired {
                account_id: session.record.account_id.clone(),
                session_id: session.record.session_id.clone(),
            },
            Termination::Replaced => SessionEvent::SessionReplaced {
                account_id: session.record.account_id.clone(),
                session_id: session.record.session_id.clone(),
            },
        };
        self.teardown(session, Some(event)).await;
    }

    /// Shared cleanup for logout and involuntary termination.
    async fn teardown(&self, session: ActiveSession, event: Option<SessionEvent>) {
        session.watcher_token.cancel();
        let record = session.record;
        let now = now_millis();

        // Release the seat, unless a newer login already owns it.
        match self.inner.registry.claim_for(&record.account_id).await {
            Ok(Some(claim)) if claim.held_by(&record.session_id) => {
                if let Err(e) = self.inner.registry.release(&record.account_id).await {
                    warn!("Failed to release the seat claim: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) => debug!("Seat release skipped, registry unreachable: {}", e),
        }

        // A freed trial seat starts the reuse cooldown. A replaced one does
        // not: the seat changed hands, and the winner's own logout will
        // stamp the release.
        let seat_freed = !matches!(event, Some(SessionEvent::SessionReplaced { .. }));
        if record.trial && seat_freed {
            if let Err(e) = self
                .inner
                .registry
                .mark_released(&record.account_id, now)
                .await
            {
                debug!("Release marker not written to the registry: {}", e);
            }
            if let Err(e) = self.inner.store.record_trial_end(&record.account_id, now) {
                warn!("Failed to record the trial end locally: {}", e);
            }
        }

        if let Err(e) = self.inner.store.clear_session() {
            warn!("Failed to clear the session store: {}", e);
        }

        match event {
            Some(event) => {
                let cause = match &event {
                    SessionEvent::TrialExpired { .. } => "trial expired",
                    SessionEvent::SessionReplaced { .. } => "replaced by a newer login",
                };
                info!(
                    "Session {} for {} ended: {}",
                    record.session_id, record.account_id, cause
                );
                let _ = self.inner.event_tx.send(event);
            }
            None => info!(
                "Logged out {} (session {})",
                record.account_id, record.session_id
            ),
        }
    }
}
