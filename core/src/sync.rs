//! Remote sync coordinator.
//!
//! Every store mutation hands the coordinator a snapshot. The snapshot is
//! written locally straight away; the remote upload waits for a quiet period
//! so a burst of edits becomes a single network write carrying the latest
//! snapshot.
//!
//! ```text
//! Idle --schedule--> Pending --quiet period--> Syncing --ok--> Idle
//!                      ^  |                       |
//!                      +--+ (re-armed)            +--err--> Retrying --delay--> Syncing
//!                                                 +--retries exhausted--> Failed
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::SyncError;
use crate::models::{CalcState, StateDocument};
use crate::storage::LocalStore;

/// Remote document storage, one document per user.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// `Ok(None)` when the user has no document yet.
    async fn fetch(&self, uid: &str) -> Result<Option<StateDocument>>;

    /// Overwrite the user's document wholesale.
    async fn upload(&self, uid: &str, doc: &StateDocument) -> Result<()>;
}

/// Fire-and-forget user notifications.
pub trait Notifier: Send + Sync {
    fn notify_success(&self, message: &str);
    fn notify_error(&self, message: &str);
}

pub const SYNC_SUCCESS_MESSAGE: &str = "Data synced";
pub const SYNC_FAILURE_MESSAGE: &str = "Failed to sync your data. Changes are saved on this device.";
pub const FETCH_FAILURE_MESSAGE: &str = "Failed to load your data from the server.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Quiet period before a scheduled upload fires.
    pub debounce: Duration,
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Delay before retry `n` (counted from 0) is `backoff_base * 2^n`.
    pub backoff_base: Duration,
    /// Repeat success notices inside this window are suppressed.
    pub success_notice_window: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1000),
            max_retries: 3,
            backoff_base: Duration::from_millis(1000),
            success_notice_window: Duration::from_secs(5),
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `TDEE_SYNC_DEBOUNCE_MS`, `TDEE_SYNC_MAX_RETRIES`
    /// and `TDEE_SYNC_BACKOFF_MS`.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            debounce: env_millis("TDEE_SYNC_DEBOUNCE_MS").unwrap_or(defaults.debounce),
            max_retries: std::env::var("TDEE_SYNC_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_retries),
            backoff_base: env_millis("TDEE_SYNC_BACKOFF_MS").unwrap_or(defaults.backoff_base),
            ..defaults
        }
    }

    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

fn env_millis(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    /// A debounce timer is armed.
    Pending,
    Syncing,
    /// Waiting out the backoff before retry number `attempt`.
    Retrying { attempt: u32 },
    /// The last upload exhausted its retries.
    Failed,
}

impl SyncStatus {
    #[must_use]
    pub fn is_syncing(self) -> bool {
        matches!(self, SyncStatus::Syncing | SyncStatus::Retrying { .. })
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Idle => write!(f, "idle"),
            SyncStatus::Pending => write!(f, "pending"),
            SyncStatus::Syncing => write!(f, "syncing"),
            SyncStatus::Retrying { attempt } => write!(f, "retrying ({attempt})"),
            SyncStatus::Failed => write!(f, "failed"),
        }
    }
}

struct PendingUpload {
    generation: u64,
    uid: String,
    snapshot: Arc<CalcState>,
    timer: JoinHandle<()>,
}

struct CoordinatorState {
    generation: u64,
    pending: Option<PendingUpload>,
    in_flight: usize,
    upload_phase: SyncStatus,
    last_outcome: SyncStatus,
    last_success_notice: Option<Instant>,
    disposed: bool,
}

impl CoordinatorState {
    fn take_pending(&mut self, generation: Option<u64>) -> Option<PendingUpload> {
        match self.pending.take() {
            Some(p) if generation.is_none_or(|g| g == p.generation) => Some(p),
            other => {
                self.pending = other;
                None
            }
        }
    }

    fn status(&self) -> SyncStatus {
        if self.in_flight > 0 {
            self.upload_phase
        } else if self.pending.is_some() {
            SyncStatus::Pending
        } else {
            self.last_outcome
        }
    }
}

struct Shared {
    remote: Arc<dyn RemoteStore>,
    notifier: Arc<dyn Notifier>,
    config: SyncConfig,
    state: Mutex<CoordinatorState>,
    status: watch::Sender<SyncStatus>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &CoordinatorState) {
        self.status.send_replace(state.status());
    }

    /// Take the pending upload (only if it still belongs to `generation`)
    /// and mark it in flight under the same lock, so status goes straight
    /// from `Pending` to `Syncing`.
    fn claim_pending(&self, generation: Option<u64>) -> Option<PendingUpload> {
        let mut st = self.lock();
        let pending = st.take_pending(generation)?;
        st.in_flight += 1;
        st.upload_phase = SyncStatus::Syncing;
        self.publish(&st);
        Some(pending)
    }

    fn discard_pending(&self) -> Option<PendingUpload> {
        let mut st = self.lock();
        let pending = st.take_pending(None)?;
        self.publish(&st);
        Some(pending)
    }

    fn set_phase(&self, phase: SyncStatus) {
        let mut st = self.lock();
        st.upload_phase = phase;
        self.publish(&st);
    }

    /// Upload a claimed snapshot. `claim_pending` has already counted it as
    /// in flight; `finish_upload` releases it.
    async fn upload_with_retry(&self, uid: &str, snapshot: &CalcState) -> Result<(), SyncError> {
        let doc = StateDocument::from(snapshot);

        let mut attempt: u32 = 0;
        let result = loop {
            match self.remote.upload(uid, &doc).await {
                Ok(()) => break Ok(()),
                Err(e) if attempt < self.config.max_retries => {
                    let delay = self.config.backoff_delay(attempt);
                    attempt += 1;
                    tracing::warn!(
                        uid,
                        attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %format!("{e:#}"),
                        "remote sync failed, retrying"
                    );
                    self.set_phase(SyncStatus::Retrying { attempt });
                    tokio::time::sleep(delay).await;
                    self.set_phase(SyncStatus::Syncing);
                }
                Err(e) => {
                    break Err(SyncError::RemoteSync {
                        attempts: attempt + 1,
                        source: e,
                    });
                }
            }
        };

        self.finish_upload(uid, &result);
        result
    }

    fn finish_upload(&self, uid: &str, result: &Result<(), SyncError>) {
        let notify_success = {
            let mut st = self.lock();
            st.in_flight = st.in_flight.saturating_sub(1);
            let notify = match result {
                Ok(()) => {
                    st.last_outcome = SyncStatus::Idle;
                    let now = Instant::now();
                    let quiet = st.last_success_notice.is_none_or(|last| {
                        now.duration_since(last) >= self.config.success_notice_window
                    });
                    if quiet {
                        st.last_success_notice = Some(now);
                    }
                    quiet
                }
                Err(_) => {
                    st.last_outcome = SyncStatus::Failed;
                    false
                }
            };
            self.publish(&st);
            notify
        };

        match result {
            Ok(()) => {
                tracing::debug!(uid, "remote sync complete");
                if notify_success {
                    self.notifier.notify_success(SYNC_SUCCESS_MESSAGE);
                }
            }
            Err(e) => {
                tracing::error!(uid, error = %e, "remote sync gave up");
                self.notifier.notify_error(SYNC_FAILURE_MESSAGE);
            }
        }
    }
}

/// Owns the debounce timer, retry loop and notification throttle for one
/// store. Dropping the coordinator cancels a pending (not yet fired) upload.
pub struct SyncCoordinator {
    shared: Arc<Shared>,
    local: Arc<LocalStore>,
    rt: Handle,
}

impl SyncCoordinator {
    /// Must be called from within a tokio runtime; timers and uploads run on
    /// that runtime.
    pub fn new(
        local: Arc<LocalStore>,
        remote: Arc<dyn RemoteStore>,
        notifier: Arc<dyn Notifier>,
        config: SyncConfig,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus::Idle);
        let shared = Arc::new(Shared {
            remote,
            notifier,
            config,
            state: Mutex::new(CoordinatorState {
                generation: 0,
                pending: None,
                in_flight: 0,
                upload_phase: SyncStatus::Syncing,
                last_outcome: SyncStatus::Idle,
                last_success_notice: None,
                disposed: false,
            }),
            status,
        });
        Self {
            shared,
            local,
            rt: Handle::current(),
        }
    }

    #[must_use]
    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    #[must_use]
    pub fn status(&self) -> SyncStatus {
        *self.shared.status.borrow()
    }

    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.status().is_syncing()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.shared.status.subscribe()
    }

    /// Persist `snapshot` locally now and (re)arm the remote upload timer.
    ///
    /// The user is resolved here and travels with the snapshot, so a later
    /// identity switch cannot redirect this upload.
    pub fn schedule(&self, snapshot: Arc<CalcState>) {
        let uid = self.local.identity().current_user();
        self.local.save_for(uid.as_deref(), &snapshot);

        let Some(uid) = uid else {
            tracing::debug!("guest session, skipping remote sync");
            return;
        };

        let mut st = self.shared.lock();
        if st.disposed {
            return;
        }
        if let Some(previous) = st.pending.take() {
            previous.timer.abort();
        }
        st.generation += 1;
        let generation = st.generation;

        let shared = Arc::clone(&self.shared);
        let timer = self.rt.spawn(async move {
            tokio::time::sleep(shared.config.debounce).await;
            if let Some(pending) = shared.claim_pending(Some(generation)) {
                // Failures are already logged and notified.
                let _ = shared
                    .upload_with_retry(&pending.uid, &pending.snapshot)
                    .await;
            }
        });

        st.pending = Some(PendingUpload {
            generation,
            uid,
            snapshot,
            timer,
        });
        self.shared.publish(&st);
    }

    /// Run the pending upload now instead of waiting for the timer, then
    /// wait for every in-flight upload to finish.
    ///
    /// Returns `Ok(false)` when nothing was pending.
    pub async fn flush(&self) -> Result<bool, SyncError> {
        let mut rx = self.subscribe();
        let result = match self.shared.claim_pending(None) {
            Some(pending) => {
                pending.timer.abort();
                self.shared
                    .upload_with_retry(&pending.uid, &pending.snapshot)
                    .await
                    .map(|()| true)
            }
            None => Ok(false),
        };

        while self.shared.lock().in_flight > 0 {
            if rx.changed().await.is_err() {
                break;
            }
        }
        result
    }

    /// Fetch and validate the user's remote document. Failures are surfaced
    /// through the notifier and returned; there is no automatic retry.
    pub async fn fetch(&self, uid: &str) -> Result<Option<CalcState>, SyncError> {
        let result = match self.shared.remote.fetch(uid).await {
            Ok(Some(doc)) => doc.into_state().map(Some).map_err(SyncError::InvalidDocument),
            Ok(None) => Ok(None),
            Err(source) => Err(SyncError::RemoteFetch {
                uid: uid.to_string(),
                source,
            }),
        };
        if let Err(e) = &result {
            tracing::error!(uid, error = %e, "remote fetch failed");
            self.shared.notifier.notify_error(FETCH_FAILURE_MESSAGE);
        }
        result
    }

    /// Cancel the pending timer, if any, dropping its upload. In-flight
    /// uploads keep running.
    pub fn cancel_pending(&self) {
        if let Some(pending) = self.shared.discard_pending() {
            pending.timer.abort();
            tracing::debug!(uid = %pending.uid, "cancelled pending remote sync");
        }
    }

    /// End of life: cancel the pending timer and refuse new ones.
    pub fn dispose(&self) {
        self.cancel_pending();
        let mut st = self.shared.lock();
        st.disposed = true;
        self.shared.publish(&st);
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.dispose();
    }
}
