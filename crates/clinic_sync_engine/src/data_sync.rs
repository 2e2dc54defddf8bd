//! Orchestration of every registered entity sync.

use crate::clock::Clock;
use crate::config::{DataSyncConfig, SyncGroup};
use crate::error::{SyncError, SyncResult};
use crate::model_sync::ModelSync;
use crate::purge::PurgeOnSync;
use crate::resolver::{ErrorResolver, ResolvedError};
use crate::user::{User, UserSession};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{broadcast, watch, Mutex, Semaphore};
use tokio::task::JoinHandle;

const STREAM_CAPACITY: usize = 64;

/// Progress of one sync group within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncProgress {
    /// The group's syncs are running.
    Syncing,
    /// Every operation in the group succeeded.
    Success,
    /// At least one operation in the group failed.
    Failure,
}

/// A progress update for one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncGroupResult {
    /// The group.
    pub group: SyncGroup,
    /// Its progress.
    pub progress: SyncProgress,
}

/// The two halves of an entity sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    /// Upload local changes.
    Push,
    /// Download remote changes.
    Pull,
}

impl SyncOperation {
    fn run(self, sync: &dyn ModelSync) -> SyncResult<()> {
        match self {
            SyncOperation::Push => sync.push(),
            SyncOperation::Pull => sync.pull(),
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOperation::Push => f.write_str("push"),
            SyncOperation::Pull => f.write_str("pull"),
        }
    }
}

/// Outcome of one push or pull.
#[derive(Debug, Clone)]
pub struct SyncOperationResult {
    /// Name of the sync.
    pub sync: String,
    /// Which half ran.
    pub operation: SyncOperation,
    /// The classified failure, if any.
    pub result: Result<(), ResolvedError>,
}

/// Everything that happened in a round, in execution order.
///
/// Within a group every push precedes every pull, and each phase lists
/// syncs in registration order.
#[derive(Debug, Clone, Default)]
pub struct SyncRoundReport {
    /// Every attempted operation.
    pub results: Vec<SyncOperationResult>,
    /// Syncs skipped because the user may not sync.
    pub skipped: Vec<String>,
    /// Whether the post-round purge ran.
    pub purged: bool,
}

impl SyncRoundReport {
    /// Returns true if no operation failed.
    pub fn is_success(&self) -> bool {
        self.results.iter().all(|r| r.result.is_ok())
    }

    /// Failed operations, in execution order.
    pub fn failures(&self) -> impl Iterator<Item = &SyncOperationResult> {
        self.results.iter().filter(|r| r.result.is_err())
    }

    /// Classified errors, in execution order.
    pub fn errors(&self) -> Vec<ResolvedError> {
        self.failures()
            .filter_map(|r| r.result.as_ref().err().cloned())
            .collect()
    }

    fn extend(&mut self, other: SyncRoundReport) {
        self.results.extend(other.results);
        self.skipped.extend(other.skipped);
    }
}

/// What the sync indicator needs to know about the latest round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LastSyncedState {
    /// Progress of the most recently reported group.
    pub last_sync_progress: Option<SyncProgress>,
    /// When a group last finished successfully.
    pub last_sync_succeeded_at: Option<SystemTime>,
}

struct Inner {
    model_syncs: Vec<Arc<dyn ModelSync>>,
    user_session: Arc<dyn UserSession>,
    purge_on_sync: Arc<PurgeOnSync>,
    clock: Arc<dyn Clock>,
    workers: Arc<Semaphore>,
    round_lock: Arc<Mutex<()>>,
    progress: broadcast::Sender<SyncGroupResult>,
    errors: broadcast::Sender<ResolvedError>,
    last_synced: RwLock<LastSyncedState>,
}

/// Runs every registered [`ModelSync`] and reports the outcome.
///
/// Each push and pull is a blocking unit of work run on tokio's blocking
/// pool, at most `max_parallel_syncs` at a time. A failure in one operation
/// is classified and reported but never stops the others. Only one round
/// runs at a time.
///
/// Cloning is cheap; clones share the same syncs, streams and round lock.
#[derive(Clone)]
pub struct DataSync {
    inner: Arc<Inner>,
}

impl DataSync {
    /// Creates the orchestrator.
    pub fn new(
        model_syncs: Vec<Arc<dyn ModelSync>>,
        user_session: Arc<dyn UserSession>,
        purge_on_sync: Arc<PurgeOnSync>,
        clock: Arc<dyn Clock>,
        config: &DataSyncConfig,
    ) -> Self {
        let (progress, _) = broadcast::channel(STREAM_CAPACITY);
        let (errors, _) = broadcast::channel(STREAM_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                model_syncs,
                user_session,
                purge_on_sync,
                clock,
                workers: Arc::new(Semaphore::new(config.max_parallel_syncs.max(1))),
                round_lock: Arc::new(Mutex::new(())),
                progress,
                errors,
                last_synced: RwLock::new(LastSyncedState::default()),
            }),
        }
    }

    /// Subscribes to group progress updates.
    pub fn stream_sync_results(&self) -> broadcast::Receiver<SyncGroupResult> {
        self.inner.progress.subscribe()
    }

    /// Subscribes to classified sync errors.
    pub fn stream_sync_errors(&self) -> broadcast::Receiver<ResolvedError> {
        self.inner.errors.subscribe()
    }

    /// Returns the latest reported progress.
    pub fn last_synced_state(&self) -> LastSyncedState {
        *self.inner.last_synced.read()
    }

    /// Runs every group, then purges if the round fully succeeded.
    ///
    /// Waits for any round already in flight to finish first. Failures are
    /// reported on the streams and in the returned report, never returned
    /// as an error.
    pub async fn sync_the_world(&self) -> SyncRoundReport {
        let _round = self.inner.round_lock.lock().await;
        self.run_world().await
    }

    /// Runs a single group. Never purges.
    pub async fn sync_group(&self, group: SyncGroup) -> SyncRoundReport {
        let _round = self.inner.round_lock.lock().await;
        self.run_group(group).await
    }

    /// Starts a full round in the background without waiting for it.
    ///
    /// Returns `None` without starting anything if a round is in flight.
    /// Must be called from within a tokio runtime.
    pub fn fire_and_forget_sync(&self) -> Option<JoinHandle<SyncRoundReport>> {
        let Ok(round) = Arc::clone(&self.inner.round_lock).try_lock_owned() else {
            tracing::debug!("sync round already in flight, ignoring trigger");
            return None;
        };

        let this = self.clone();
        Some(tokio::spawn(async move {
            let _round = round;
            this.run_world().await
        }))
    }

    /// Starts a single-group round in the background without waiting for it.
    ///
    /// Returns `None` without starting anything if a round is in flight.
    pub fn fire_and_forget_sync_group(
        &self,
        group: SyncGroup,
    ) -> Option<JoinHandle<SyncRoundReport>> {
        let Ok(round) = Arc::clone(&self.inner.round_lock).try_lock_owned() else {
            tracing::debug!(group = ?group, "sync round already in flight, ignoring trigger");
            return None;
        };

        let this = self.clone();
        Some(tokio::spawn(async move {
            let _round = round;
            this.run_group(group).await
        }))
    }

    /// Triggers a full round every time the watched user becomes able to sync.
    ///
    /// A round already in flight may have skipped the approval-gated syncs,
    /// so the triggered round queues behind it instead of being dropped.
    pub fn sync_on_approval(&self, mut user: watch::Receiver<Option<User>>) -> JoinHandle<()> {
        let this = self.clone();
        let mut could_sync = user.borrow_and_update().as_ref().is_some_and(User::can_sync_data);
        tokio::spawn(async move {
            while user.changed().await.is_ok() {
                let can_sync = user.borrow_and_update().as_ref().is_some_and(User::can_sync_data);
                if can_sync && !could_sync {
                    tracing::info!("user approved for syncing, starting sync");
                    let this = this.clone();
                    tokio::spawn(async move { this.sync_the_world().await });
                }
                could_sync = can_sync;
            }
        })
    }

    async fn run_world(&self) -> SyncRoundReport {
        tracing::info!("sync round started");
        let mut report = SyncRoundReport::default();
        for group in SyncGroup::ALL {
            report.extend(self.run_group(group).await);
        }

        if report.is_success() && self.inner.user_session.is_user_present_locally() {
            report.purged = self.purge().await;
        }

        tracing::info!(
            success = report.is_success(),
            operations = report.results.len(),
            skipped = report.skipped.len(),
            purged = report.purged,
            "sync round finished"
        );
        report
    }

    async fn run_group(&self, group: SyncGroup) -> SyncRoundReport {
        self.emit_progress(group, SyncProgress::Syncing);

        let user = self.inner.user_session.logged_in_user();
        let mut eligible = Vec::new();
        let mut skipped = Vec::new();
        for sync in self
            .inner
            .model_syncs
            .iter()
            .filter(|sync| sync.sync_config().sync_group == group)
        {
            if should_sync_be_run(sync.as_ref(), user.as_ref()) {
                eligible.push(Arc::clone(sync));
            } else {
                tracing::debug!(sync = sync.name(), "user cannot sync, skipping");
                skipped.push(sync.name().to_string());
            }
        }

        let mut results = self.run_operations(&eligible, SyncOperation::Push).await;
        results.extend(self.run_operations(&eligible, SyncOperation::Pull).await);

        let report = SyncRoundReport {
            results,
            skipped,
            purged: false,
        };

        if report.is_success() {
            self.emit_progress(group, SyncProgress::Success);
        } else {
            self.emit_progress(group, SyncProgress::Failure);
            for error in report.errors() {
                let _ = self.inner.errors.send(error);
            }
        }
        report
    }

    async fn run_operations(
        &self,
        syncs: &[Arc<dyn ModelSync>],
        operation: SyncOperation,
    ) -> Vec<SyncOperationResult> {
        let mut handles = Vec::with_capacity(syncs.len());
        for sync in syncs {
            // The semaphore is never closed
            let permit = Arc::clone(&self.inner.workers).acquire_owned().await.ok();
            let sync = Arc::clone(sync);
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                operation.run(sync.as_ref())
            }));
        }

        let mut results = Vec::with_capacity(syncs.len());
        for (sync, handle) in syncs.iter().zip(handles) {
            let outcome = handle.await.unwrap_or_else(|join_error| {
                Err(SyncError::Unexpected(format!(
                    "{operation} for {} did not complete: {join_error}",
                    sync.name()
                )))
            });

            let result = outcome.map_err(ErrorResolver::resolve);
            if let Err(error) = &result {
                log_error(sync.name(), operation, error);
            }
            results.push(SyncOperationResult {
                sync: sync.name().to_string(),
                operation,
                result,
            });
        }
        results
    }

    async fn purge(&self) -> bool {
        let purge_on_sync = Arc::clone(&self.inner.purge_on_sync);
        match tokio::task::spawn_blocking(move || purge_on_sync.purge_unused_data()).await {
            Ok(Ok(purged)) => purged,
            Ok(Err(error)) => {
                tracing::error!(error = %error, "purge failed");
                false
            }
            Err(join_error) => {
                tracing::error!(error = %join_error, "purge did not complete");
                false
            }
        }
    }

    fn emit_progress(&self, group: SyncGroup, progress: SyncProgress) {
        {
            let mut state = self.inner.last_synced.write();
            state.last_sync_progress = Some(progress);
            if progress == SyncProgress::Success {
                state.last_sync_succeeded_at = Some(self.inner.clock.now());
            }
        }
        let _ = self.inner.progress.send(SyncGroupResult { group, progress });
    }
}

fn should_sync_be_run(sync: &dyn ModelSync, user: Option<&User>) -> bool {
    if sync.requires_sync_approved_user() {
        user.is_some_and(User::can_sync_data)
    } else {
        true
    }
}

fn log_error(sync: &str, operation: SyncOperation, error: &ResolvedError) {
    if error.is_reportable() {
        tracing::error!(
            sync,
            operation = %operation,
            kind = error.kind(),
            error = %error.actual_cause(),
            "sync failed"
        );
    } else {
        tracing::warn!(
            sync,
            operation = %operation,
            kind = error.kind(),
            error = %error.actual_cause(),
            "sync failed"
        );
    }
}
