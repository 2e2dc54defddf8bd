//! Test fixtures for records, users and syncs.
//!
//! Provides convenience types for setting up sync scenarios without a
//! real database or network.

use clinic_sync_engine::{
    LoggedInStatus, ModelSync, PurgeStorage, SyncConfig, SyncError, SyncRecord, SyncResult,
    SyncStatus, User, UserSession, UserStatus,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// A minimal syncable record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRecord {
    /// Record identifier.
    pub uuid: Uuid,
    /// Payload that tests change to tell copies apart.
    pub body: String,
    /// Sync status.
    pub sync_status: SyncStatus,
}

impl TestRecord {
    /// Creates a record with a fresh identifier.
    pub fn new(body: impl Into<String>, sync_status: SyncStatus) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            body: body.into(),
            sync_status,
        }
    }

    /// A locally edited record waiting to be pushed.
    pub fn pending(body: impl Into<String>) -> Self {
        Self::new(body, SyncStatus::Pending)
    }

    /// A record in sync with the server.
    pub fn done(body: impl Into<String>) -> Self {
        Self::new(body, SyncStatus::Done)
    }

    /// Returns a copy with a different body, as a server edit would produce.
    pub fn edited(&self, body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..self.clone()
        }
    }
}

impl SyncRecord for TestRecord {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    fn sync_status(&self) -> SyncStatus {
        self.sync_status
    }

    fn with_sync_status(self, sync_status: SyncStatus) -> Self {
        Self {
            sync_status,
            ..self
        }
    }
}

/// Creates a user with the given login and approval state.
pub fn user(logged_in_status: LoggedInStatus, status: UserStatus) -> User {
    User {
        uuid: Uuid::new_v4(),
        full_name: "Test Nurse".into(),
        logged_in_status,
        status,
        current_facility_uuid: Uuid::new_v4(),
    }
}

/// A logged-in user approved for syncing.
pub fn approved_user() -> User {
    user(LoggedInStatus::LoggedIn, UserStatus::ApprovedForSyncing)
}

/// Every login state.
pub const ALL_LOGGED_IN_STATUSES: [LoggedInStatus; 5] = [
    LoggedInStatus::OtpRequested,
    LoggedInStatus::LoggedIn,
    LoggedInStatus::ResettingPin,
    LoggedInStatus::ResetPinRequested,
    LoggedInStatus::Unauthorized,
];

/// Every approval state.
pub const ALL_USER_STATUSES: [UserStatus; 3] = [
    UserStatus::WaitingForApproval,
    UserStatus::ApprovedForSyncing,
    UserStatus::DisapprovedForSyncing,
];

/// A session whose user can be swapped during a test.
#[derive(Default)]
pub struct FakeUserSession {
    user: RwLock<Option<User>>,
}

impl FakeUserSession {
    /// Creates a session with the given user.
    pub fn new(user: Option<User>) -> Self {
        Self {
            user: RwLock::new(user),
        }
    }

    /// Replaces the stored user.
    pub fn set_user(&self, user: Option<User>) {
        *self.user.write() = user;
    }
}

impl UserSession for FakeUserSession {
    fn logged_in_user(&self) -> Option<User> {
        self.user.read().clone()
    }
}

/// Purge storage that only counts calls.
#[derive(Default)]
pub struct CountingPurgeStorage {
    calls: AtomicUsize,
}

impl CountingPurgeStorage {
    /// Number of purges performed.
    pub fn purge_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PurgeStorage for CountingPurgeStorage {
    fn purge_unused_data(&self) -> SyncResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Shared, ordered log of `"<sync>:<operation>"` entries.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Builds the error a scripted sync returns.
pub type ErrorFactory = Arc<dyn Fn() -> SyncError + Send + Sync>;

/// A [`ModelSync`] whose push and pull results are scripted.
pub struct ScriptedSync {
    name: String,
    requires_sync_approved_user: bool,
    config: SyncConfig,
    push_error: Option<ErrorFactory>,
    pull_error: Option<ErrorFactory>,
    log: CallLog,
}

impl ScriptedSync {
    /// A sync in the frequent group that succeeds and needs no approved user.
    pub fn new(name: impl Into<String>, log: CallLog) -> Self {
        Self {
            name: name.into(),
            requires_sync_approved_user: false,
            config: SyncConfig::frequent(),
            push_error: None,
            pull_error: None,
            log,
        }
    }

    /// Sets whether an approved user is required.
    pub fn requiring_approved_user(mut self, required: bool) -> Self {
        self.requires_sync_approved_user = required;
        self
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Makes every push fail.
    pub fn failing_push(mut self, error: impl Fn() -> SyncError + Send + Sync + 'static) -> Self {
        self.push_error = Some(Arc::new(error));
        self
    }

    /// Makes every pull fail.
    pub fn failing_pull(mut self, error: impl Fn() -> SyncError + Send + Sync + 'static) -> Self {
        self.pull_error = Some(Arc::new(error));
        self
    }

    /// Wraps the sync for registration.
    pub fn shared(self) -> Arc<dyn ModelSync> {
        Arc::new(self)
    }

    fn record(&self, operation: &str, error: &Option<ErrorFactory>) -> SyncResult<()> {
        self.log.lock().push(format!("{}:{operation}", self.name));
        match error {
            Some(make) => Err(make()),
            None => Ok(()),
        }
    }
}

impl ModelSync for ScriptedSync {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires_sync_approved_user(&self) -> bool {
        self.requires_sync_approved_user
    }

    fn sync_config(&self) -> &SyncConfig {
        &self.config
    }

    fn push(&self) -> SyncResult<()> {
        self.record("push", &self.push_error)
    }

    fn pull(&self) -> SyncResult<()> {
        self.record("pull", &self.pull_error)
    }
}

/// Creates an empty call log.
pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}
