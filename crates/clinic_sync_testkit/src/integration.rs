//! Cross-module integration test helpers.
//!
//! Wires a [`DataSync`] to in-memory collaborators so tests can drive whole
//! rounds and inspect what happened.

use crate::fixtures::{approved_user, CountingPurgeStorage, FakeUserSession};
use clinic_sync_engine::{
    DataSync, DataSyncConfig, EntitySync, MemoryPreferences, MemoryRepository, MockTransport,
    ModelSync, PurgeOnSync, SyncRecord, SyncedEntity, TestClock, User,
};
use std::sync::Arc;

/// A test harness for orchestrator-level testing.
pub struct SyncHarness {
    /// The orchestrator under test.
    pub data_sync: DataSync,
    /// The session the orchestrator consults.
    pub session: Arc<FakeUserSession>,
    /// Purge call counter.
    pub purge_storage: Arc<CountingPurgeStorage>,
    /// Purge policy, for recording sync-group switches.
    pub purge_on_sync: Arc<PurgeOnSync>,
    /// Controllable time.
    pub clock: Arc<TestClock>,
}

impl SyncHarness {
    /// Creates a harness with an approved user and default configuration.
    pub fn new(model_syncs: Vec<Arc<dyn ModelSync>>) -> Self {
        Self::with_user(model_syncs, Some(approved_user()), DataSyncConfig::default())
    }

    /// Creates a harness with a specific user and configuration.
    pub fn with_user(
        model_syncs: Vec<Arc<dyn ModelSync>>,
        user: Option<User>,
        config: DataSyncConfig,
    ) -> Self {
        let session = Arc::new(FakeUserSession::new(user));
        let purge_storage = Arc::new(CountingPurgeStorage::default());
        let clock = Arc::new(TestClock::default());
        let purge_on_sync = Arc::new(PurgeOnSync::new(
            purge_storage.clone(),
            Arc::new(MemoryPreferences::new()),
            config.delay_purge_after_switch,
            clock.clone(),
        ));
        let data_sync = DataSync::new(
            model_syncs,
            session.clone(),
            purge_on_sync.clone(),
            clock.clone(),
            &config,
        );

        Self {
            data_sync,
            session,
            purge_storage,
            purge_on_sync,
            clock,
        }
    }
}

/// One entity's in-memory storage and scripted server.
pub struct EntityFixture<R: SyncRecord> {
    /// Local storage.
    pub repository: Arc<MemoryRepository<R>>,
    /// Scripted server.
    pub transport: Arc<MockTransport<R, R>>,
    /// The adapter binding them.
    pub sync: Arc<EntitySync<R, R>>,
}

impl<R: SyncRecord + 'static> EntityFixture<R> {
    /// Creates an entity sync backed by memory.
    pub fn new(
        entity: SyncedEntity,
        preferences: Arc<MemoryPreferences>,
        session: Arc<FakeUserSession>,
        batch_size: u32,
    ) -> Self {
        let repository = Arc::new(MemoryRepository::new());
        let transport = Arc::new(MockTransport::new());
        let sync = EntitySync::new(
            entity,
            repository.clone(),
            transport.clone(),
            preferences,
            session,
        );
        let config = entity.default_config().with_batch_size(batch_size);

        Self {
            repository,
            transport,
            sync: Arc::new(sync.with_config(config)),
        }
    }

    /// The adapter as a registrable sync.
    pub fn model_sync(&self) -> Arc<dyn ModelSync> {
        self.sync.clone()
    }
}
