//! Per-entity sync adapters.

use crate::config::SyncConfig;
use crate::coordinator::SyncCoordinator;
use crate::error::SyncResult;
use crate::preferences::{Preferences, PullToken};
use crate::repository::{SyncRecord, SynceableRepository};
use crate::transport::SyncTransport;
use crate::user::UserSession;
use std::fmt;
use std::sync::Arc;

/// One entity type's push and pull, as seen by the orchestrator.
///
/// `push` and `pull` are independent: the orchestrator calls them as
/// separate operations and a failure in one never prevents the other.
pub trait ModelSync: Send + Sync {
    /// Name used in logs and round reports.
    fn name(&self) -> &str;

    /// Returns true if this sync must only run for a logged-in, approved user.
    fn requires_sync_approved_user(&self) -> bool;

    /// The entity's sync configuration.
    fn sync_config(&self) -> &SyncConfig;

    /// Uploads local changes.
    fn push(&self) -> SyncResult<()>;

    /// Downloads remote changes since the last cursor.
    fn pull(&self) -> SyncResult<()>;
}

/// The entity types the clinic app syncs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncedEntity {
    /// Patient profiles, addresses and phone numbers.
    Patient,
    /// Blood pressure readings.
    BloodPressure,
    /// Prescribed drugs.
    Prescription,
    /// Follow-up appointments.
    Appointment,
    /// Medical history answers.
    MedicalHistory,
    /// Facilities (reference data).
    Facility,
    /// Treatment protocols (reference data).
    Protocol,
}

impl SyncedEntity {
    /// Every entity, in registration order.
    pub const ALL: [SyncedEntity; 7] = [
        SyncedEntity::Patient,
        SyncedEntity::BloodPressure,
        SyncedEntity::Prescription,
        SyncedEntity::Appointment,
        SyncedEntity::MedicalHistory,
        SyncedEntity::Facility,
        SyncedEntity::Protocol,
    ];

    /// Sync name.
    pub fn name(&self) -> &'static str {
        match self {
            SyncedEntity::Patient => "patient",
            SyncedEntity::BloodPressure => "blood_pressure",
            SyncedEntity::Prescription => "prescription",
            SyncedEntity::Appointment => "appointment",
            SyncedEntity::MedicalHistory => "medical_history",
            SyncedEntity::Facility => "facility",
            SyncedEntity::Protocol => "protocol",
        }
    }

    /// Server resource path segment and JSON collection key.
    pub fn resource(&self) -> &'static str {
        match self {
            SyncedEntity::Patient => "patients",
            SyncedEntity::BloodPressure => "blood_pressures",
            SyncedEntity::Prescription => "prescription_drugs",
            SyncedEntity::Appointment => "appointments",
            SyncedEntity::MedicalHistory => "medical_histories",
            SyncedEntity::Facility => "facilities",
            SyncedEntity::Protocol => "protocols",
        }
    }

    /// Clinical data needs an approved user; reference data does not.
    pub fn requires_sync_approved_user(&self) -> bool {
        !self.is_reference_data()
    }

    /// Reference data is pull-only.
    pub fn supports_push(&self) -> bool {
        !self.is_reference_data()
    }

    /// Preference key of the entity's pull cursor.
    pub fn last_pull_token_key(&self) -> String {
        format!("last_{}_pull_token", self.name())
    }

    /// The configuration used when none is supplied.
    pub fn default_config(&self) -> SyncConfig {
        if self.is_reference_data() {
            SyncConfig::daily()
        } else {
            SyncConfig::frequent()
        }
    }

    fn is_reference_data(&self) -> bool {
        matches!(self, SyncedEntity::Facility | SyncedEntity::Protocol)
    }
}

impl fmt::Display for SyncedEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Binds an entity's repository, transport, cursor and config to the coordinator.
pub struct EntitySync<T, P> {
    entity: SyncedEntity,
    coordinator: SyncCoordinator,
    repository: Arc<dyn SynceableRepository<T, P>>,
    transport: Arc<dyn SyncTransport<T, P>>,
    last_pull_token: PullToken,
    config: SyncConfig,
    user_session: Arc<dyn UserSession>,
}

impl<T: SyncRecord, P> EntitySync<T, P> {
    /// Creates the sync for `entity` with its default configuration.
    pub fn new(
        entity: SyncedEntity,
        repository: Arc<dyn SynceableRepository<T, P>>,
        transport: Arc<dyn SyncTransport<T, P>>,
        preferences: Arc<dyn Preferences>,
        user_session: Arc<dyn UserSession>,
    ) -> Self {
        Self {
            entity,
            coordinator: SyncCoordinator::new(),
            repository,
            transport,
            last_pull_token: PullToken::new(preferences, entity.last_pull_token_key()),
            config: entity.default_config(),
            user_session,
        }
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// The entity this sync handles.
    pub fn entity(&self) -> SyncedEntity {
        self.entity
    }

    /// The entity's pull cursor.
    pub fn last_pull_token(&self) -> &PullToken {
        &self.last_pull_token
    }
}

impl<T, P> ModelSync for EntitySync<T, P>
where
    T: SyncRecord,
    P: Send + Sync,
{
    fn name(&self) -> &str {
        self.entity.name()
    }

    fn requires_sync_approved_user(&self) -> bool {
        self.entity.requires_sync_approved_user()
    }

    fn sync_config(&self) -> &SyncConfig {
        &self.config
    }

    fn push(&self) -> SyncResult<()> {
        if !self.entity.supports_push() {
            return Ok(());
        }
        if !self.user_session.can_sync_data() {
            tracing::debug!(sync = self.name(), "user cannot sync, skipping push");
            return Ok(());
        }

        let outcome = self.coordinator.push(
            self.repository.as_ref(),
            self.config.push_batch_size,
            |records| self.transport.push(records),
        )?;

        tracing::debug!(
            sync = self.name(),
            accepted = outcome.accepted,
            rejected = outcome.rejected.len(),
            batches = outcome.batches,
            "push finished"
        );
        Ok(())
    }

    fn pull(&self) -> SyncResult<()> {
        let outcome = self.coordinator.pull(
            self.repository.as_ref(),
            &self.last_pull_token,
            self.config.pull_batch_size,
            |token, limit| self.transport.pull(token, limit),
        )?;

        tracing::debug!(
            sync = self.name(),
            received = outcome.received,
            pages = outcome.pages,
            "pull finished"
        );
        Ok(())
    }
}
