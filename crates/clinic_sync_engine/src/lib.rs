//! # Clinic Sync Engine
//!
//! Offline-first record synchronization for the clinic app.
//!
//! This crate provides:
//! - Batched push of pending local records with per-record validation handling
//! - Cursor-based paginated pull that never overwrites unsynced local edits
//! - Per-entity sync adapters and the orchestrator that runs them
//! - Error classification for logging and user-facing reporting
//! - Post-sync purge of data outside the facility's sync group
//! - Periodic scheduling with exponential backoff
//! - HTTP transport abstraction
//!
//! ## Architecture
//!
//! Every entity type pushes and pulls through the same coordinator:
//! 1. Push: read pending records in batches, upload, mark accepted records
//!    `DONE` and rejected ones `INVALID`
//! 2. Pull: request pages after the saved cursor, merge into local storage,
//!    then advance the cursor
//!
//! [`DataSync`] runs all pushes of a group, then all pulls, collecting every
//! failure instead of stopping at the first.
//!
//! ## Key Invariants
//!
//! - A `PENDING` local record is never overwritten by a pulled copy
//! - The pull cursor only advances after its page is stored
//! - Records are marked `DONE` only after the server accepted them
//! - One failing entity never stops the others

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod coordinator;
mod data_sync;
mod error;
mod http;
mod model_sync;
mod preferences;
mod purge;
mod repository;
mod resolver;
mod scheduler;
mod transport;
mod user;

pub use clinic_sync_protocol::{DataPullResponse, DataPushResponse, SyncStatus, ValidationErrors};
pub use clock::{Clock, SystemClock, TestClock};
pub use config::{BatchSize, DataSyncConfig, RetryConfig, SyncConfig, SyncGroup, SyncInterval};
pub use coordinator::{PullOutcome, PushOutcome, SyncCoordinator};
pub use data_sync::{
    DataSync, LastSyncedState, SyncGroupResult, SyncOperation, SyncOperationResult,
    SyncProgress, SyncRoundReport,
};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpResponse, HttpTransport};
pub use model_sync::{EntitySync, ModelSync, SyncedEntity};
pub use preferences::{
    FilePreferences, MemoryPreferences, Preference, Preferences, PullToken, SyncGroupSwitchedAt,
    FACILITY_SYNC_GROUP_SWITCHED_AT,
};
pub use purge::{PurgeOnSync, PurgeStorage};
pub use repository::{MemoryRepository, SyncRecord, SynceableRepository};
pub use resolver::{ErrorResolver, ResolvedError};
pub use scheduler::{SchedulerHandle, SyncScheduler};
pub use transport::{MockTransport, SyncTransport};
pub use user::{LoggedInStatus, User, UserSession, UserStatus};
