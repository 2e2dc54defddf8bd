//! # Clinic Sync Protocol
//!
//! Data types shared by the sync engine and its transports.
//!
//! This crate provides:
//! - `SyncStatus`, the reconciliation state of every synced record
//! - `ValidationErrors` for per-record server rejections
//! - `DataPushResponse` and `DataPullResponse` exchanged with the server
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod messages;
mod status;

pub use messages::{DataPullResponse, DataPushResponse, ValidationErrors};
pub use status::{SyncStatus, UnknownSyncStatus, LEGACY_IN_FLIGHT};
