//! # Clinic Sync Testkit
//!
//! Test utilities for the clinic sync engine.
//!
//! This crate provides:
//! - Record, user and scripted-sync fixtures
//! - Property-based test generators using proptest
//! - An orchestrator harness wired to in-memory collaborators
//!
//! ## Usage
//!
//! ```rust,ignore
//! use clinic_sync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn test_round() {
//!     let log = call_log();
//!     let harness = SyncHarness::new(vec![ScriptedSync::new("patient", log.clone()).shared()]);
//!     assert!(harness.data_sync.sync_the_world().await.is_success());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
