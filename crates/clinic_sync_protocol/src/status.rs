//! Reconciliation status carried by every synced record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The reconciliation state of a locally persisted record.
///
/// A record is born `Pending`, becomes `Done` once the server has accepted it,
/// and becomes `Invalid` when the server rejects it with validation errors.
/// An `Invalid` record stays excluded from pushes until the user edits it,
/// which moves it back to `Pending`.
///
/// Older databases stored a fourth value, `IN_FLIGHT`. It is read back as
/// `Pending` and is never written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncStatus {
    /// Created or modified locally, not yet confirmed by the server.
    #[serde(rename = "PENDING", alias = "IN_FLIGHT")]
    Pending,
    /// Rejected by the server; excluded from future pushes.
    #[serde(rename = "INVALID")]
    Invalid,
    /// Confirmed in sync with the server.
    #[serde(rename = "DONE")]
    Done,
}

/// The legacy stored value that migrates to [`SyncStatus::Pending`].
pub const LEGACY_IN_FLIGHT: &str = "IN_FLIGHT";

impl SyncStatus {
    /// Returns the stored representation of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "PENDING",
            SyncStatus::Invalid => "INVALID",
            SyncStatus::Done => "DONE",
        }
    }

    /// Returns true if a record in this state is eligible for the next push.
    pub fn is_pending(&self) -> bool {
        matches!(self, SyncStatus::Pending)
    }

    /// Returns true if a server copy may replace a local record in `local` state.
    ///
    /// `None` means there is no local copy. Only records the server has already
    /// confirmed can be replaced; pending and invalid edits are kept.
    pub fn can_be_overridden_by_server_copy(local: Option<SyncStatus>) -> bool {
        matches!(local, None | Some(SyncStatus::Done))
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sync status: {0}")]
pub struct UnknownSyncStatus(pub String);

impl FromStr for SyncStatus {
    type Err = UnknownSyncStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" | LEGACY_IN_FLIGHT => Ok(SyncStatus::Pending),
            "INVALID" => Ok(SyncStatus::Invalid),
            "DONE" => Ok(SyncStatus::Done),
            other => Err(UnknownSyncStatus(other.to_string())),
        }
    }
}
