//! Push and pull responses exchanged with the sync server.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Server-side validation failure for one pushed record.
///
/// Records named here are never retried automatically; the engine flips
/// them to [`SyncStatus::Invalid`](crate::SyncStatus::Invalid).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    /// Identifier of the rejected record.
    #[serde(rename = "id")]
    pub uuid: Uuid,
    /// Field name to schema error messages.
    #[serde(rename = "schema", default)]
    pub schema_error_messages: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    /// Creates validation errors for a record with no field details.
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            schema_error_messages: BTreeMap::new(),
        }
    }

    /// Adds a schema error message for a field.
    pub fn with_message(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.schema_error_messages
            .entry(field.into())
            .or_default()
            .push(message.into());
        self
    }
}

/// Response to a push of one batch of records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPushResponse {
    /// Records the server refused to store.
    #[serde(rename = "errors", default)]
    pub validation_errors: Vec<ValidationErrors>,
}

impl DataPushResponse {
    /// A response in which every record was accepted.
    pub fn accepted() -> Self {
        Self::default()
    }

    /// A response rejecting the given records.
    pub fn with_errors(validation_errors: Vec<ValidationErrors>) -> Self {
        Self { validation_errors }
    }

    /// Identifiers of the rejected records, in response order.
    pub fn rejected_ids(&self) -> Vec<Uuid> {
        self.validation_errors.iter().map(|e| e.uuid).collect()
    }
}

/// One page of remote records returned by a pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPullResponse<P> {
    /// Remote records in this page.
    pub payloads: Vec<P>,
    /// Opaque cursor to send with the next pull.
    pub process_token: String,
}

impl<P> DataPullResponse<P> {
    /// Creates a new pull page.
    pub fn new(payloads: Vec<P>, process_token: impl Into<String>) -> Self {
        Self {
            payloads,
            process_token: process_token.into(),
        }
    }

    /// Returns true if this is the final page for the requested page size.
    ///
    /// The server signals end-of-data by returning fewer records than asked for.
    pub fn is_last_page(&self, batch_size: u32) -> bool {
        self.payloads.len() < batch_size as usize
    }
}
