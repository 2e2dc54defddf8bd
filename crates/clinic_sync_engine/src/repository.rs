//! Storage capability the sync engine needs from each entity type.

use crate::error::{SyncError, SyncResult};
use clinic_sync_protocol::SyncStatus;
use parking_lot::RwLock;
use uuid::Uuid;

/// A locally persisted record that takes part in sync.
pub trait SyncRecord: Clone + Send + Sync {
    /// Stable unique identifier.
    fn uuid(&self) -> Uuid;

    /// Current reconciliation state.
    fn sync_status(&self) -> SyncStatus;

    /// Returns a copy in the given state.
    fn with_sync_status(self, status: SyncStatus) -> Self;
}

/// Per-entity storage operations used by the sync coordinator.
///
/// `T` is the local record pushed to the server and `P` is the payload the
/// server returns on pull. The repository owns its records; the engine never
/// holds them beyond a single push or pull call.
pub trait SynceableRepository<T, P>: Send + Sync {
    /// Returns up to `limit` pending records, skipping the first `offset`.
    fn pending_sync_records(&self, limit: u32, offset: u32) -> SyncResult<Vec<T>>;

    /// Moves the given records to state `to`. Unknown identifiers are ignored.
    fn set_sync_status(&self, ids: &[Uuid], to: SyncStatus) -> SyncResult<()>;

    /// Upserts a page of server records by identifier.
    ///
    /// Must be idempotent: applying the same page twice leaves the same
    /// state as applying it once. Local records that cannot be overridden by
    /// the server copy are kept.
    fn merge_with_local_data(&self, payloads: Vec<P>) -> SyncResult<()>;

    /// Total number of records.
    fn record_count(&self) -> SyncResult<usize>;

    /// Number of records waiting to be pushed.
    fn pending_sync_record_count(&self) -> SyncResult<usize>;
}

/// An in-memory repository whose pull payload is the record itself.
///
/// Records keep insertion order, so pending records are pushed oldest first.
pub struct MemoryRepository<R> {
    records: RwLock<Vec<R>>,
}

impl<R: SyncRecord> MemoryRepository<R> {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    /// Inserts or replaces records as local edits.
    pub fn save(&self, records: impl IntoIterator<Item = R>) {
        let mut stored = self.records.write();
        for record in records {
            upsert(&mut stored, record);
        }
    }

    /// Returns the record with `uuid`.
    pub fn get(&self, uuid: Uuid) -> Option<R> {
        self.records.read().iter().find(|r| r.uuid() == uuid).cloned()
    }

    /// Returns every record.
    pub fn records(&self) -> Vec<R> {
        self.records.read().clone()
    }

    /// Returns every record in `status`.
    pub fn records_with_status(&self, status: SyncStatus) -> Vec<R> {
        self.records
            .read()
            .iter()
            .filter(|r| r.sync_status() == status)
            .cloned()
            .collect()
    }
}

impl<R: SyncRecord> Default for MemoryRepository<R> {
    fn default() -> Self {
        Self::new()
    }
}

fn upsert<R: SyncRecord>(records: &mut Vec<R>, record: R) {
    match records.iter_mut().find(|r| r.uuid() == record.uuid()) {
        Some(existing) => *existing = record,
        None => records.push(record),
    }
}

impl<R: SyncRecord> SynceableRepository<R, R> for MemoryRepository<R> {
    fn pending_sync_records(&self, limit: u32, offset: u32) -> SyncResult<Vec<R>> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| r.sync_status().is_pending())
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    fn set_sync_status(&self, ids: &[Uuid], to: SyncStatus) -> SyncResult<()> {
        if ids.is_empty() {
            return Err(SyncError::Repository(
                "set_sync_status called without identifiers".into(),
            ));
        }
        for record in self.records.write().iter_mut() {
            if ids.contains(&record.uuid()) {
                *record = record.clone().with_sync_status(to);
            }
        }
        Ok(())
    }

    fn merge_with_local_data(&self, payloads: Vec<R>) -> SyncResult<()> {
        let mut records = self.records.write();
        for payload in payloads {
            let local = records
                .iter()
                .find(|r| r.uuid() == payload.uuid())
                .map(SyncRecord::sync_status);

            if SyncStatus::can_be_overridden_by_server_copy(local) {
                upsert(&mut records, payload.with_sync_status(SyncStatus::Done));
            }
        }
        Ok(())
    }

    fn record_count(&self) -> SyncResult<usize> {
        Ok(self.records.read().len())
    }

    fn pending_sync_record_count(&self) -> SyncResult<usize> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| r.sync_status().is_pending())
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        uuid: Uuid,
        text: &'static str,
        status: SyncStatus,
    }

    impl SyncRecord for Note {
        fn uuid(&self) -> Uuid {
            self.uuid
        }

        fn sync_status(&self) -> SyncStatus {
            self.status
        }

        fn with_sync_status(self, status: SyncStatus) -> Self {
            Self { status, ..self }
        }
    }

    fn note(text: &'static str, status: SyncStatus) -> Note {
        Note {
            uuid: Uuid::new_v4(),
            text,
            status,
        }
    }

    #[test]
    fn pending_records_are_paged() {
        let repository = MemoryRepository::new();
        let notes: Vec<_> = (0..5).map(|_| note("a", SyncStatus::Pending)).collect();
        repository.save(notes.clone());
        repository.save([note("done", SyncStatus::Done)]);

        let first = repository.pending_sync_records(2, 0).unwrap();
        let rest = repository.pending_sync_records(10, 2).unwrap();

        assert_eq!(first, notes[..2].to_vec());
        assert_eq!(rest, notes[2..].to_vec());
        assert_eq!(repository.pending_sync_record_count().unwrap(), 5);
        assert_eq!(repository.record_count().unwrap(), 6);
    }

    #[test]
    fn merge_keeps_local_edits() {
        let repository = MemoryRepository::new();
        let pending = note("local edit", SyncStatus::Pending);
        let invalid = note("rejected", SyncStatus::Invalid);
        let done = note("synced", SyncStatus::Done);
        repository.save([pending.clone(), invalid.clone(), done.clone()]);

        let fresh = note("new", SyncStatus::Pending);
        repository
            .merge_with_local_data(vec![
                Note { text: "server", ..pending.clone() },
                Note { text: "server", ..invalid.clone() },
                Note { text: "server", ..done.clone() },
                fresh.clone(),
            ])
            .unwrap();

        assert_eq!(repository.get(pending.uuid).unwrap(), pending);
        assert_eq!(repository.get(invalid.uuid).unwrap(), invalid);
        assert_eq!(repository.get(done.uuid).unwrap().text, "server");
        assert_eq!(
            repository.get(fresh.uuid).unwrap().status,
            SyncStatus::Done
        );
    }

    #[test]
    fn status_updates() {
        let repository = MemoryRepository::new();
        let a = note("a", SyncStatus::Pending);
        let b = note("b", SyncStatus::Pending);
        repository.save([a.clone(), b.clone()]);

        repository.set_sync_status(&[a.uuid], SyncStatus::Invalid).unwrap();
        repository
            .set_sync_status(&[b.uuid, Uuid::new_v4()], SyncStatus::Done)
            .unwrap();

        assert_eq!(repository.get(a.uuid).unwrap().status, SyncStatus::Invalid);
        assert_eq!(repository.get(b.uuid).unwrap().status, SyncStatus::Done);
        assert!(repository.set_sync_status(&[], SyncStatus::Done).is_err());
    }
}
