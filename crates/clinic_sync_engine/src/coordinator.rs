//! Entity-agnostic push and pull loops.

use crate::error::{SyncError, SyncResult};
use crate::preferences::PullToken;
use crate::repository::{SyncRecord, SynceableRepository};
use clinic_sync_protocol::{DataPullResponse, DataPushResponse, SyncStatus, ValidationErrors};
use std::collections::HashSet;
use uuid::Uuid;

/// Counts from one push run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushOutcome {
    /// Records the server accepted.
    pub accepted: usize,
    /// Records the server rejected, now `Invalid`.
    pub rejected: Vec<Uuid>,
    /// Push requests made.
    pub batches: usize,
}

/// Counts from one pull run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullOutcome {
    /// Payloads received and merged.
    pub received: usize,
    /// Pages fetched.
    pub pages: usize,
}

/// Runs push and pull for any repository and transport.
///
/// The coordinator holds no state; every call works only with the
/// repository, cursor and network closure it is given. Errors from any of
/// them abort the loop and are returned unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncCoordinator;

impl SyncCoordinator {
    /// Creates a coordinator.
    pub fn new() -> Self {
        Self
    }

    /// Pushes every pending record in batches of `batch_size`.
    ///
    /// Each accepted batch is marked `Done` before the next one is read;
    /// records named in the response's validation errors are marked
    /// `Invalid` instead. No network call is made when nothing is pending.
    /// If a push call fails, the records of that batch stay `Pending`.
    pub fn push<T, P, R>(
        &self,
        repository: &R,
        batch_size: u32,
        mut push_network_call: impl FnMut(&[T]) -> SyncResult<DataPushResponse>,
    ) -> SyncResult<PushOutcome>
    where
        T: SyncRecord,
        R: SynceableRepository<T, P> + ?Sized,
    {
        if batch_size == 0 {
            return Err(SyncError::Unexpected("push batch size must be positive".into()));
        }

        let mut outcome = PushOutcome::default();
        let mut previous_batch: Vec<Uuid> = Vec::new();

        loop {
            let records = repository.pending_sync_records(batch_size, 0)?;
            if records.is_empty() {
                break;
            }

            let batch_ids: Vec<Uuid> = records.iter().map(SyncRecord::uuid).collect();
            if batch_ids == previous_batch {
                return Err(SyncError::Repository(
                    "pending records did not change after push".into(),
                ));
            }

            let response = push_network_call(&records)?;
            outcome.batches += 1;

            let rejected = rejected_ids(&batch_ids, &response.validation_errors);
            log_validation_errors(&response.validation_errors);

            let accepted: Vec<Uuid> = batch_ids
                .iter()
                .copied()
                .filter(|id| !rejected.contains(id))
                .collect();

            if !accepted.is_empty() {
                repository.set_sync_status(&accepted, SyncStatus::Done)?;
            }
            if !rejected.is_empty() {
                repository.set_sync_status(&rejected, SyncStatus::Invalid)?;
            }

            outcome.accepted += accepted.len();
            outcome.rejected.extend(rejected);
            previous_batch = batch_ids;
        }

        Ok(outcome)
    }

    /// Pulls pages until the server returns a short page.
    ///
    /// Each page is merged into the repository before the cursor is advanced
    /// to the page's process token. A failure leaves the cursor at the last
    /// fully applied page, so the next pull resumes there.
    pub fn pull<T, P, R>(
        &self,
        repository: &R,
        last_pull_token: &PullToken,
        batch_size: u32,
        mut pull_network_call: impl FnMut(Option<&str>, u32) -> SyncResult<DataPullResponse<P>>,
    ) -> SyncResult<PullOutcome>
    where
        R: SynceableRepository<T, P> + ?Sized,
    {
        if batch_size == 0 {
            return Err(SyncError::Unexpected("pull batch size must be positive".into()));
        }

        let mut outcome = PullOutcome::default();

        loop {
            let token = last_pull_token.get()?;
            let response = pull_network_call(token.as_deref(), batch_size)?;

            let has_fetched_all_data = response.is_last_page(batch_size);
            let DataPullResponse {
                payloads,
                process_token,
            } = response;

            outcome.pages += 1;
            outcome.received += payloads.len();

            repository.merge_with_local_data(payloads)?;
            last_pull_token.set(&process_token)?;

            if has_fetched_all_data {
                break;
            }
        }

        Ok(outcome)
    }
}

/// Identifiers from `errors` that belong to the pushed batch, in batch order.
fn rejected_ids(batch_ids: &[Uuid], errors: &[ValidationErrors]) -> Vec<Uuid> {
    let named: HashSet<Uuid> = errors.iter().map(|e| e.uuid).collect();
    batch_ids
        .iter()
        .copied()
        .filter(|id| named.contains(id))
        .collect()
}

fn log_validation_errors(errors: &[ValidationErrors]) {
    if errors.is_empty() {
        return;
    }
    tracing::warn!(
        count = errors.len(),
        errors = ?errors,
        "server sent validation errors"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preferences::{MemoryPreferences, Preferences};
    use crate::repository::MemoryRepository;
    use crate::transport::{MockTransport, SyncTransport};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct Reading {
        uuid: Uuid,
        systolic: u16,
        status: SyncStatus,
    }

    impl SyncRecord for Reading {
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

    fn reading(status: SyncStatus) -> Reading {
        Reading {
            uuid: Uuid::new_v4(),
            systolic: 120,
            status,
        }
    }

    fn token() -> PullToken {
        PullToken::new(Arc::new(MemoryPreferences::new()), "last_reading_pull_token")
    }

    #[test]
    fn no_pending_records_means_no_network_call() {
        let repository = MemoryRepository::new();
        repository.save([reading(SyncStatus::Done), reading(SyncStatus::Invalid)]);

        let mut calls = 0;
        let outcome = SyncCoordinator::new()
            .push(&repository, 10, |_: &[Reading]| {
                calls += 1;
                Ok(DataPushResponse::accepted())
            })
            .unwrap();

        assert_eq!(calls, 0);
        assert_eq!(outcome, PushOutcome::default());
    }

    #[test]
    fn push_drains_pending_records_in_batches() {
        let repository = MemoryRepository::new();
        let records: Vec<_> = (0..7).map(|_| reading(SyncStatus::Pending)).collect();
        repository.save(records.clone());
        let transport = MockTransport::<Reading, Reading>::new();

        let outcome = SyncCoordinator::new()
            .push(&repository, 3, |batch| transport.push(batch))
            .unwrap();

        let sizes: Vec<_> = transport.pushed_batches().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(outcome.accepted, 7);
        assert_eq!(outcome.batches, 3);
        assert_eq!(repository.records_with_status(SyncStatus::Done).len(), 7);
    }

    #[test]
    fn validation_errors_mark_only_named_records_invalid() {
        let repository = MemoryRepository::new();
        let records: Vec<_> = (0..4).map(|_| reading(SyncStatus::Pending)).collect();
        repository.save(records.clone());

        let rejected = vec![records[1].uuid, records[3].uuid];
        let response = DataPushResponse::with_errors(vec![
            ValidationErrors::new(records[1].uuid).with_message("systolic", "too high"),
            ValidationErrors::new(records[3].uuid),
            // Not part of the batch; ignored
            ValidationErrors::new(Uuid::new_v4()),
        ]);

        let outcome = SyncCoordinator::new()
            .push(&repository, 10, |_: &[Reading]| Ok(response.clone()))
            .unwrap();

        assert_eq!(outcome.rejected, rejected);
        for record in &records {
            let expected = if rejected.contains(&record.uuid) {
                SyncStatus::Invalid
            } else {
                SyncStatus::Done
            };
            assert_eq!(repository.get(record.uuid).unwrap().status, expected);
        }
    }

    #[test]
    fn failed_push_leaves_batch_pending() {
        let repository = MemoryRepository::new();
        repository.save((0..5).map(|_| reading(SyncStatus::Pending)));
        let transport = MockTransport::<Reading, Reading>::new();
        transport.enqueue_push_response(Ok(DataPushResponse::accepted()));
        transport.enqueue_push_response(Err(SyncError::Timeout));

        let result = SyncCoordinator::new().push(&repository, 2, |batch| transport.push(batch));

        assert!(matches!(result, Err(SyncError::Timeout)));
        assert_eq!(repository.records_with_status(SyncStatus::Done).len(), 2);
        assert_eq!(repository.pending_sync_record_count().unwrap(), 3);
    }

    #[test]
    fn repository_that_never_updates_is_detected() {
        struct Stuck(Vec<Reading>);

        impl SynceableRepository<Reading, Reading> for Stuck {
            fn pending_sync_records(&self, _: u32, _: u32) -> SyncResult<Vec<Reading>> {
                Ok(self.0.clone())
            }
            fn set_sync_status(&self, _: &[Uuid], _: SyncStatus) -> SyncResult<()> {
                Ok(())
            }
            fn merge_with_local_data(&self, _: Vec<Reading>) -> SyncResult<()> {
                Ok(())
            }
            fn record_count(&self) -> SyncResult<usize> {
                Ok(self.0.len())
            }
            fn pending_sync_record_count(&self) -> SyncResult<usize> {
                Ok(self.0.len())
            }
        }

        let stuck = Stuck(vec![reading(SyncStatus::Pending)]);
        let result = SyncCoordinator::new().push(&stuck, 10, |_: &[Reading]| {
            Ok(DataPushResponse::accepted())
        });
        assert!(matches!(result, Err(SyncError::Repository(_))));
    }

    #[test]
    fn pull_applies_pages_and_advances_cursor() {
        let repository = MemoryRepository::new();
        let transport = MockTransport::<Reading, Reading>::new();
        let server: Vec<_> = (0..7).map(|_| reading(SyncStatus::Done)).collect();
        transport.set_server_records(server.clone());
        let token = token();

        let outcome = SyncCoordinator::new()
            .pull(&repository, &token, 3, |t, limit| transport.pull(t, limit))
            .unwrap();

        assert_eq!(outcome, PullOutcome { received: 7, pages: 3 });
        assert_eq!(repository.record_count().unwrap(), 7);
        assert_eq!(token.get().unwrap().as_deref(), Some("7"));
        assert_eq!(
            transport.pull_requests(),
            vec![
                (None, 3),
                (Some("3".to_string()), 3),
                (Some("6".to_string()), 3)
            ]
        );
    }

    #[test]
    fn failed_page_does_not_advance_cursor() {
        let repository = MemoryRepository::new();
        let transport = MockTransport::<Reading, Reading>::new();
        transport.set_server_records((0..5).map(|_| reading(SyncStatus::Done)).collect());
        transport.fail_pull_at(2, SyncError::http(503, "unavailable"));
        let token = token();
        let coordinator = SyncCoordinator::new();

        let result = coordinator.pull(&repository, &token, 2, |t, l| transport.pull(t, l));
        assert!(matches!(result, Err(SyncError::Http { status: 503, .. })));
        assert_eq!(token.get().unwrap().as_deref(), Some("2"));

        // Retry resumes from the failed page
        coordinator
            .pull(&repository, &token, 2, |t, l| transport.pull(t, l))
            .unwrap();
        assert_eq!(
            transport.pull_requests().last().unwrap(),
            &(Some("4".to_string()), 2)
        );
        assert_eq!(repository.record_count().unwrap(), 5);
    }

    #[test]
    fn crash_between_apply_and_advance_re_applies_same_page() {
        /// Fails the first cursor write, as if the process died after merging.
        struct CrashOnce {
            inner: MemoryPreferences,
            crashed: AtomicBool,
        }

        impl Preferences for CrashOnce {
            fn get(&self, key: &str) -> SyncResult<Option<String>> {
                self.inner.get(key)
            }
            fn set(&self, key: &str, value: &str) -> SyncResult<()> {
                if !self.crashed.swap(true, Ordering::SeqCst) {
                    return Err(SyncError::Preferences("simulated crash".into()));
                }
                self.inner.set(key, value)
            }
            fn remove(&self, key: &str) -> SyncResult<()> {
                self.inner.remove(key)
            }
        }

        let prefs = Arc::new(CrashOnce {
            inner: MemoryPreferences::new(),
            crashed: AtomicBool::new(false),
        });
        let token = PullToken::new(prefs, "last_reading_pull_token");
        let repository = MemoryRepository::new();
        let transport = MockTransport::<Reading, Reading>::new();
        let server: Vec<_> = (0..3).map(|_| reading(SyncStatus::Done)).collect();
        transport.set_server_records(server.clone());
        let coordinator = SyncCoordinator::new();

        assert!(coordinator
            .pull(&repository, &token, 5, |t, l| transport.pull(t, l))
            .is_err());
        assert_eq!(repository.record_count().unwrap(), 3);
        assert_eq!(token.get().unwrap(), None);

        coordinator
            .pull(&repository, &token, 5, |t, l| transport.pull(t, l))
            .unwrap();

        // Same page applied twice, no duplicates
        assert_eq!(repository.records(), server);
        assert_eq!(token.get().unwrap().as_deref(), Some("3"));
    }

    #[test]
    fn zero_pull_batch_size_is_rejected() {
        let repository = MemoryRepository::<Reading>::new();
        let result = SyncCoordinator::new().pull(&repository, &token(), 0, |_, _| {
            Ok(DataPullResponse::new(Vec::<Reading>::new(), ""))
        });
        assert!(matches!(result, Err(SyncError::Unexpected(_))));
    }

    #[test]
    fn zero_push_batch_size_is_rejected() {
        let repository = MemoryRepository::new();
        repository.save([reading(SyncStatus::Pending), reading(SyncStatus::Pending)]);

        let mut calls = 0;
        let result = SyncCoordinator::new().push(&repository, 0, |_: &[Reading]| {
            calls += 1;
            Ok(DataPushResponse::accepted())
        });

        assert!(matches!(result, Err(SyncError::Unexpected(_))));
        assert_eq!(calls, 0);
        assert_eq!(repository.pending_sync_record_count().unwrap(), 2);
    }
}
