//! Property tests for the push and pull loops.

use clinic_sync_engine::{
    DataPullResponse, DataPushResponse, MemoryPreferences, MemoryRepository, MockTransport,
    PullToken, SyncCoordinator, SyncRecord, SyncStatus, SyncTransport, SynceableRepository,
    ValidationErrors,
};
use clinic_sync_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

fn repository_with(records: &[TestRecord]) -> MemoryRepository<TestRecord> {
    let repository = MemoryRepository::new();
    repository.save(records.iter().cloned());
    repository
}

proptest! {
    #[test]
    fn push_marks_rejected_invalid_and_the_rest_done(
        (records, rejected) in pending_with_rejections_strategy(40),
        batch_size in batch_size_strategy(),
    ) {
        let repository = repository_with(&records);
        let rejected: HashSet<_> = rejected.into_iter().collect();
        let mut pushed = 0usize;

        let outcome = SyncCoordinator::new()
            .push::<TestRecord, TestRecord, _>(&repository, batch_size, |batch| {
                assert!(batch.len() <= batch_size as usize);
                pushed += batch.len();
                let errors = batch
                    .iter()
                    .filter(|r| rejected.contains(&r.uuid))
                    .map(|r| ValidationErrors::new(r.uuid).with_message("body", "invalid"))
                    .collect();
                Ok(DataPushResponse::with_errors(errors))
            });
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => return Err(TestCaseError::fail(e.to_string())),
        };

        prop_assert_eq!(pushed, records.len());
        prop_assert_eq!(outcome.accepted + outcome.rejected.len(), records.len());
        for record in &records {
            let stored = repository.get(record.uuid).unwrap();
            let expected = if rejected.contains(&record.uuid) {
                SyncStatus::Invalid
            } else {
                SyncStatus::Done
            };
            prop_assert_eq!(stored.sync_status, expected);
        }
        prop_assert_eq!(repository.pending_sync_record_count().unwrap(), 0);
    }

    #[test]
    fn repeated_pull_is_idempotent(
        server in records_strategy(Just(SyncStatus::Done), 30),
        local_pending in 0usize..5,
        batch_size in batch_size_strategy(),
    ) {
        // Some server records also exist locally with unsynced edits
        let local: Vec<TestRecord> = server
            .iter()
            .take(local_pending)
            .map(|r| r.edited("local").with_sync_status(SyncStatus::Pending))
            .collect();
        let repository = repository_with(&local);
        let transport = MockTransport::<TestRecord, TestRecord>::new();
        transport.set_server_records(server.clone());
        let token = PullToken::new(Arc::new(MemoryPreferences::new()), "last_test_pull_token");
        let coordinator = SyncCoordinator::new();

        let pull = |repository: &MemoryRepository<TestRecord>| {
            coordinator.pull::<TestRecord, TestRecord, _>(
                repository,
                &token,
                batch_size,
                |t, limit| transport.pull(t, limit),
            )
        };

        let first = pull(&repository);
        prop_assert!(first.is_ok());
        let after_first = repository.records();

        let second = pull(&repository);
        prop_assert!(second.is_ok());
        prop_assert_eq!(repository.records(), after_first);
        prop_assert_eq!(second.unwrap().received, 0);

        prop_assert_eq!(repository.records().len(), server.len());
        for record in &local {
            let stored = repository.get(record.uuid).unwrap();
            prop_assert_eq!(stored.body.as_str(), "local");
            prop_assert_eq!(stored.sync_status, SyncStatus::Pending);
        }
        prop_assert_eq!(token.get().unwrap(), Some(server.len().to_string()));
    }

    #[test]
    fn pulled_records_never_replace_pending_local_copies(
        server in records_strategy(Just(SyncStatus::Done), 20),
        page in batch_size_strategy(),
    ) {
        let local: Vec<TestRecord> = server
            .iter()
            .map(|r| r.edited("local").with_sync_status(SyncStatus::Pending))
            .collect();
        let repository = repository_with(&local);
        let token = PullToken::new(Arc::new(MemoryPreferences::new()), "last_test_pull_token");
        let pages: Vec<Vec<TestRecord>> = server.chunks(page as usize).map(|c| c.to_vec()).collect();
        let mut next = 0usize;

        let result = SyncCoordinator::new().pull::<TestRecord, TestRecord, _>(
            &repository,
            &token,
            page,
            |_, _| {
                let payloads = pages.get(next).cloned().unwrap_or_default();
                next += 1;
                Ok(DataPullResponse::new(payloads, next.to_string()))
            },
        );

        prop_assert!(result.is_ok());
        prop_assert_eq!(repository.records(), local);
    }
}
