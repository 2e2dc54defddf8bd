//! Property-based test generators using proptest.
//!
//! Provides strategies for generating records, users and server
//! responses that keep the invariants the sync engine relies on.

use crate::fixtures::TestRecord;
use clinic_sync_engine::{LoggedInStatus, SyncStatus, User, UserStatus};
use proptest::prelude::*;
use proptest::sample::subsequence;
use uuid::Uuid;

/// Strategy for generating record identifiers.
pub fn uuid_strategy() -> impl Strategy<Value = Uuid> {
    any::<u128>().prop_map(Uuid::from_u128)
}

/// Strategy for generating any sync status.
pub fn sync_status_strategy() -> impl Strategy<Value = SyncStatus> {
    prop_oneof![
        Just(SyncStatus::Pending),
        Just(SyncStatus::Invalid),
        Just(SyncStatus::Done),
    ]
}

/// Strategy for generating a record with the given status strategy.
pub fn record_strategy(
    status: impl Strategy<Value = SyncStatus>,
) -> impl Strategy<Value = TestRecord> {
    (uuid_strategy(), "[a-z]{1,12}", status).prop_map(|(uuid, body, sync_status)| TestRecord {
        uuid,
        body,
        sync_status,
    })
}

/// Strategy for generating records with distinct identifiers.
pub fn records_strategy(
    status: impl Strategy<Value = SyncStatus>,
    max_len: usize,
) -> impl Strategy<Value = Vec<TestRecord>> {
    prop::collection::vec(record_strategy(status), 0..=max_len).prop_map(|mut records| {
        let mut seen = std::collections::HashSet::new();
        records.retain(|r| seen.insert(r.uuid));
        records
    })
}

/// Strategy for pending records plus a subset the server will reject.
pub fn pending_with_rejections_strategy(
    max_len: usize,
) -> impl Strategy<Value = (Vec<TestRecord>, Vec<Uuid>)> {
    records_strategy(Just(SyncStatus::Pending), max_len).prop_flat_map(|records| {
        let ids: Vec<Uuid> = records.iter().map(|r| r.uuid).collect();
        let len = ids.len();
        (Just(records), subsequence(ids, 0..=len))
    })
}

/// Strategy for generating push and pull batch sizes.
pub fn batch_size_strategy() -> impl Strategy<Value = u32> {
    1u32..=25
}

/// Strategy for generating any login state.
pub fn logged_in_status_strategy() -> impl Strategy<Value = LoggedInStatus> {
    prop_oneof![
        Just(LoggedInStatus::OtpRequested),
        Just(LoggedInStatus::LoggedIn),
        Just(LoggedInStatus::ResettingPin),
        Just(LoggedInStatus::ResetPinRequested),
        Just(LoggedInStatus::Unauthorized),
    ]
}

/// Strategy for generating any approval state.
pub fn user_status_strategy() -> impl Strategy<Value = UserStatus> {
    prop_oneof![
        Just(UserStatus::WaitingForApproval),
        Just(UserStatus::ApprovedForSyncing),
        Just(UserStatus::DisapprovedForSyncing),
    ]
}

/// Strategy for generating an optional local user.
pub fn user_strategy() -> impl Strategy<Value = Option<User>> {
    prop::option::of(
        (
            uuid_strategy(),
            logged_in_status_strategy(),
            user_status_strategy(),
            uuid_strategy(),
        )
            .prop_map(|(uuid, logged_in_status, status, facility)| User {
                uuid,
                full_name: "Generated User".into(),
                logged_in_status,
                status,
                current_facility_uuid: facility,
            }),
    )
}
