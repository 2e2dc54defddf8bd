//! Removal of data outside the active facility's sync group.

use crate::clock::Clock;
use crate::error::SyncResult;
use crate::preferences::{Preferences, SyncGroupSwitchedAt, FACILITY_SYNC_GROUP_SWITCHED_AT};
use std::sync::Arc;
use std::time::Duration;

/// Storage capability that physically deletes out-of-group records.
pub trait PurgeStorage: Send + Sync {
    /// Deletes every patient-scoped record outside the current facility's sync group.
    fn purge_unused_data(&self) -> SyncResult<()>;
}

/// Decides when to purge after a successful sync round.
///
/// A user who switches facility sync group may switch straight back, so
/// purging waits for a cool-down after the most recent switch.
pub struct PurgeOnSync {
    storage: Arc<dyn PurgeStorage>,
    switched_at: SyncGroupSwitchedAt,
    delay_purge_after_switch: Duration,
    clock: Arc<dyn Clock>,
}

impl PurgeOnSync {
    /// Creates the purge policy.
    pub fn new(
        storage: Arc<dyn PurgeStorage>,
        preferences: Arc<dyn Preferences>,
        delay_purge_after_switch: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            switched_at: SyncGroupSwitchedAt::new(preferences, FACILITY_SYNC_GROUP_SWITCHED_AT),
            delay_purge_after_switch,
            clock,
        }
    }

    /// Records that the active facility just moved to a different sync group.
    pub fn record_facility_sync_group_switch(&self) -> SyncResult<()> {
        self.switched_at.set(&self.clock.now())
    }

    /// Purges unless a sync-group switch happened within the cool-down.
    ///
    /// Returns true if the purge ran.
    pub fn purge_unused_data(&self) -> SyncResult<bool> {
        if !self.cool_down_elapsed()? {
            tracing::debug!("facility sync group switched recently, delaying purge");
            return Ok(false);
        }

        self.storage.purge_unused_data()?;
        tracing::info!("purged data outside the current sync group");
        Ok(true)
    }

    fn cool_down_elapsed(&self) -> SyncResult<bool> {
        let Some(switched_at) = self.switched_at.get()? else {
            return Ok(true);
        };

        // A switch recorded in the future counts as just now
        let since_switch = self
            .clock
            .now()
            .duration_since(switched_at)
            .unwrap_or(Duration::ZERO);
        Ok(since_switch >= self.delay_purge_after_switch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::preferences::MemoryPreferences;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingStorage(AtomicUsize);

    impl PurgeStorage for CountingStorage {
        fn purge_unused_data(&self) -> SyncResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fixture {
        storage: Arc<CountingStorage>,
        clock: Arc<TestClock>,
        purge: PurgeOnSync,
    }

    fn fixture() -> Fixture {
        let storage = Arc::new(CountingStorage::default());
        let clock = Arc::new(TestClock::default());
        let purge = PurgeOnSync::new(
            storage.clone(),
            Arc::new(MemoryPreferences::new()),
            Duration::from_secs(3600),
            clock.clone(),
        );
        Fixture {
            storage,
            clock,
            purge,
        }
    }

    #[test]
    fn purges_when_group_never_switched() {
        let f = fixture();

        assert!(f.purge.purge_unused_data().unwrap());
        assert_eq!(f.storage.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn waits_for_cool_down_after_switch() {
        let f = fixture();
        f.purge.record_facility_sync_group_switch().unwrap();

        f.clock.advance_by(Duration::from_secs(3599));
        assert!(!f.purge.purge_unused_data().unwrap());
        assert_eq!(f.storage.0.load(Ordering::SeqCst), 0);

        f.clock.advance_by(Duration::from_secs(1));
        assert!(f.purge.purge_unused_data().unwrap());
        assert_eq!(f.storage.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn switch_in_the_future_delays_purge() {
        let f = fixture();
        f.purge.record_facility_sync_group_switch().unwrap();
        f.clock.set(std::time::SystemTime::UNIX_EPOCH);

        assert!(!f.purge.purge_unused_data().unwrap());
    }
}
