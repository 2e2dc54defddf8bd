//! Configuration for the sync engine.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The cadence group a sync belongs to.
///
/// Syncs in the same group run together and report progress together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncGroup {
    /// Patient and clinical data, synced often.
    Frequent,
    /// Reference data (facilities, protocols), synced once a day.
    Daily,
}

impl SyncGroup {
    /// All groups, in the order a full round runs them.
    pub const ALL: [SyncGroup; 2] = [SyncGroup::Frequent, SyncGroup::Daily];
}

/// How often a group is synced and how long to wait after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncInterval {
    /// Time between successful rounds.
    pub frequency: Duration,
    /// Initial delay before retrying a failed round.
    pub backoff_delay: Duration,
}

impl SyncInterval {
    /// Every 16 minutes, backing off 5 minutes after a failure.
    pub const FREQUENT: SyncInterval = SyncInterval {
        frequency: Duration::from_secs(16 * 60),
        backoff_delay: Duration::from_secs(5 * 60),
    };

    /// Once a day, backing off 5 minutes after a failure.
    pub const DAILY: SyncInterval = SyncInterval {
        frequency: Duration::from_secs(24 * 60 * 60),
        backoff_delay: Duration::from_secs(5 * 60),
    };

    /// The default interval for a group.
    pub fn for_group(group: SyncGroup) -> Self {
        match group {
            SyncGroup::Frequent => Self::FREQUENT,
            SyncGroup::Daily => Self::DAILY,
        }
    }
}

/// Preset batch sizes for push and pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchSize {
    /// 10 records.
    VerySmall,
    /// 50 records.
    Small,
    /// 500 records.
    Medium,
    /// 1000 records.
    Large,
}

impl BatchSize {
    /// Number of records in a batch.
    pub fn number_of_records(&self) -> u32 {
        match self {
            BatchSize::VerySmall => 10,
            BatchSize::Small => 50,
            BatchSize::Medium => 500,
            BatchSize::Large => 1000,
        }
    }
}

/// Per-entity sync configuration. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Cadence and backoff.
    pub sync_interval: SyncInterval,
    /// Maximum records per push request.
    pub push_batch_size: u32,
    /// Maximum records per pull page.
    pub pull_batch_size: u32,
    /// Group this entity is synced with.
    pub sync_group: SyncGroup,
}

impl SyncConfig {
    /// Creates a configuration using the group's default interval.
    pub fn new(sync_group: SyncGroup, batch_size: BatchSize) -> Self {
        let size = batch_size.number_of_records();
        Self {
            sync_interval: SyncInterval::for_group(sync_group),
            push_batch_size: size,
            pull_batch_size: size,
            sync_group,
        }
    }

    /// Configuration for frequently synced clinical data.
    pub fn frequent() -> Self {
        Self::new(SyncGroup::Frequent, BatchSize::Medium)
    }

    /// Configuration for daily reference data.
    pub fn daily() -> Self {
        Self::new(SyncGroup::Daily, BatchSize::Small)
    }

    /// Sets the push batch size.
    pub fn with_push_batch_size(mut self, size: u32) -> Self {
        self.push_batch_size = size;
        self
    }

    /// Sets the pull batch size.
    pub fn with_pull_batch_size(mut self, size: u32) -> Self {
        self.pull_batch_size = size;
        self
    }

    /// Sets both batch sizes.
    pub fn with_batch_size(self, size: u32) -> Self {
        self.with_push_batch_size(size).with_pull_batch_size(size)
    }

    /// Sets the sync interval.
    pub fn with_sync_interval(mut self, interval: SyncInterval) -> Self {
        self.sync_interval = interval;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::frequent()
    }
}

/// Configuration of the orchestrator itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSyncConfig {
    /// Push/pull operations allowed to run at the same time.
    pub max_parallel_syncs: usize,
    /// Cool-down after a facility sync-group switch before purging.
    pub delay_purge_after_switch: Duration,
}

impl DataSyncConfig {
    /// Sets the number of parallel operations. Zero is treated as one.
    pub fn with_max_parallel_syncs(mut self, workers: usize) -> Self {
        self.max_parallel_syncs = workers.max(1);
        self
    }

    /// Sets the purge cool-down.
    pub fn with_delay_purge_after_switch(mut self, delay: Duration) -> Self {
        self.delay_purge_after_switch = delay;
        self
    }
}

impl Default for DataSyncConfig {
    fn default() -> Self {
        Self {
            max_parallel_syncs: 1,
            delay_purge_after_switch: Duration::from_secs(60 * 60),
        }
    }
}

/// Backoff used by the periodic scheduler after failed rounds.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Upper bound on any delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% jitter.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a backoff starting at `initial_delay`.
    pub fn new(initial_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay: Duration::from_secs(60 * 60),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Delay after `consecutive_failures` failed rounds. Zero failures means no delay.
    pub fn delay_for_attempt(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }

        let exponent = consecutive_failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            Duration::from_secs_f64(capped + capped * 0.25 * jitter_fraction())
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(SyncInterval::FREQUENT.backoff_delay)
    }
}

/// A value in `[0, 1)` derived from the clock's sub-second nanos.
fn jitter_fraction() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}
