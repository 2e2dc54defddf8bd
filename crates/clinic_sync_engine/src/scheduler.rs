//! Periodic background syncing of one group.

use crate::config::{RetryConfig, SyncGroup, SyncInterval};
use crate::data_sync::DataSync;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Runs `sync_group` for one group on a timer until shut down.
///
/// The first round starts immediately. After a successful round the next
/// one waits the group's frequency; after a failed round it backs off,
/// starting from the group's backoff delay.
pub struct SyncScheduler {
    data_sync: DataSync,
    group: SyncGroup,
    interval: SyncInterval,
    retry: RetryConfig,
}

impl SyncScheduler {
    /// Creates a scheduler using the group's default interval.
    pub fn new(data_sync: DataSync, group: SyncGroup) -> Self {
        let interval = SyncInterval::for_group(group);
        Self {
            data_sync,
            group,
            interval,
            retry: RetryConfig::new(interval.backoff_delay),
        }
    }

    /// Replaces the interval; the backoff restarts from its delay.
    pub fn with_interval(mut self, interval: SyncInterval) -> Self {
        self.interval = interval;
        self.retry.initial_delay = interval.backoff_delay;
        self
    }

    /// Replaces the backoff policy, keeping the interval's initial delay.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = RetryConfig {
            initial_delay: self.interval.backoff_delay,
            ..retry
        };
        self
    }

    /// Delay before the next round.
    pub fn next_delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            self.interval.frequency
        } else {
            self.retry.delay_for_attempt(consecutive_failures)
        }
    }

    /// Spawns the loop on the current tokio runtime.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown, mut stop) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut consecutive_failures = 0u32;
            loop {
                let report = self.data_sync.sync_group(self.group).await;
                consecutive_failures = if report.is_success() {
                    0
                } else {
                    consecutive_failures.saturating_add(1)
                };

                let delay = self.next_delay(consecutive_failures);
                tracing::debug!(
                    group = ?self.group,
                    consecutive_failures,
                    delay_secs = delay.as_secs_f64(),
                    "next scheduled sync"
                );

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = stop.changed() => break,
                }
            }
            tracing::info!(group = ?self.group, "sync scheduler stopped");
        });

        SchedulerHandle { shutdown, task }
    }
}

/// Stops a running [`SyncScheduler`].
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signals the scheduler to stop and waits for the current round to end.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "sync scheduler task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::{DataSyncConfig, SyncConfig};
    use crate::error::{SyncError, SyncResult};
    use crate::model_sync::ModelSync;
    use crate::preferences::MemoryPreferences;
    use crate::purge::{PurgeOnSync, PurgeStorage};
    use crate::user::{User, UserSession};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Ticker {
        config: SyncConfig,
        pulls: AtomicUsize,
    }

    impl ModelSync for Ticker {
        fn name(&self) -> &str {
            "ticker"
        }
        fn requires_sync_approved_user(&self) -> bool {
            false
        }
        fn sync_config(&self) -> &SyncConfig {
            &self.config
        }
        fn push(&self) -> SyncResult<()> {
            Ok(())
        }
        fn pull(&self) -> SyncResult<()> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            Err(SyncError::Timeout)
        }
    }

    struct NoUser;

    impl UserSession for NoUser {
        fn logged_in_user(&self) -> Option<User> {
            None
        }
    }

    struct NoPurge;

    impl PurgeStorage for NoPurge {
        fn purge_unused_data(&self) -> SyncResult<()> {
            Ok(())
        }
    }

    fn data_sync(ticker: Arc<Ticker>) -> DataSync {
        let clock = Arc::new(SystemClock);
        let purge = Arc::new(PurgeOnSync::new(
            Arc::new(NoPurge),
            Arc::new(MemoryPreferences::new()),
            Duration::ZERO,
            clock.clone(),
        ));
        DataSync::new(
            vec![ticker as Arc<dyn ModelSync>],
            Arc::new(NoUser),
            purge,
            clock,
            &DataSyncConfig::default(),
        )
    }

    #[test]
    fn delays_follow_interval_and_backoff() {
        let ticker = Arc::new(Ticker {
            config: SyncConfig::frequent(),
            pulls: AtomicUsize::new(0),
        });
        let scheduler = SyncScheduler::new(data_sync(ticker), SyncGroup::Frequent)
            .with_retry(RetryConfig::default().with_jitter(false));

        assert_eq!(scheduler.next_delay(0), Duration::from_secs(16 * 60));
        assert_eq!(scheduler.next_delay(1), Duration::from_secs(5 * 60));
        assert_eq!(scheduler.next_delay(2), Duration::from_secs(10 * 60));
        assert_eq!(scheduler.next_delay(20), Duration::from_secs(60 * 60));
    }

    #[tokio::test]
    async fn runs_repeatedly_until_shut_down() {
        let ticker = Arc::new(Ticker {
            config: SyncConfig::frequent(),
            pulls: AtomicUsize::new(0),
        });
        let interval = SyncInterval {
            frequency: Duration::from_millis(5),
            backoff_delay: Duration::from_millis(5),
        };
        let handle = SyncScheduler::new(data_sync(ticker.clone()), SyncGroup::Frequent)
            .with_interval(interval)
            .with_retry(RetryConfig::default().with_max_delay(Duration::from_millis(10)))
            .start();

        for _ in 0..400 {
            if ticker.pulls.load(Ordering::SeqCst) >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.shutdown().await;

        let after_shutdown = ticker.pulls.load(Ordering::SeqCst);
        assert!(after_shutdown >= 3);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(ticker.pulls.load(Ordering::SeqCst), after_shutdown);
    }
}
