// 🔄 Sync collaborator + fetch-completion wait
//
// The remote sync service is external; this module only names the two things
// the merge flow needs from it, and implements the bounded polling loop that
// waits for a fetch to settle after a share is accepted.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::SyncError;
use crate::invitation::ShareInvitation;

#[async_trait]
pub trait SyncService: Send + Sync {
    /// Accept the invitation; shared records arrive through a later fetch
    async fn accept_share(&self, invitation: &ShareInvitation) -> Result<(), SyncError>;

    /// True while the sync layer is still pulling remote changes
    fn is_fetching_changes(&self) -> bool;
}

/// How a fetch wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchWait {
    Completed,
    /// Still fetching at the deadline; callers proceed anyway
    TimedOut,
    Cancelled,
}

/// Poll `is_fetching_changes` every `interval` until it clears or `timeout` elapses
pub async fn wait_for_fetch(
    sync: &dyn SyncService,
    interval: Duration,
    timeout: Duration,
    cancel: &CancellationToken,
) -> FetchWait {
    let deadline = Instant::now() + timeout;

    loop {
        if cancel.is_cancelled() {
            return FetchWait::Cancelled;
        }
        if !sync.is_fetching_changes() {
            return FetchWait::Completed;
        }

        let now = Instant::now();
        if now >= deadline {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "fetch still running, proceeding anyway");
            return FetchWait::TimedOut;
        }

        let pause = interval.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => return FetchWait::Cancelled,
            _ = sleep(pause) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reports "fetching" for the first `busy_polls` polls
    struct CountdownSync {
        busy_polls: usize,
        polls: AtomicUsize,
    }

    impl CountdownSync {
        fn new(busy_polls: usize) -> Self {
            CountdownSync {
                busy_polls,
                polls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SyncService for CountdownSync {
        async fn accept_share(&self, _invitation: &ShareInvitation) -> Result<(), SyncError> {
            Ok(())
        }

        fn is_fetching_changes(&self) -> bool {
            self.polls.fetch_add(1, Ordering::SeqCst) < self.busy_polls
        }
    }

    #[tokio::test]
    async fn test_completes_when_fetch_clears() {
        let sync = CountdownSync::new(3);
        let cancel = CancellationToken::new();

        let result = wait_for_fetch(
            &sync,
            Duration::from_millis(5),
            Duration::from_secs(5),
            &cancel,
        )
        .await;

        assert_eq!(result, FetchWait::Completed);
        assert_eq!(sync.polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_times_out_on_endless_fetch() {
        let sync = CountdownSync::new(usize::MAX);
        let cancel = CancellationToken::new();

        let started = std::time::Instant::now();
        let result = wait_for_fetch(
            &sync,
            Duration::from_millis(5),
            Duration::from_millis(40),
            &cancel,
        )
        .await;

        assert_eq!(result, FetchWait::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_wait() {
        let sync = CountdownSync::new(usize::MAX);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = wait_for_fetch(
            &sync,
            Duration::from_millis(5),
            Duration::from_secs(10),
            &cancel,
        )
        .await;

        assert_eq!(result, FetchWait::Cancelled);
    }
}
