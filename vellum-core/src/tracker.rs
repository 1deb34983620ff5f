//! In-flight request tracking.
//!
//! Drives a global "all pending work settled" signal for a loading
//! overlay. Best-effort liveness only: resolving slightly early or late is
//! acceptable, deadlocking is not.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// Paths that never gate the loading overlay.
const AUTH_EXEMPT_PATHS: &[&str] = &[
    "/auth/login",
    "/auth/refresh",
    "/auth/logout",
    "/auth/register",
    "/auth/send-code",
];

#[derive(Debug, Default)]
struct TrackerInner {
    pending: AtomicUsize,
    idle: Notify,
}

/// Tracks in-flight requests; cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct RequestTracker {
    inner: Arc<TrackerInner>,
}

/// RAII registration of one in-flight request.
///
/// Dropping the guard removes the request from the pending set regardless
/// of how the request settled.
#[derive(Debug)]
pub struct TrackGuard {
    inner: Arc<TrackerInner>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dispatch. Returns `None` for auth-exempt paths, which
    /// are never waited on.
    pub fn track(&self, path: &str) -> Option<TrackGuard> {
        if AUTH_EXEMPT_PATHS.iter().any(|exempt| path.contains(exempt)) {
            return None;
        }
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        Some(TrackGuard {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Number of tracked requests currently in flight.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Wait until the pending set is empty or the timeout elapses.
    ///
    /// Returns `true` when idle was reached. On timeout the pending count
    /// is force-cleared so a stuck request can never wedge the overlay,
    /// and `false` is returned.
    pub async fn wait_for_idle(&self, timeout: Duration) -> bool {
        if self.pending() == 0 {
            return true;
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.inner.idle.notified();
            if self.pending() == 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                tracing::warn!(
                    pending = self.pending(),
                    "timed out waiting for in-flight requests, force-clearing"
                );
                self.inner.pending.store(0, Ordering::Release);
                self.inner.idle.notify_waiters();
                return false;
            }
        }
    }
}

impl Drop for TrackGuard {
    fn drop(&mut self) {
        // Saturating: a force-clear may already have zeroed the count.
        let _ = self
            .inner
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                Some(count.saturating_sub(1))
            });
        if self.inner.pending.load(Ordering::Acquire) == 0 {
            self.inner.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_idle_when_nothing_tracked() {
        let tracker = RequestTracker::new();
        assert!(tracker.wait_for_idle(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_exempt_paths_are_not_tracked() {
        let tracker = RequestTracker::new();
        assert!(tracker.track("/auth/login").is_none());
        assert!(tracker.track("/auth/refresh").is_none());
        assert_eq!(tracker.pending(), 0);

        let guard = tracker.track("/category");
        assert!(guard.is_some());
        assert_eq!(tracker.pending(), 1);
    }

    #[tokio::test]
    async fn test_guard_drop_settles() {
        let tracker = RequestTracker::new();
        let guard = tracker.track("/category").unwrap();

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_for_idle(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);

        assert!(waiter.await.unwrap());
        assert_eq!(tracker.pending(), 0);
    }

    #[tokio::test]
    async fn test_timeout_force_clears() {
        let tracker = RequestTracker::new();
        let guard = tracker.track("/category").unwrap();

        let idle = tracker.wait_for_idle(Duration::from_millis(30)).await;
        assert!(!idle);
        assert_eq!(tracker.pending(), 0);

        // The late settlement must not underflow.
        drop(guard);
        assert_eq!(tracker.pending(), 0);
    }

    #[tokio::test]
    async fn test_multiple_guards() {
        let tracker = RequestTracker::new();
        let first = tracker.track("/category").unwrap();
        let second = tracker.track("/tag").unwrap();
        assert_eq!(tracker.pending(), 2);

        drop(first);
        assert_eq!(tracker.pending(), 1);

        drop(second);
        assert!(tracker.wait_for_idle(Duration::from_millis(10)).await);
    }
}
