//! Push notification dispatch gate.
//!
//! Delivery itself (Web Push, APNs) is an external collaborator and
//! is not implemented here — only the `PushSender` seam and the
//! rate-limited call site that decides *when* to fire one. The limiter
//! mirrors the needs-input cooldown exactly (300 s per session) plus a
//! 10/hour global bucket, both owned by whichever task holds the limiter —
//! no shared-state locking.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;

pub const PER_SESSION_COOLDOWN: Duration = Duration::from_secs(300);
pub const GLOBAL_WINDOW: Duration = Duration::from_secs(3600);
pub const GLOBAL_BUDGET: usize = 10;

/// Delivers a single "needs input" notification to every registered
/// subscription. A concrete implementation (HTTP POST to a delivery
/// endpoint standing in for the real Web Push/APNs gateways) lives in the
/// server crate, which owns the `reqwest` client.
pub trait PushSender: Send + Sync {
    fn notify_needs_input<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, ()>;
}

impl<T: PushSender + ?Sized> PushSender for Box<T> {
    fn notify_needs_input<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, ()> {
        (**self).notify_needs_input(session_id)
    }
}

/// Wraps a [`PushSender`] with a rate limiter. Owned
/// exclusively by the needs-input detector's task.
pub struct RateLimitedPush<S: PushSender> {
    inner: S,
    last_sent: HashMap<String, Instant>,
    global_sent: VecDeque<Instant>,
}

impl<S: PushSender> RateLimitedPush<S> {
    pub fn new(inner: S) -> Self {
        RateLimitedPush {
            inner,
            last_sent: HashMap::new(),
            global_sent: VecDeque::new(),
        }
    }

    /// Attempt delivery, returning whether it was actually sent (`false`
    /// means it was suppressed by the per-session or global limiter).
    pub async fn try_notify(&mut self, session_id: &str) -> bool {
        let now = Instant::now();

        if let Some(last) = self.last_sent.get(session_id) {
            if now.duration_since(*last) < PER_SESSION_COOLDOWN {
                return false;
            }
        }

        while let Some(front) = self.global_sent.front() {
            if now.duration_since(*front) >= GLOBAL_WINDOW {
                self.global_sent.pop_front();
            } else {
                break;
            }
        }
        if self.global_sent.len() >= GLOBAL_BUDGET {
            return false;
        }

        self.inner.notify_needs_input(session_id).await;
        self.last_sent.insert(session_id.to_string(), now);
        self.global_sent.push_back(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSender(Arc<AtomicUsize>);

    impl PushSender for CountingSender {
        fn notify_needs_input<'a>(&'a self, _session_id: &'a str) -> BoxFuture<'a, ()> {
            let counter = self.0.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    #[tokio::test]
    async fn per_session_cooldown_suppresses_immediate_repeat() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut limiter = RateLimitedPush::new(CountingSender(counter.clone()));

        assert!(limiter.try_notify("s1").await);
        assert!(!limiter.try_notify("s1").await);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_sessions_are_independent() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut limiter = RateLimitedPush::new(CountingSender(counter.clone()));

        assert!(limiter.try_notify("s1").await);
        assert!(limiter.try_notify("s2").await);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn global_budget_caps_total_sends_across_sessions() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut limiter = RateLimitedPush::new(CountingSender(counter.clone()));

        for i in 0..GLOBAL_BUDGET {
            assert!(limiter.try_notify(&format!("s{i}")).await);
        }
        assert!(!limiter.try_notify("overflow").await);
        assert_eq!(counter.load(Ordering::SeqCst), GLOBAL_BUDGET);
    }
}
