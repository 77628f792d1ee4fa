//! Per-client fixed-window admission control with a bounded FIFO queue.
//!
//! # Partitions
//!
//! Every client key owns a [`Partition`]: a permit counter, the instant its
//! current window opened, and a wait queue of pending requests keyed by
//! arrival ticket.
//!
//! ```text
//! admit(key)
//!   → DashMap shard lookup (or insert)         ← shard lock, released at once
//!   → lock this key's partition                ← per-key critical section
//!       refresh: window over? zero count, drain queue oldest-first
//!       permit free and nobody queued → Allowed
//!       queue has room               → Queued(Waiter)
//!       otherwise                    → Rejected
//! ```
//!
//! Queued requests hold a [`Waiter`]. It wakes either when a refresh hands it
//! a permit or when its window closes, in which case it runs the refresh
//! itself, so a saturated key drains without further traffic.
//!
//! Partition locks are `std::sync::Mutex` and are never held across an
//! `.await`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Key shared by every request whose peer address is unknown.
///
/// All such clients draw from one partition.
pub const ANONYMOUS_KEY: &str = "anonymous";

/// Longest window a [`RateLimiter`] will use. Longer windows are clamped.
pub const MAX_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Limits applied to every partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitOptions {
    /// Permits granted per window.
    pub permit_limit: u32,
    /// Window length.
    pub window: Duration,
    /// Requests allowed to wait for the next window.
    pub queue_limit: u32,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            permit_limit: 10,
            window: Duration::from_secs(60),
            queue_limit: 5,
        }
    }
}

/// Outcome of [`RateLimiter::admit`].
#[derive(Debug)]
pub enum Admission {
    /// A permit was granted; proceed.
    Allowed,
    /// No permit left; await [`Waiter::admitted`] before proceeding.
    Queued(Waiter),
    /// Permits and queue are both exhausted.
    Rejected {
        /// Time until the current window closes.
        retry_after: Duration,
    },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, Admission::Queued(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Admission::Rejected { .. })
    }
}

#[derive(Debug)]
struct Partition {
    window_start: Instant,
    granted: u32,
    queue: BTreeMap<u64, oneshot::Sender<()>>,
    next_ticket: u64,
    retired: bool,
}

impl Partition {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            granted: 0,
            queue: BTreeMap::new(),
            next_ticket: 0,
            retired: false,
        }
    }

    fn window_end(&self, options: &RateLimitOptions) -> Instant {
        self.window_start
            .checked_add(options.window)
            .unwrap_or_else(|| self.window_start + MAX_WINDOW)
    }

    /// Opens a new window if the current one has closed, then hands the
    /// fresh permits to queued requests in arrival order.
    ///
    /// A ticket whose receiver is gone (the request was cancelled between
    /// being drained and noticing) does not consume a permit.
    fn refresh(&mut self, now: Instant, options: &RateLimitOptions) {
        if now < self.window_end(options) {
            return;
        }
        self.window_start = now;
        self.granted = 0;
        while self.granted < options.permit_limit {
            let Some((_, tx)) = self.queue.pop_first() else { break };
            if tx.send(()).is_ok() {
                self.granted += 1;
            }
        }
    }

    fn is_idle(&self, now: Instant, options: &RateLimitOptions) -> bool {
        self.queue.is_empty() && now >= self.window_end(options)
    }
}

type SharedPartition = Arc<Mutex<Partition>>;

fn lock(partition: &Mutex<Partition>) -> MutexGuard<'_, Partition> {
    partition.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Partitioned fixed-window rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    options: RateLimitOptions,
    partitions: DashMap<String, SharedPartition>,
}

impl RateLimiter {
    /// Builds a limiter. A window longer than [`MAX_WINDOW`] is clamped to it.
    pub fn new(mut options: RateLimitOptions) -> Self {
        if options.window > MAX_WINDOW {
            tracing::warn!(
                requested_secs = options.window.as_secs(),
                max_secs = MAX_WINDOW.as_secs(),
                "rate limit window clamped"
            );
            options.window = MAX_WINDOW;
        }
        Self { options, partitions: DashMap::new() }
    }

    pub fn options(&self) -> &RateLimitOptions {
        &self.options
    }

    /// Number of partitions currently tracked.
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Decides whether a request for `key` may proceed now, must wait, or is
    /// rejected.
    ///
    /// Decisions for one key are linearizable: two concurrent calls never
    /// both receive the last permit.
    pub fn admit(&self, key: &str) -> Admission {
        loop {
            let partition = self.partition(key);
            let mut state = lock(&partition);
            if state.retired {
                // Evicted between lookup and lock; look it up again.
                continue;
            }

            let now = Instant::now();
            state.refresh(now, &self.options);

            if state.granted < self.options.permit_limit && state.queue.is_empty() {
                state.granted += 1;
                return Admission::Allowed;
            }

            if state.queue.len() < self.options.queue_limit as usize {
                let ticket = state.next_ticket;
                state.next_ticket += 1;
                let (tx, rx) = oneshot::channel();
                state.queue.insert(ticket, tx);
                drop(state);
                return Admission::Queued(Waiter {
                    ticket,
                    rx,
                    partition,
                    options: self.options,
                    settled: false,
                });
            }

            let retry_after = state.window_end(&self.options).saturating_duration_since(now);
            return Admission::Rejected { retry_after };
        }
    }

    /// Drops partitions whose window has closed and whose queue is empty.
    ///
    /// Returns how many were removed.
    pub fn purge_idle(&self) -> usize {
        let now = Instant::now();
        let before = self.partitions.len();
        self.partitions.retain(|_, partition| {
            let mut state = lock(partition);
            if state.is_idle(now, &self.options) {
                state.retired = true;
                false
            } else {
                true
            }
        });
        before.saturating_sub(self.partitions.len())
    }

    fn partition(&self, key: &str) -> SharedPartition {
        if let Some(existing) = self.partitions.get(key) {
            return Arc::clone(existing.value());
        }
        let entry = self
            .partitions
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(Partition::new(Instant::now()))));
        Arc::clone(entry.value())
    }
}

/// A request parked in a partition's wait queue.
///
/// Dropping a `Waiter` before it is admitted removes its ticket from the
/// queue; other queued requests keep their place.
#[derive(Debug)]
pub struct Waiter {
    ticket: u64,
    rx: oneshot::Receiver<()>,
    partition: SharedPartition,
    options: RateLimitOptions,
    settled: bool,
}

impl Waiter {
    /// Arrival ticket within this partition. Lower tickets are served first.
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Waits until a permit is handed to this request.
    ///
    /// Returns `false` if the queue entry vanished without a permit, which
    /// callers should treat as a rejection.
    pub async fn admitted(mut self) -> bool {
        loop {
            let deadline = lock(&self.partition).window_end(&self.options);

            let woke = tokio::select! {
                res = &mut self.rx => Some(res.is_ok()),
                () = tokio::time::sleep_until(deadline) => None,
            };

            match woke {
                Some(granted) => {
                    self.settled = true;
                    return granted;
                }
                None => lock(&self.partition).refresh(Instant::now(), &self.options),
            }
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if !self.settled {
            lock(&self.partition).queue.remove(&self.ticket);
        }
    }
}
