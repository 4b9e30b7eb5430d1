//! Timer scheduling for the interaction core.
//!
//! This module provides the [`Scheduler`] seam the rest of the engine is
//! written against, and [`TimerQueue`], a deterministic implementation whose
//! clock only moves when the owner advances it. Under test the owner is the
//! test itself; at runtime it is the tokio driver in [`crate::runtime`].

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Handle identifying one scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    /// Raw sequence number of the timer.
    pub fn sequence(self) -> u64 {
        self.0
    }
}

/// Something that can run a payload after a delay.
///
/// Timers with equal deadlines must fire in the order they were scheduled,
/// and `cancel` must take effect if it is called before the timer fires.
pub trait Scheduler<T> {
    /// Schedule `payload` to fire `delay` after the scheduler's current time.
    fn schedule_after(&mut self, delay: Duration, payload: T) -> TimerHandle;

    /// Cancel a pending timer. Returns `false` if it already fired or was
    /// never scheduled.
    fn cancel(&mut self, handle: TimerHandle) -> bool;
}

/// A timer that came due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired<T> {
    /// Handle the timer was scheduled under.
    pub handle: TimerHandle,
    /// Time the timer was due, as an offset from the queue's epoch.
    pub at: Duration,
    /// Scheduled payload.
    pub payload: T,
}

/// Deterministic timer queue driven by an externally advanced clock.
///
/// Time is an offset from the queue's creation. Pending timers are ordered
/// by `(deadline, sequence)`, which gives stable firing order for equal
/// deadlines.
#[derive(Debug)]
pub struct TimerQueue<T> {
    now: Duration,
    next_seq: u64,
    pending: BTreeMap<(Duration, u64), T>,
    deadlines: HashMap<u64, Duration>,
}

impl<T> TimerQueue<T> {
    /// Create an empty queue at time zero.
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            next_seq: 0,
            pending: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }

    /// Current clock reading.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Number of timers still pending.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if no timers are pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Deadline of the earliest pending timer.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.pending.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Pop the earliest timer due at or before `until`.
    ///
    /// The clock moves to the popped timer's deadline so that anything
    /// scheduled while handling it is relative to its firing time. Once
    /// nothing more is due, call [`TimerQueue::advance_to`] to settle the
    /// clock at `until`.
    pub fn pop_due(&mut self, until: Duration) -> Option<Fired<T>> {
        let (&(deadline, seq), _) = self.pending.first_key_value()?;
        if deadline > until {
            return None;
        }
        let payload = self.pending.remove(&(deadline, seq))?;
        self.deadlines.remove(&seq);
        self.now = self.now.max(deadline);
        Some(Fired {
            handle: TimerHandle(seq),
            at: deadline,
            payload,
        })
    }

    /// Move the clock forward to `until` without firing anything.
    ///
    /// The clock never moves backwards.
    pub fn advance_to(&mut self, until: Duration) {
        self.now = self.now.max(until);
    }

    /// Drain every timer due at or before `until`, in firing order, and
    /// settle the clock there.
    pub fn drain_until(&mut self, until: Duration) -> Vec<Fired<T>> {
        let mut fired = Vec::new();
        while let Some(timer) = self.pop_due(until) {
            fired.push(timer);
        }
        self.advance_to(until);
        fired
    }

    /// Check if any pending timer's payload matches `predicate`.
    pub fn any<F>(&self, predicate: F) -> bool
    where
        F: FnMut(&T) -> bool,
    {
        self.pending.values().any(predicate)
    }

    /// Cancel every pending timer whose payload matches `predicate`.
    ///
    /// Returns the number of timers cancelled.
    pub fn cancel_where<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let doomed: Vec<(Duration, u64)> = self
            .pending
            .iter()
            .filter(|(_, payload)| predicate(payload))
            .map(|(key, _)| *key)
            .collect();
        for key in &doomed {
            self.pending.remove(key);
            self.deadlines.remove(&key.1);
        }
        doomed.len()
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> for TimerQueue<T> {
    fn schedule_after(&mut self, delay: Duration, payload: T) -> TimerHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        let deadline = self.now + delay;
        self.pending.insert((deadline, seq), payload);
        self.deadlines.insert(seq, deadline);
        TimerHandle(seq)
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.deadlines.remove(&handle.0) {
            Some(deadline) => self.pending.remove(&(deadline, handle.0)).is_some(),
            None => false,
        }
    }
}

/// Convert a millisecond count from configuration into a [`Duration`].
pub fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
