//! Trailing-edge debounce for transport commands.
//!
//! The first command of a burst runs immediately. Commands arriving within
//! the key's interval after the last execution are collapsed into a single
//! trailing execution, scheduled for the end of the interval, so the last
//! intent of the burst is never lost.
//!
//! A timer that is superseded at the very moment it starts firing may still
//! run its command. The gate tolerates this: the stale firing records an
//! execution but never disarms the newer pending timer.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{ Duration, Instant };

use crate::timer::{ Timer, TimerHandle };

/// Identifies one scheduled trailing execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Decision for a submitted command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Run it now
    Immediate,
    /// Do not run now; a trailing execution fires after `delay`
    Trailing { delay: Duration },
}

/// Observable state of one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Cooling,
    Pending,
}

#[derive(Debug)]
enum Slot {
    Cooling {
        last: Instant,
    },
    Pending {
        last: Instant,
        id: TimerId,
        handle: TimerHandle,
    },
}

impl Slot {
    fn last_execution(&self) -> Instant {
        match self {
            Slot::Cooling { last } | Slot::Pending { last, .. } => *last,
        }
    }
}

pub struct DebounceGate<K> {
    intervals: HashMap<K, Duration>,
    default_interval: Duration,
    /// Keys without an entry are idle
    slots: HashMap<K, Slot>,
    timer: Arc<dyn Timer>,
    next_id: u64,
}

impl<K> DebounceGate<K>
where
    K: Copy + Eq + Hash + Debug,
{
    pub fn new(timer: Arc<dyn Timer>, default_interval: Duration) -> Self {
        Self {
            intervals: HashMap::new(),
            default_interval,
            slots: HashMap::new(),
            timer,
            next_id: 0,
        }
    }

    pub fn with_interval(mut self, key: K, interval: Duration) -> Self {
        self.set_interval(key, interval);
        self
    }

    pub fn set_interval(&mut self, key: K, interval: Duration) {
        self.intervals.insert(key, interval);
    }

    pub fn interval(&self, key: K) -> Duration {
        self.intervals.get(&key).copied().unwrap_or(self.default_interval)
    }

    pub fn phase(&self, key: K) -> Phase {
        match self.slots.get(&key) {
            None => Phase::Idle,
            Some(Slot::Cooling { .. }) => Phase::Cooling,
            Some(Slot::Pending { .. }) => Phase::Pending,
        }
    }

    /// Decide whether the command for `key` runs now.
    ///
    /// On [`Admission::Trailing`], any earlier pending timer for the key is
    /// cancelled and `on_fire` is scheduled in its place; it receives the id
    /// to pass back to [`fire`](Self::fire).
    pub fn submit<F>(&mut self, key: K, now: Instant, on_fire: F) -> Admission
    where
        F: FnOnce(TimerId) + Send + 'static,
    {
        let interval = self.interval(key);
        // Dropping the previous slot cancels its pending timer, if any
        let last = self.slots.remove(&key).map(|slot| slot.last_execution());

        let elapsed = last.map(|last| now.saturating_duration_since(last));
        match (last, elapsed) {
            (Some(last), Some(elapsed)) if elapsed < interval => {
                let delay = interval - elapsed;
                let id = TimerId(self.next_id);
                self.next_id += 1;

                let handle = self.timer.schedule(delay, Box::new(move || on_fire(id)));
                self.slots.insert(key, Slot::Pending { last, id, handle });
                log::debug!("{:?} throttled, trailing run in {:?}", key, delay);
                Admission::Trailing { delay }
            }
            _ => {
                self.slots.insert(key, Slot::Cooling { last: now });
                Admission::Immediate
            }
        }
    }

    /// Record that the trailing timer `id` for `key` fired.
    ///
    /// Returns `false` when the timer had already been superseded; the caller
    /// still runs the command in that case.
    pub fn fire(&mut self, key: K, id: TimerId, now: Instant) -> bool {
        let armed = matches!(
            self.slots.get(&key),
            Some(Slot::Pending { id: armed, .. }) if *armed == id
        );
        if armed {
            self.slots.insert(key, Slot::Cooling { last: now });
            return true;
        }

        log::debug!("{:?} timer {:?} fired after being superseded", key, id);
        if let Some(Slot::Pending { last, .. } | Slot::Cooling { last }) = self.slots.get_mut(&key) {
            *last = now;
        } else {
            self.slots.insert(key, Slot::Cooling { last: now });
        }
        false
    }

    /// Cancel every pending timer and forget all execution times
    pub fn reset(&mut self) {
        self.slots.clear();
    }
}

impl<K> Debug for DebounceGate<K>
where
    K: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebounceGate")
            .field("intervals", &self.intervals)
            .field("default_interval", &self.default_interval)
            .field("slots", &self.slots)
            .finish()
    }
}
