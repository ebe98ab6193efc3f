//! Bounded log of locally produced states awaiting authoritative confirmation
//!
//! A predicting client records every tick it simulates. When an authoritative
//! snapshot arrives, `drain_until` discards everything older than the
//! authoritative tick and hands back the local state for that tick so the two
//! can be compared.
//!
//! # Example
//!
//! ```rust
//! use recoil_core::{PacketNumber, StateHistory, StateSnapshot, TickNumber};
//!
//! let mut history = StateHistory::new(64);
//! for tick in 0..4 {
//!     history.push(StateSnapshot::new(TickNumber(tick), PacketNumber(tick), tick * 10));
//! }
//!
//! let matched = history.drain_until(TickNumber(2)).unwrap();
//! assert_eq!(matched.body, 20);
//! assert_eq!(history.len(), 1);
//! ```

use crate::{Error, Result, StateSnapshot, TickNumber};
use std::collections::VecDeque;

/// Append/drain queue of snapshots ordered by tick number
#[derive(Debug, Clone)]
pub struct StateHistory<S> {
    /// Unacknowledged snapshots (oldest first)
    snapshots: VecDeque<StateSnapshot<S>>,
    /// Maximum number of snapshots retained
    capacity: usize,
}

impl<S> StateHistory<S> {
    /// Create a history holding at most `capacity` snapshots
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than 0");
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a newly produced snapshot
    ///
    /// Tick numbers must be strictly increasing between clears. When the
    /// history is full the oldest snapshot is evicted and returned.
    pub fn push(&mut self, snapshot: StateSnapshot<S>) -> Option<StateSnapshot<S>> {
        debug_assert!(
            self.newest_tick()
                .map_or(true, |newest| snapshot.tick_number > newest),
            "state history ticks must be strictly increasing"
        );

        let evicted = if self.snapshots.len() >= self.capacity {
            self.snapshots.pop_front()
        } else {
            None
        };
        self.snapshots.push_back(snapshot);
        evicted
    }

    /// Pop snapshots in order until one with `tick` is found
    ///
    /// Everything older than `tick` is discarded along the way. If no
    /// snapshot has that tick the history ends up empty and
    /// `Error::HistoryNotFound` is returned.
    pub fn drain_until(&mut self, tick: TickNumber) -> Result<StateSnapshot<S>> {
        while let Some(snapshot) = self.snapshots.pop_front() {
            if snapshot.tick_number == tick {
                return Ok(snapshot);
            }
        }
        Err(Error::HistoryNotFound(tick.0))
    }

    /// Drop every recorded snapshot
    pub fn clear(&mut self) {
        self.snapshots.clear();
    }

    /// Get the number of recorded snapshots
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Check if the history is empty
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Get the capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tick of the oldest recorded snapshot
    pub fn oldest_tick(&self) -> Option<TickNumber> {
        self.snapshots.front().map(|s| s.tick_number)
    }

    /// Tick of the newest recorded snapshot
    pub fn newest_tick(&self) -> Option<TickNumber> {
        self.snapshots.back().map(|s| s.tick_number)
    }

    /// Iterate over recorded snapshots (oldest first)
    pub fn iter(&self) -> impl Iterator<Item = &StateSnapshot<S>> {
        self.snapshots.iter()
    }
}
