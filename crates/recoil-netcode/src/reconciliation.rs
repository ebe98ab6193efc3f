//! Server state reconciliation
//!
//! Runs once per real-time tick on a predicting client, after the new local
//! snapshot has been recorded. Compares the latest authoritative snapshot
//! against local history and decides between doing nothing, acknowledging,
//! or rewinding to the authority and resimulating forward.
//!
//! ```text
//! NoAuthorityYet ──▶ Tracking ──┬──▶ Synced    (history matches: ack)
//!                               ├──▶ Ahead     (authority past local tick: snap)
//!                               └──▶ Diverged  (mismatch or missing history: rewind)
//! ```
//!
//! The reconciler only rewinds bookkeeping (history, acked tick, input
//! cursor). Adopting the authoritative body and running the forced ticks is
//! left to the driver, which owns the simulator and the tick counter.

use crate::input_buffer::ProducerInputBuffer;
use recoil_core::{PacketNumber, StateHistory, StateSnapshot, TickNumber};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

/// Where the reconciler currently stands relative to the authority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcileState {
    /// No authoritative snapshot received yet
    NoAuthorityYet,
    /// Receiving snapshots, nothing to act on yet
    Tracking,
    /// Last action snapped forward to an authority ahead of us
    Ahead,
    /// Last comparison matched
    Synced,
    /// Last comparison mismatched and triggered a rewind
    Diverged,
}

/// Why a rewind happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewindReason {
    /// Authority tick is past the local tick
    Ahead,
    /// Local state at the authoritative tick differs
    Diverged,
    /// No local state was recorded for the authoritative tick
    HistoryMissing,
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing received from the authority
    NoAuthorityYet,
    /// Latest authoritative snapshot was already processed
    AlreadyAcked,
    /// Authority has not consumed any input yet
    AuthorityIdle,
    /// Local history matched the authority
    Synced {
        tick: TickNumber,
        packet: PacketNumber,
    },
    /// Bookkeeping was rewound; the driver must adopt the snapshot and resimulate
    Rewind {
        reason: RewindReason,
        tick: TickNumber,
        resimulate: u32,
    },
}

/// Reconciliation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileStats {
    /// Snapshots confirmed by matching history
    pub acks: u64,
    /// Snaps to an authority that was ahead
    pub snaps: u64,
    /// Rewinds caused by state mismatch
    pub divergences: u64,
    /// Rewinds caused by missing history
    pub missing_history: u64,
    /// Total forced ticks requested
    pub forced_ticks: u64,
}

/// Compares predicted history against authoritative snapshots
#[derive(Debug, Clone)]
pub struct Reconciler {
    forward_prediction_frames: u32,
    divergence_error_threshold: u32,
    /// Last tick at which client and authority agreed
    last_acked: TickNumber,
    state: ReconcileState,
    stats: ReconcileStats,
}

impl Reconciler {
    /// Create a reconciler
    pub fn new(forward_prediction_frames: u32, divergence_error_threshold: u32) -> Self {
        Self {
            forward_prediction_frames,
            divergence_error_threshold,
            last_acked: TickNumber::INVALID,
            state: ReconcileState::NoAuthorityYet,
            stats: ReconcileStats::default(),
        }
    }

    /// Run one reconciliation pass
    ///
    /// `current` is the snapshot produced by the tick that just ran.
    pub fn reconcile<I: Clone, S: PartialEq>(
        &mut self,
        authority: &StateSnapshot<S>,
        current: &StateSnapshot<S>,
        history: &mut StateHistory<S>,
        input: &mut ProducerInputBuffer<I>,
    ) -> ReconcileOutcome {
        if !authority.tick_number.is_valid() {
            self.state = ReconcileState::NoAuthorityYet;
            return ReconcileOutcome::NoAuthorityYet;
        }

        if self.last_acked.is_valid() && authority.tick_number <= self.last_acked {
            return ReconcileOutcome::AlreadyAcked;
        }

        if !authority.input_packet_number.is_valid() {
            // The client has been predicting since its first tick; there is
            // nothing meaningful to compare against yet.
            self.state = ReconcileState::Tracking;
            return ReconcileOutcome::AuthorityIdle;
        }

        if authority.tick_number > current.tick_number {
            warn!(
                authority_tick = %authority.tick_number,
                local_tick = %current.tick_number,
                "Client behind authority, jumping to authority state and resimulating"
            );
            self.state = ReconcileState::Ahead;
            self.stats.snaps += 1;
            return self.rewind(RewindReason::Ahead, authority, history, input);
        }

        match history.drain_until(authority.tick_number) {
            Ok(local) if local.matches(authority) => {
                self.last_acked = authority.tick_number;
                input.ack(authority.input_packet_number);
                self.state = ReconcileState::Synced;
                self.stats.acks += 1;
                debug!(
                    tick = %authority.tick_number,
                    packet = %authority.input_packet_number,
                    buffered = input.buffer_size(),
                    "Acked authority state"
                );
                ReconcileOutcome::Synced {
                    tick: authority.tick_number,
                    packet: authority.input_packet_number,
                }
            }
            Ok(_) => {
                let drift = authority
                    .tick_number
                    .steps_to(current.tick_number)
                    .unwrap_or(0);
                if drift > self.divergence_error_threshold {
                    error!(
                        tick = %authority.tick_number,
                        packet = %authority.input_packet_number,
                        drift,
                        "Rewinding and resimulating after divergence"
                    );
                } else {
                    warn!(
                        tick = %authority.tick_number,
                        packet = %authority.input_packet_number,
                        drift,
                        "Rewinding and resimulating after divergence"
                    );
                }
                self.state = ReconcileState::Diverged;
                self.stats.divergences += 1;
                self.rewind(RewindReason::Diverged, authority, history, input)
            }
            Err(err) => {
                error!(
                    tick = %authority.tick_number,
                    local_tick = %current.tick_number,
                    "{err}, rewinding to authority state"
                );
                self.state = ReconcileState::Diverged;
                self.stats.missing_history += 1;
                self.rewind(RewindReason::HistoryMissing, authority, history, input)
            }
        }
    }

    fn rewind<I: Clone, S>(
        &mut self,
        reason: RewindReason,
        authority: &StateSnapshot<S>,
        history: &mut StateHistory<S>,
        input: &mut ProducerInputBuffer<I>,
    ) -> ReconcileOutcome {
        history.clear();
        self.last_acked = authority.tick_number;

        // Everything up to the authority's packet is settled; replay the rest.
        input.ack(authority.input_packet_number);
        input.rewind(authority.input_packet_number);

        let buffered = u32::try_from(input.buffer_size()).unwrap_or(u32::MAX);
        let resimulate = self.forward_prediction_frames.max(buffered);
        self.stats.forced_ticks += u64::from(resimulate);

        ReconcileOutcome::Rewind {
            reason,
            tick: authority.tick_number,
            resimulate,
        }
    }

    /// Last tick at which client and authority agreed
    pub fn last_acked(&self) -> TickNumber {
        self.last_acked
    }

    /// Current state of the reconciler
    pub fn state(&self) -> ReconcileState {
        self.state
    }

    /// Get reconciliation counters
    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }
}
