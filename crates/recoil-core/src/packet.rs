//! Wire-level data types exchanged between roles
//!
//! Logical layout per message:
//!
//! ```text
//! InputPacket   = { packet_number: u32, payload }
//! StateSnapshot = { tick_number: u32, input_packet_number: u32, body, events: u8 }
//! ControlPacket = { time_dilation: f32 }
//! ```

use crate::time::{PacketNumber, TickNumber};
use serde::{Deserialize, Serialize};

/// One unit of locally produced input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputPacket<I> {
    /// Sequence number of this packet
    pub packet_number: PacketNumber,
    /// User-defined input payload
    pub payload: I,
}

impl<I> InputPacket<I> {
    /// Create a new input packet
    pub fn new(packet_number: PacketNumber, payload: I) -> Self {
        Self {
            packet_number,
            payload,
        }
    }
}

/// Up to eight one-shot events raised during a single tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventMask(pub u8);

impl EventMask {
    /// Number of distinct events a mask can carry
    pub const CAPACITY: u8 = 8;

    /// An empty mask
    pub fn empty() -> Self {
        Self(0)
    }

    /// Raise an event. Returns `false` if the event index is out of range.
    pub fn raise(&mut self, event: u8) -> bool {
        if event >= Self::CAPACITY {
            return false;
        }
        self.0 |= 1 << event;
        true
    }

    /// Check whether an event was raised
    pub fn contains(&self, event: u8) -> bool {
        event < Self::CAPACITY && self.0 & (1 << event) != 0
    }

    /// Check whether no events were raised
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Merge the events of another mask into this one
    pub fn merge(&mut self, other: EventMask) {
        self.0 |= other.0;
    }

    /// Take the raised events, leaving this mask empty
    pub fn take(&mut self) -> EventMask {
        std::mem::take(self)
    }

    /// Iterate over raised event indices in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..Self::CAPACITY).filter(move |e| self.contains(*e))
    }
}

/// A simulation state tagged with the tick and input that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot<S> {
    /// Tick that produced this state
    pub tick_number: TickNumber,
    /// Input packet consumed on that tick
    pub input_packet_number: PacketNumber,
    /// User-defined simulation state
    pub body: S,
    /// Events raised while producing this state
    pub events: EventMask,
}

impl<S> StateSnapshot<S> {
    /// Create a snapshot with no events
    pub fn new(tick_number: TickNumber, input_packet_number: PacketNumber, body: S) -> Self {
        Self {
            tick_number,
            input_packet_number,
            body,
            events: EventMask::empty(),
        }
    }

    /// Check whether this snapshot carries a real tick
    pub fn is_valid(&self) -> bool {
        self.tick_number.is_valid()
    }
}

impl<S: PartialEq> StateSnapshot<S> {
    /// Compare the simulated outcome of two snapshots for the same tick
    ///
    /// Only the consumed input and the body count; events are a side channel
    /// and may be accumulated differently by the authority.
    pub fn matches(&self, other: &Self) -> bool {
        self.input_packet_number == other.input_packet_number && self.body == other.body
    }
}

impl<S: Default> Default for StateSnapshot<S> {
    fn default() -> Self {
        Self::new(TickNumber::INVALID, PacketNumber::INVALID, S::default())
    }
}

/// Advice from the authority to the predicting client about its tick rate
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlPacket {
    /// Suggested time dilation in `[-1, 1]`
    ///
    /// Positive asks the client to speed up, negative to slow down.
    pub time_dilation: f32,
}

impl ControlPacket {
    /// Create a control packet, clamping the dilation into range
    pub fn new(time_dilation: f32) -> Self {
        Self {
            time_dilation: time_dilation.clamp(-1.0, 1.0),
        }
    }
}
