//! Input buffering on both ends of the link
//!
//! - `ProducerInputBuffer` - predicting client side. Keeps every produced
//!   packet until the authority confirms consuming it, so a rewind can replay
//!   the same input.
//! - `AuthorityInputBuffer` - authority side. Reorders and de-duplicates
//!   received packets, tracks loss, and holds consumption back until enough
//!   packets are buffered to absorb jitter.
//! - `SlidingInputWindow` - the last few produced packets, re-sent with every
//!   emission so a single lost transmission is recovered by the next one.

use crate::{Error, Result};
use recoil_core::{InputPacket, PacketNumber};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::trace;

/// Produced input awaiting local consumption and authority confirmation
#[derive(Debug, Clone)]
pub struct ProducerInputBuffer<I> {
    /// Unacknowledged packets (oldest first)
    packets: VecDeque<InputPacket<I>>,
    /// Index into `packets` of the next packet to consume
    cursor: usize,
    /// Highest packet number the authority confirmed
    last_acked: PacketNumber,
    /// Most packets held before the oldest is evicted
    capacity: usize,
}

impl<I: Clone> ProducerInputBuffer<I> {
    /// Create an empty, unbounded buffer
    pub fn new() -> Self {
        Self::with_capacity(usize::MAX)
    }

    /// Create an empty buffer holding at most `capacity` packets
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            packets: VecDeque::new(),
            cursor: 0,
            last_acked: PacketNumber::INVALID,
            capacity: capacity.max(1),
        }
    }

    /// Queue a freshly produced packet for local consumption
    ///
    /// When the buffer is full the oldest packet is evicted and returned.
    pub fn queue_local(&mut self, packet: InputPacket<I>) -> Option<InputPacket<I>> {
        debug_assert!(
            self.packets
                .back()
                .map_or(true, |last| packet.packet_number > last.packet_number),
            "produced packet numbers must be strictly increasing"
        );
        let evicted = if self.packets.len() >= self.capacity {
            self.cursor = self.cursor.saturating_sub(1);
            self.packets.pop_front()
        } else {
            None
        };
        self.packets.push_back(packet);
        evicted
    }

    /// Take the next packet in production order
    ///
    /// The packet stays buffered until acknowledged so it can be replayed.
    pub fn consume_local(&mut self) -> Result<InputPacket<I>> {
        let packet = self
            .packets
            .get(self.cursor)
            .cloned()
            .ok_or(Error::BufferUnderflow)?;
        self.cursor += 1;
        Ok(packet)
    }

    /// Number of queued packets not yet consumed
    pub fn buffer_size(&self) -> usize {
        self.packets.len() - self.cursor
    }

    /// Discard every packet numbered `packet_number` or lower
    ///
    /// Acking a number at or below the last ack is a no-op.
    pub fn ack(&mut self, packet_number: PacketNumber) {
        if !packet_number.is_valid() {
            return;
        }
        if self.last_acked.is_valid() && packet_number <= self.last_acked {
            return;
        }

        while let Some(front) = self.packets.front() {
            if front.packet_number > packet_number {
                break;
            }
            self.packets.pop_front();
            self.cursor = self.cursor.saturating_sub(1);
        }
        self.last_acked = packet_number;
    }

    /// Replay from just after `packet_number` on the next `consume_local`
    pub fn rewind(&mut self, packet_number: PacketNumber) {
        self.cursor = if packet_number.is_valid() {
            self.packets
                .iter()
                .position(|p| p.packet_number > packet_number)
                .unwrap_or(self.packets.len())
        } else {
            0
        };
    }

    /// Highest acknowledged packet number
    pub fn last_acked(&self) -> PacketNumber {
        self.last_acked
    }

    /// Total packets held, consumed or not
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Check if nothing is held
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Newest produced packet number still held
    pub fn newest_packet(&self) -> Option<PacketNumber> {
        self.packets.back().map(|p| p.packet_number)
    }
}

impl<I: Clone> Default for ProducerInputBuffer<I> {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters kept by the authority input buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityBufferStats {
    /// Packets accepted into the queue
    pub received: u64,
    /// Packets ignored as stale or duplicate
    pub stale_or_duplicate: u64,
    /// Packet numbers skipped over by a gap when first seen
    pub lost: u64,
    /// Packets that arrived after a newer one and filled a gap
    pub late: u64,
    /// Consumption attempts that found the queue empty mid-consumption
    pub starved: u64,
}

/// Adaptive receive buffer for remote input on the authority
#[derive(Debug, Clone)]
pub struct AuthorityInputBuffer<I> {
    /// Received packets not yet consumed (ascending packet number)
    queue: VecDeque<InputPacket<I>>,
    /// Occupancy required before consumption starts
    target_size: usize,
    /// Highest packet number ever queued
    last_queued: PacketNumber,
    /// Most recently consumed packet number
    last_consumed: PacketNumber,
    /// Ticks a loss stays in `num_recently_dropped`
    drop_memory_ticks: u32,
    /// (tick recorded, packets lost) for losses inside the memory horizon
    recent_drops: VecDeque<(u64, u32)>,
    /// Local tick counter driving drop expiry
    tick: u64,
    stats: AuthorityBufferStats,
}

impl<I> AuthorityInputBuffer<I> {
    /// Create a buffer that starts consuming at `target_size` packets
    pub fn new(target_size: usize, drop_memory_ticks: u32) -> Self {
        Self {
            queue: VecDeque::new(),
            target_size,
            last_queued: PacketNumber::INVALID,
            last_consumed: PacketNumber::INVALID,
            drop_memory_ticks,
            recent_drops: VecDeque::new(),
            tick: 0,
            stats: AuthorityBufferStats::default(),
        }
    }

    /// Insert received packets
    ///
    /// Packets may arrive in any order and overlap earlier transmissions.
    /// Anything at or below the last consumed number, or already queued, is
    /// silently ignored. A packet that lands in an earlier gap is slotted
    /// into place. Returns how many packets were accepted.
    pub fn queue_remote(&mut self, packets: impl IntoIterator<Item = InputPacket<I>>) -> usize {
        let mut packets: Vec<_> = packets.into_iter().collect();
        packets.sort_by_key(|p| p.packet_number);

        let mut accepted = 0;
        for packet in packets {
            let number = packet.packet_number;
            if !number.is_valid() || (self.last_consumed.is_valid() && number <= self.last_consumed)
            {
                self.stats.stale_or_duplicate += 1;
                continue;
            }

            if self.last_queued.is_valid() && number <= self.last_queued {
                match self.queue.binary_search_by_key(&number, |p| p.packet_number) {
                    Ok(_) => self.stats.stale_or_duplicate += 1,
                    Err(at) => {
                        trace!(packet = %number, "Late packet filled a gap");
                        self.queue.insert(at, packet);
                        self.stats.received += 1;
                        self.stats.late += 1;
                        accepted += 1;
                    }
                }
                continue;
            }

            let expected = if self.last_queued.is_valid() {
                self.last_queued.next()
            } else {
                PacketNumber::ZERO
            };
            let gap = expected.steps_to(number).unwrap_or(0);
            if gap > 0 {
                self.recent_drops.push_back((self.tick, gap));
                self.stats.lost += u64::from(gap);
            }

            self.queue.push_back(packet);
            self.last_queued = number;
            self.stats.received += 1;
            accepted += 1;
        }
        accepted
    }

    /// Pop the oldest packet if the consumption policy allows it
    ///
    /// Before the first consumption this waits until `target_size` packets
    /// are buffered. Afterwards it returns whatever is available.
    pub fn consume(&mut self) -> Option<InputPacket<I>> {
        if !self.is_consuming() && self.queue.len() < self.target_size {
            return None;
        }

        match self.queue.pop_front() {
            Some(packet) => {
                self.last_consumed = packet.packet_number;
                Some(packet)
            }
            None => {
                self.stats.starved += 1;
                None
            }
        }
    }

    /// Advance the drop-memory clock by one tick
    pub fn advance_tick(&mut self) {
        self.tick += 1;
        let horizon = u64::from(self.drop_memory_ticks);
        while let Some(&(recorded, _)) = self.recent_drops.front() {
            if self.tick - recorded < horizon {
                break;
            }
            self.recent_drops.pop_front();
        }
    }

    /// Packets lost within the recent tick horizon
    pub fn num_recently_dropped(&self) -> u32 {
        self.recent_drops.iter().map(|(_, n)| *n).sum()
    }

    /// Number of packets waiting
    pub fn buffer_size(&self) -> usize {
        self.queue.len()
    }

    /// Occupancy required before consumption starts
    pub fn target_size(&self) -> usize {
        self.target_size
    }

    /// Change the start-up occupancy target
    pub fn set_target_size(&mut self, target_size: usize) {
        self.target_size = target_size;
    }

    /// Whether consumption has started
    pub fn is_consuming(&self) -> bool {
        self.last_consumed.is_valid()
    }

    /// Most recently consumed packet number
    pub fn last_consumed(&self) -> PacketNumber {
        self.last_consumed
    }

    /// Get buffer statistics
    pub fn stats(&self) -> AuthorityBufferStats {
        self.stats
    }
}

/// The last few produced packets, re-sent with every emission
#[derive(Debug, Clone)]
pub struct SlidingInputWindow<I> {
    /// Packets (oldest first)
    packets: VecDeque<InputPacket<I>>,
    size: usize,
}

impl<I: Clone> SlidingInputWindow<I> {
    /// Create a window holding `size` packets
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "Window size must be greater than 0");
        Self {
            packets: VecDeque::with_capacity(size),
            size,
        }
    }

    /// Add a packet, evicting the oldest when full
    pub fn push(&mut self, packet: InputPacket<I>) {
        if self.packets.len() >= self.size {
            self.packets.pop_front();
        }
        self.packets.push_back(packet);
    }

    /// Copy of the window contents (oldest first)
    pub fn to_vec(&self) -> Vec<InputPacket<I>> {
        self.packets.iter().cloned().collect()
    }

    /// Number of packets in the window
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Check if the window is empty
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Drop every packet
    pub fn clear(&mut self) {
        self.packets.clear();
    }
}
