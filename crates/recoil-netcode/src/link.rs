//! The boundary between the simulation context and the control context
//!
//! Simulation ticks run on their own thread and must never wait on the
//! network. Everything that crosses over goes through a `Link`:
//!
//! ```text
//!   control context                         simulation context
//!  ┌──────────────┐   input inbox          ┌──────────────┐
//!  │              │ ─────────────────────▶ │              │
//!  │   Endpoint   │   authority mailbox    │    Driver    │
//!  │              │ ─────────────────────▶ │              │
//!  │  (transport) │   outbox (FIFO)        │  (simulate)  │
//!  │              │ ◀───────────────────── │              │
//!  └──────────────┘   local state mailbox  └──────────────┘
//! ```
//!
//! Locks are held only for the length of a copy or a swap.

use crate::transport::{MessageSink, Outbound};
use crate::{wire, Error, Result};
use parking_lot::Mutex;
use recoil_core::{ControlPacket, InputPacket, InputPayload, SimState, StateSnapshot};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

/// Single-slot cell holding the latest value
///
/// Writers replace the whole value and readers copy it out whole, so a
/// reader never sees half of one snapshot and half of another.
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
}

impl<T: Clone> Mailbox<T> {
    /// Create an empty mailbox
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Replace the stored value
    pub fn publish(&self, value: T) {
        *self.slot.lock() = Some(value);
    }

    /// Copy of the stored value
    pub fn latest(&self) -> Option<T> {
        self.slot.lock().clone()
    }

    /// Remove and return the stored value
    pub fn take(&self) -> Option<T> {
        self.slot.lock().take()
    }

    /// Empty the mailbox
    pub fn clear(&self) {
        *self.slot.lock() = None;
    }
}

impl<T: Clone> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared state between one entity's driver and its endpoint
#[derive(Debug)]
pub struct Link<I, S> {
    /// Received input packets waiting for the authority driver
    input_inbox: Mutex<Vec<InputPacket<I>>>,
    /// Latest snapshot received from the authority
    authority_state: Mailbox<StateSnapshot<S>>,
    /// Latest control packet received from the authority
    control: Mailbox<ControlPacket>,
    /// Latest state produced locally
    local_state: Mailbox<StateSnapshot<S>>,
    /// Messages queued by the simulation context
    outbox: Mutex<VecDeque<Outbound<I, S>>>,
    /// Resimulation ticks to run at the start of the next tick
    forced_ticks: AtomicU32,
}

impl<I: Clone, S: Clone> Link<I, S> {
    /// Create an empty link
    pub fn new() -> Self {
        Self {
            input_inbox: Mutex::new(Vec::new()),
            authority_state: Mailbox::new(),
            control: Mailbox::new(),
            local_state: Mailbox::new(),
            outbox: Mutex::new(VecDeque::new()),
            forced_ticks: AtomicU32::new(0),
        }
    }

    // Simulation context

    /// Take every input packet received since the last call
    pub fn take_inbound_inputs(&self) -> Vec<InputPacket<I>> {
        std::mem::take(&mut *self.input_inbox.lock())
    }

    /// Copy of the latest authoritative snapshot
    pub fn latest_authority_state(&self) -> Option<StateSnapshot<S>> {
        self.authority_state.latest()
    }

    /// Publish the latest locally produced state
    pub fn publish_local_state(&self, snapshot: StateSnapshot<S>) {
        self.local_state.publish(snapshot);
    }

    /// Queue a message for the control context to emit
    pub fn send(&self, message: Outbound<I, S>) {
        self.outbox.lock().push_back(message);
    }

    /// Ask for `ticks` forced resimulation ticks
    pub fn request_forced_ticks(&self, ticks: u32) {
        // Both closures return Some, so the update cannot fail.
        let _ = self
            .forced_ticks
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pending| {
                Some(pending.saturating_add(ticks))
            });
    }

    /// Take all pending forced ticks
    pub fn take_forced_ticks(&self) -> u32 {
        self.forced_ticks.swap(0, Ordering::AcqRel)
    }

    /// Forced ticks waiting for the next tick
    pub fn pending_forced_ticks(&self) -> u32 {
        self.forced_ticks.load(Ordering::Acquire)
    }

    // Control context

    /// Hand received input packets to the simulation context
    pub fn deliver_inputs(&self, packets: Vec<InputPacket<I>>) {
        self.input_inbox.lock().extend(packets);
    }

    /// Replace the latest authoritative snapshot
    pub fn deliver_authority_state(&self, snapshot: StateSnapshot<S>) {
        self.authority_state.publish(snapshot);
    }

    /// Replace the latest control packet
    pub fn deliver_control(&self, packet: ControlPacket) {
        self.control.publish(packet);
    }

    /// Latest control packet
    pub fn latest_control(&self) -> Option<ControlPacket> {
        self.control.latest()
    }

    /// Latest locally produced state
    pub fn latest_local_state(&self) -> Option<StateSnapshot<S>> {
        self.local_state.latest()
    }

    /// Remove every queued outbound message
    pub fn drain_outbox(&self) -> Vec<Outbound<I, S>> {
        self.outbox.lock().drain(..).collect()
    }

    /// Number of queued outbound messages
    pub fn outbox_len(&self) -> usize {
        self.outbox.lock().len()
    }

    /// Discard everything in flight
    pub fn reset(&self) {
        self.input_inbox.lock().clear();
        self.authority_state.clear();
        self.control.clear();
        self.local_state.clear();
        self.outbox.lock().clear();
        self.forced_ticks.store(0, Ordering::Release);
    }
}

impl<I: Clone, S: Clone> Default for Link<I, S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Control-context handle for one entity
///
/// Inbound transport callbacks decode into the link; `flush` encodes queued
/// outbound messages and hands them to a `MessageSink`.
#[derive(Debug)]
pub struct Endpoint<I, S> {
    link: Arc<Link<I, S>>,
}

impl<I, S> Clone for Endpoint<I, S> {
    fn clone(&self) -> Self {
        Self {
            link: Arc::clone(&self.link),
        }
    }
}

impl<I: InputPayload, S: SimState> Endpoint<I, S> {
    /// Wrap a link
    pub fn new(link: Arc<Link<I, S>>) -> Self {
        Self { link }
    }

    /// Inbound input window from a predicting client
    ///
    /// Returns the number of packets in the window.
    pub fn receive_input_packets(&self, payload: &[u8]) -> Result<usize> {
        let packets: Vec<InputPacket<I>> = wire::decode_input_window(payload)?;
        let count = packets.len();
        self.link.deliver_inputs(packets);
        Ok(count)
    }

    /// Inbound authoritative snapshot
    pub fn receive_authority_state(&self, payload: &[u8]) -> Result<()> {
        let snapshot: StateSnapshot<S> = wire::decode_state(payload)?;
        trace!(tick = %snapshot.tick_number, "Received authority state");
        self.link.deliver_authority_state(snapshot);
        Ok(())
    }

    /// Inbound control packet
    pub fn receive_control_packet(&self, payload: &[u8]) -> Result<()> {
        let packet = wire::decode_control(payload)?;
        self.link.deliver_control(packet);
        Ok(())
    }

    /// Emit every queued outbound message in order
    ///
    /// Returns how many messages were emitted. If a message cannot be
    /// encoded or the sink fails, the remaining messages of this flush are
    /// dropped; the protocol recovers from loss on its own.
    pub fn flush<M: MessageSink>(&self, sink: &mut M) -> Result<usize> {
        let messages = self.link.drain_outbox();
        let total = messages.len();

        for (sent, message) in messages.into_iter().enumerate() {
            let kind = message.kind();
            let dropped = total - sent - 1;
            let bytes = match &message {
                Outbound::InputWindow(packets) => wire::encode_input_window(packets),
                Outbound::AuthorityState(snapshot) => wire::encode_state(snapshot),
                Outbound::Control(packet) => wire::encode_control(packet),
            };
            let bytes = match bytes {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(kind, dropped, "Failed to encode message: {err}");
                    return Err(err);
                }
            };

            let result = match &message {
                Outbound::InputWindow(_) => sink.emit_input_packets(&bytes),
                Outbound::AuthorityState(_) => sink.emit_authority_state(&bytes),
                Outbound::Control(_) => sink.emit_control_packet(&bytes),
            };
            if let Err(err) = result {
                warn!(kind, dropped, "Message sink failed: {err}");
                return Err(Error::Transport(err.to_string()));
            }
            trace!(kind, "Emitted message");
        }

        Ok(total)
    }

    /// Suggested time dilation from the latest control packet
    pub fn time_dilation(&self) -> f32 {
        self.link
            .latest_control()
            .map(|p| p.time_dilation)
            .unwrap_or(0.0)
    }

    /// Latest state produced by the local driver
    pub fn latest_state(&self) -> Option<StateSnapshot<S>> {
        self.link.latest_local_state()
    }

    /// Number of messages waiting for `flush`
    pub fn pending_outbound(&self) -> usize {
        self.link.outbox_len()
    }
}
