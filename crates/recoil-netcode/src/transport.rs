//! Transport seam for outbound messages
//!
//! Users implement `MessageSink` on top of their replication layer. The
//! simulation context never calls it directly: it queues `Outbound` messages
//! that the control context encodes and hands to the sink.

use recoil_core::{ControlPacket, InputPacket, StateSnapshot};

/// Outbound half of the transport
///
/// Input windows and control packets are high-frequency and may be sent
/// unreliably. Authority state should reach both auto-proxy and
/// simulated-proxy representations of the entity.
pub trait MessageSink {
    /// Error type for this sink
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send a sliding input window to the authority
    fn emit_input_packets(&mut self, payload: &[u8]) -> Result<(), Self::Error>;

    /// Send an authoritative snapshot to every remote
    fn emit_authority_state(&mut self, payload: &[u8]) -> Result<(), Self::Error>;

    /// Send a control packet to the predicting client
    fn emit_control_packet(&mut self, payload: &[u8]) -> Result<(), Self::Error>;
}

/// A message queued by the simulation context
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound<I, S> {
    /// Predicting client input window
    InputWindow(Vec<InputPacket<I>>),
    /// Authority state for all remotes
    AuthorityState(StateSnapshot<S>),
    /// Authority time dilation advice
    Control(ControlPacket),
}

impl<I, S> Outbound<I, S> {
    /// Short label for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::InputWindow(_) => "input_window",
            Outbound::AuthorityState(_) => "authority_state",
            Outbound::Control(_) => "control",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recoil_core::{PacketNumber, TickNumber};

    #[test]
    fn test_outbound_kind() {
        let input: Outbound<u8, u8> = Outbound::InputWindow(vec![InputPacket::new(PacketNumber(0), 1)]);
        let state: Outbound<u8, u8> =
            Outbound::AuthorityState(StateSnapshot::new(TickNumber(0), PacketNumber(0), 1));
        let control: Outbound<u8, u8> = Outbound::Control(ControlPacket::new(0.0));

        assert_eq!(input.kind(), "input_window");
        assert_eq!(state.kind(), "authority_state");
        assert_eq!(control.kind(), "control");
    }
}
