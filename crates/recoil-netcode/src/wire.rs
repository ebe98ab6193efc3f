//! Wire encoding for input windows, state snapshots and control packets
//!
//! All three messages are bincode-encoded serde values. Sequence numbers and
//! the time dilation are fixed-width little-endian; payloads and bodies are
//! whatever the user types serialize to.

use crate::Result;
use recoil_core::{ControlPacket, InputPacket, StateSnapshot};
use serde::{de::DeserializeOwned, Serialize};

/// Encode a sliding input window
pub fn encode_input_window<I: Serialize>(packets: &[InputPacket<I>]) -> Result<Vec<u8>> {
    Ok(bincode::serialize(packets)?)
}

/// Decode a sliding input window
pub fn decode_input_window<I: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<InputPacket<I>>> {
    Ok(bincode::deserialize(bytes)?)
}

/// Encode an authoritative state snapshot
pub fn encode_state<S: Serialize>(snapshot: &StateSnapshot<S>) -> Result<Vec<u8>> {
    Ok(bincode::serialize(snapshot)?)
}

/// Decode an authoritative state snapshot
pub fn decode_state<S: DeserializeOwned>(bytes: &[u8]) -> Result<StateSnapshot<S>> {
    Ok(bincode::deserialize(bytes)?)
}

/// Encode a control packet
pub fn encode_control(packet: &ControlPacket) -> Result<Vec<u8>> {
    Ok(bincode::serialize(packet)?)
}

/// Decode a control packet
pub fn decode_control(bytes: &[u8]) -> Result<ControlPacket> {
    Ok(bincode::deserialize(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use recoil_core::{PacketNumber, TickNumber};

    #[test]
    fn test_state_layout() {
        let mut snapshot = StateSnapshot::new(TickNumber(7), PacketNumber(3), 0u8);
        snapshot.events.raise(2);

        let bytes = encode_state(&snapshot).unwrap();
        // tick (4) + packet (4) + body (1) + events (1)
        assert_eq!(bytes, vec![7, 0, 0, 0, 3, 0, 0, 0, 0, 0b100]);
    }

    #[test]
    fn test_control_layout() {
        let bytes = encode_control(&ControlPacket::new(0.5)).unwrap();
        assert_eq!(bytes, 0.5f32.to_le_bytes().to_vec());
        assert_eq!(decode_control(&bytes).unwrap().time_dilation, 0.5);
    }

    #[test]
    fn test_input_window_decodes() {
        let window = vec![
            InputPacket::new(PacketNumber(4), 1i16),
            InputPacket::new(PacketNumber(5), -1i16),
        ];
        let decoded: Vec<InputPacket<i16>> =
            decode_input_window(&encode_input_window(&window).unwrap()).unwrap();
        assert_eq!(decoded, window);
    }

    #[test]
    fn test_truncated_state_is_an_error() {
        let result = decode_state::<u64>(&[1, 0, 0]);
        assert!(matches!(result, Err(Error::Serialization(_))));
    }
}
