//! Recoil Core - Shared vocabulary for client-side prediction
//!
//! This crate provides the types every role agrees on:
//! - Tick and input packet sequence numbers with an invalid sentinel
//! - Wire types (`InputPacket`, `StateSnapshot`, `ControlPacket`, `EventMask`)
//! - `StateHistory`, the bounded log a predicting client reconciles against
//! - Collaborator traits (`Simulator`, `InputSource`, `Interpolate`)
//! - `PredictionConfig`, loadable from RON
//!
//! The drivers that put these together live in `recoil-netcode`.

mod config;
mod error;
mod model;
mod packet;
mod state_history;
pub mod time;

pub use config::PredictionConfig;
pub use error::{Error, Result};
pub use model::{InputPayload, InputSource, Interpolate, NoInput, SimState, Simulator};
pub use packet::{ControlPacket, EventMask, InputPacket, StateSnapshot};
pub use state_history::StateHistory;
pub use time::{PacketNumber, SeqCounter, Sequence, TickNumber, INVALID_SEQ};
