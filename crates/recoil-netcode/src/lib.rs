//! Recoil Netcode - Client-side prediction with server reconciliation
//!
//! This crate keeps a predicting client consistent with an authoritative
//! simulation across a lossy, jittery link:
//!
//! - **Input buffering**: the client re-sends a sliding window of recent
//!   input; the authority reorders, de-duplicates and paces consumption
//! - **Reconciliation**: predicted history is compared against periodic
//!   authority snapshots; mismatches rewind and resimulate
//! - **Time dilation**: the authority advises the client to speed up or
//!   slow down so its input buffer stays near the target
//! - **Roles**: `Authority`, `AutoProxy` (predicting) and `SimulatedProxy`
//!   (observing) drivers behind one `PredictionModel` facade
//!
//! # Architecture
//!
//! ```text
//! ┌────────────── AutoProxy ──────────────┐         ┌─────────── Authority ───────────┐
//! │ InputSource ─▶ ProducerInputBuffer    │ inputs  │ AuthorityInputBuffer            │
//! │                  │                    │ ──────▶ │   │                             │
//! │                  ▼                    │         │   ▼                             │
//! │ Simulator ─▶ StateHistory             │  state  │ Simulator ─▶ snapshot (every N) │
//! │                  │                    │ ◀────── │                                 │
//! │                  ▼                    │ control │ TimeDilationController          │
//! │ Reconciler ─▶ rewind + forced ticks   │ ◀────── │   (every tick)                  │
//! └───────────────────────────────────────┘         └─────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use recoil_core::PredictionConfig;
//! use recoil_netcode::{PredictionModel, Role, TickStepper};
//!
//! let mut model = PredictionModel::new(PredictionConfig::default(), physics, gamepad)?;
//! model.set_role(Role::AutoProxy);
//! let endpoint = model.endpoint();
//! let mut clock = TickStepper::new(1.0 / 60.0, model.config());
//!
//! // Simulation thread
//! loop {
//!     for _ in 0..clock.advance(frame_dt, endpoint.time_dilation()) {
//!         model.tick(clock.tick_dt())?;
//!     }
//!     render(model.generate_output(clock.alpha())?);
//! }
//!
//! // Network thread
//! endpoint.receive_authority_state(&bytes)?;
//! endpoint.flush(&mut socket)?;
//! ```

mod clock;
mod driver;
mod error;
mod input_buffer;
mod link;
mod model;
mod reconciliation;
mod time_dilation;
mod transport;
pub mod wire;

pub use clock::TickStepper;
pub use driver::{AuthorityDriver, AutoProxyDriver, Driver, Role, SimulatedProxyDriver};
pub use error::{Error, Result};
pub use input_buffer::{
    AuthorityBufferStats, AuthorityInputBuffer, ProducerInputBuffer, SlidingInputWindow,
};
pub use link::{Endpoint, Link, Mailbox};
pub use model::PredictionModel;
pub use reconciliation::{
    ReconcileOutcome, ReconcileState, ReconcileStats, Reconciler, RewindReason,
};
pub use time_dilation::TimeDilationController;
pub use transport::{MessageSink, Outbound};
