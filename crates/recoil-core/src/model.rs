//! Collaborator traits implemented by the embedding simulation
//!
//! The prediction machinery never touches the physics engine directly. It
//! drives these capability sets instead:
//! - `Simulator` - deterministic step function plus body rewind
//! - `InputSource` - samples local input on the predicting client
//! - `Interpolate` - blends two states for rendering between ticks

use crate::EventMask;
use serde::{de::DeserializeOwned, Serialize};

/// Blend between two states
pub trait Interpolate {
    /// Produce the state `alpha` of the way from `self` to `next`
    ///
    /// `alpha` is in `[0, 1]`: 0 yields `self`, 1 yields `next`.
    fn interpolate(&self, next: &Self, alpha: f64) -> Self;
}

impl Interpolate for f32 {
    fn interpolate(&self, next: &Self, alpha: f64) -> Self {
        self + (next - self) * alpha as f32
    }
}

impl Interpolate for f64 {
    fn interpolate(&self, next: &Self, alpha: f64) -> Self {
        self + (next - self) * alpha
    }
}

/// Requirements on an input payload
pub trait InputPayload: Clone + Default + Serialize + DeserializeOwned + Send + 'static {}

impl<T> InputPayload for T where T: Clone + Default + Serialize + DeserializeOwned + Send + 'static {}

/// Requirements on a simulation state body
pub trait SimState:
    Clone + Default + PartialEq + Interpolate + Serialize + DeserializeOwned + Send + 'static
{
}

impl<T> SimState for T where
    T: Clone + Default + PartialEq + Interpolate + Serialize + DeserializeOwned + Send + 'static
{
}

/// Deterministic simulation step and body control
///
/// `simulate` must return identical states for identical `(dt, prev, input)`
/// on a given machine. `rewind` must fully overwrite the live body.
pub trait Simulator<I, S> {
    /// Advance `prev` by one fixed step using `input`
    ///
    /// One-shot events raised during the step are recorded in `events`.
    fn simulate(&mut self, dt: f64, prev: &S, input: &I, events: &mut EventMask) -> S;

    /// Force the live body to `state`
    fn rewind(&mut self, state: &S);

    /// Deliver events raised on a presented tick
    fn dispatch_events(&mut self, _events: EventMask) {}
}

/// Source of locally produced input
pub trait InputSource<I, S> {
    /// Sample input for the next tick given the current state
    fn produce_input(&mut self, state: &S) -> I;
}

/// Input source for roles that never produce input
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInput;

impl<I: Default, S> InputSource<I, S> for NoInput {
    fn produce_input(&mut self, _state: &S) -> I {
        I::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolate_floats() {
        assert_eq!(0.0f64.interpolate(&10.0, 0.25), 2.5);
        assert_eq!(4.0f32.interpolate(&8.0, 0.5), 6.0);
        assert_eq!(4.0f32.interpolate(&8.0, 0.0), 4.0);
    }

    #[test]
    fn test_no_input_produces_default() {
        let mut source = NoInput;
        let input: u8 = InputSource::<u8, f32>::produce_input(&mut source, &1.0);
        assert_eq!(input, 0);
    }
}
