//! Fixed-timestep clock for the simulation context
//!
//! Real elapsed time is scaled by the authority's time dilation advice,
//! accumulated, and paid out as whole ticks. The leftover fraction is the
//! interpolation factor for rendering between the last two ticks.

use recoil_core::PredictionConfig;
use tracing::trace;

/// Turns real elapsed time into a number of fixed ticks to run
#[derive(Debug, Clone)]
pub struct TickStepper {
    tick_dt: f64,
    max_time_dilation: f64,
    max_catch_up_ticks: u32,
    accumulator: f64,
    total_ticks: u64,
}

impl TickStepper {
    /// Create a stepper for ticks of `tick_dt` seconds
    ///
    /// # Panics
    /// Panics if `tick_dt` is not positive.
    pub fn new(tick_dt: f64, config: &PredictionConfig) -> Self {
        assert!(tick_dt > 0.0, "tick duration must be positive");
        Self {
            tick_dt,
            max_time_dilation: config.max_time_dilation,
            max_catch_up_ticks: config.max_catch_up_ticks,
            accumulator: 0.0,
            total_ticks: 0,
        }
    }

    /// Playback rate for a suggested dilation in `[-1, 1]`
    pub fn rate(&self, time_dilation: f32) -> f64 {
        1.0 + f64::from(time_dilation.clamp(-1.0, 1.0)) * self.max_time_dilation
    }

    /// Accumulate `real_dt` seconds and return how many ticks are due
    ///
    /// At most `max_catch_up_ticks` are returned; time owed beyond that is
    /// discarded rather than carried into the next call.
    pub fn advance(&mut self, real_dt: f64, time_dilation: f32) -> u32 {
        self.accumulator += real_dt.max(0.0) * self.rate(time_dilation);

        let due = (self.accumulator / self.tick_dt).floor();
        self.accumulator -= due * self.tick_dt;

        let limit = f64::from(self.max_catch_up_ticks);
        if due > limit {
            trace!(due, limit, "Clock fell behind, discarding owed ticks");
        }
        let ticks = due.min(limit) as u32;
        self.total_ticks += u64::from(ticks);
        ticks
    }

    /// Fraction of the next tick already accumulated, in `[0, 1]`
    pub fn alpha(&self) -> f64 {
        (self.accumulator / self.tick_dt).clamp(0.0, 1.0)
    }

    /// Fixed tick duration in seconds
    pub fn tick_dt(&self) -> f64 {
        self.tick_dt
    }

    /// Ticks paid out since creation
    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stepper(max_time_dilation: f64, max_catch_up_ticks: u32) -> TickStepper {
        let config = PredictionConfig {
            max_time_dilation,
            max_catch_up_ticks,
            ..Default::default()
        };
        TickStepper::new(0.25, &config)
    }

    #[test]
    fn test_whole_ticks_and_alpha() {
        let mut clock = stepper(0.5, 8);
        assert_eq!(clock.advance(0.125, 0.0), 0);
        assert_eq!(clock.alpha(), 0.5);
        assert_eq!(clock.advance(0.875, 0.0), 4);
        assert_eq!(clock.alpha(), 0.0);
        assert_eq!(clock.total_ticks(), 4);
    }

    #[test]
    fn test_dilation_scales_rate() {
        let mut fast = stepper(0.5, 8);
        let mut slow = stepper(0.5, 8);
        assert_eq!(fast.advance(1.0, 1.0), 6);
        assert_eq!(slow.advance(1.0, -1.0), 2);
    }

    #[test]
    fn test_dilation_is_clamped() {
        let clock = stepper(0.5, 8);
        assert_eq!(clock.rate(4.0), 1.5);
        assert_eq!(clock.rate(-4.0), 0.5);
    }

    #[test]
    fn test_catch_up_is_bounded() {
        let mut clock = stepper(0.0, 8);
        assert_eq!(clock.advance(10.0, 0.0), 8);
        assert_eq!(clock.advance(0.0, 0.0), 0);
    }

    #[test]
    fn test_negative_elapsed_is_ignored() {
        let mut clock = stepper(0.0, 8);
        assert_eq!(clock.advance(-1.0, 0.0), 0);
        assert_eq!(clock.alpha(), 0.0);
    }
}
