//! Authority-side time dilation feedback
//!
//! The authority wants its input buffer to sit at the desired size plus the
//! number of recently lost packets. Each tick it compares occupancy to that
//! target, picks a direction (+1 speed up, -1 slow down, 0 hold) and moves the
//! previous suggestion toward it by a fixed fraction. The smoothed value is
//! sent to the predicting client in a `ControlPacket`.

use recoil_core::ControlPacket;

/// Smoothed playback-rate suggestion for the predicting client
#[derive(Debug, Clone)]
pub struct TimeDilationController {
    /// Smoothing factor in `(0, 1]`
    alpha: f32,
    /// Last suggested dilation
    suggested: f32,
}

impl TimeDilationController {
    /// Create a controller with the given smoothing factor
    ///
    /// The buffer starts empty, so the first suggestion is "speed up".
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(f32::EPSILON, 1.0),
            suggested: 1.0,
        }
    }

    /// Direction the buffer needs to move in
    pub fn target_direction(buffer_size: usize, desired_size: usize) -> f32 {
        if buffer_size > desired_size {
            -1.0
        } else if buffer_size < desired_size {
            1.0
        } else {
            0.0
        }
    }

    /// Fold one tick of buffer occupancy into the suggestion
    ///
    /// `desired_size` should already include recently dropped packets.
    pub fn update(&mut self, buffer_size: usize, desired_size: usize) -> ControlPacket {
        let target = Self::target_direction(buffer_size, desired_size);
        self.suggested += (target - self.suggested) * self.alpha;
        self.suggested = self.suggested.clamp(-1.0, 1.0);
        ControlPacket::new(self.suggested)
    }

    /// Last suggested dilation
    pub fn suggested(&self) -> f32 {
        self.suggested
    }
}
