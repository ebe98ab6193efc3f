//! Prediction configuration - Buffer targets, cadences and smoothing
//!
//! Every driver receives its own copy at construction, so tunables can be
//! overridden per entity or per test. Configurations can be loaded from RON:
//!
//! ```
//! use recoil_core::PredictionConfig;
//!
//! let config = PredictionConfig::from_ron_str("(sync_frames: 3, desired_input_buffer_size: 4)").unwrap();
//! assert_eq!(config.sync_frames, 3);
//! assert_eq!(config.desired_input_buffer_size, 4);
//! assert_eq!(config.input_window_size, 3);
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Tunables shared by all roles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Minimum number of ticks resimulated after a rewind
    pub forward_prediction_frames: u32,
    /// Number of recent input packets re-sent with every emission
    pub input_window_size: usize,
    /// Authority input buffer occupancy required before consumption starts
    pub desired_input_buffer_size: usize,
    /// How many authority ticks a detected packet loss keeps inflating the buffer target
    pub dropped_packet_memory_ticks: u32,
    /// Smoothing factor for the suggested time dilation, in `(0, 1]`
    pub time_dilation_alpha: f32,
    /// Authority emits its state every `sync_frames` ticks
    pub sync_frames: u32,
    /// Maximum unacknowledged snapshots kept by a predicting client
    pub history_capacity: usize,
    /// Playback-rate change applied at a suggested dilation of +/-1
    pub max_time_dilation: f64,
    /// Upper bound on ticks run by a single clock advance
    pub max_catch_up_ticks: u32,
    /// Divergences discarding more ticks than this are logged as errors
    pub divergence_error_threshold: u32,
}

impl PredictionConfig {
    /// Parse a configuration from a RON string and validate it
    pub fn from_ron_str(content: &str) -> Result<Self> {
        let config: Self = ron::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_ron_str(&content)
    }

    /// Serialize to pretty RON
    pub fn to_ron_string(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Reject values the prediction loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.time_dilation_alpha > 0.0 && self.time_dilation_alpha <= 1.0) {
            return Err(Error::Config(format!(
                "time_dilation_alpha must be in (0, 1], got {}",
                self.time_dilation_alpha
            )));
        }
        if self.sync_frames == 0 {
            return Err(Error::Config("sync_frames must be at least 1".into()));
        }
        if self.input_window_size == 0 {
            return Err(Error::Config("input_window_size must be at least 1".into()));
        }
        if self.history_capacity == 0 {
            return Err(Error::Config("history_capacity must be at least 1".into()));
        }
        if !(0.0..1.0).contains(&self.max_time_dilation) {
            return Err(Error::Config(format!(
                "max_time_dilation must be in [0, 1), got {}",
                self.max_time_dilation
            )));
        }
        Ok(())
    }

    /// Override the forward prediction frames
    pub fn with_forward_prediction_frames(mut self, frames: u32) -> Self {
        self.forward_prediction_frames = frames;
        self
    }

    /// Override the desired authority input buffer size
    pub fn with_desired_input_buffer_size(mut self, size: usize) -> Self {
        self.desired_input_buffer_size = size;
        self
    }

    /// Override the sync cadence
    pub fn with_sync_frames(mut self, frames: u32) -> Self {
        self.sync_frames = frames;
        self
    }

    /// Override the dilation smoothing factor
    pub fn with_time_dilation_alpha(mut self, alpha: f32) -> Self {
        self.time_dilation_alpha = alpha;
        self
    }
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            forward_prediction_frames: 10,
            input_window_size: 3,
            desired_input_buffer_size: 3,
            dropped_packet_memory_ticks: 30,
            time_dilation_alpha: 0.1,
            sync_frames: 5,
            history_capacity: 256,
            max_time_dilation: 0.1,
            max_catch_up_ticks: 8,
            divergence_error_threshold: 10,
        }
    }
}
