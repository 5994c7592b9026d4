//! Tunable constants for the pose pipeline
//!
//! All durations are in motion frames (see [`FRAMES_PER_SECOND`]).

use std::f32::consts::PI;

use crate::error::{PoseError, Result};

/// Motion clips are authored at 30 frames per second
pub const FRAMES_PER_SECOND: f32 = 30.0;

/// Name of the bone used for motion start re-positioning
pub const DEFAULT_CENTER_BONE_NAME: &str = "センター";

/// CCD solver tolerances
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-support", serde(default))]
pub struct IkConfig {
    /// Squared distance between destination and target that counts as reached
    pub min_distance_sq: f32,
    /// Angles below this are not worth a rotation step
    pub min_angle: f32,
    /// Squared cross-product length below which the axis is degenerate
    pub min_axis_sq: f32,
    /// Default X limit for knee-like bones
    pub limit_x_lower: f32,
    pub limit_x_upper: f32,
}

impl Default for IkConfig {
    fn default() -> Self {
        Self {
            min_distance_sq: 1.0e-4,
            min_angle: 1.0e-5,
            min_axis_sq: 1.0e-7,
            limit_x_lower: 0.002,
            limit_x_upper: PI,
        }
    }
}

/// Start, loop and fade-out blending windows
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-support", serde(default))]
pub struct PlaybackConfig {
    /// Bone smoothing window after start or loop
    pub bone_start_margin: f32,
    /// Morph smoothing window after start or loop
    pub morph_start_margin: f32,
    /// Bone blend-to-rest window for FadeOut
    pub bone_fade_out_frames: f32,
    /// Morph blend-to-rest window for FadeOut
    pub morph_fade_out_frames: f32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            bone_start_margin: 20.0,
            morph_start_margin: 6.0,
            bone_fade_out_frames: 20.0,
            morph_fade_out_frames: 5.0,
        }
    }
}

impl PlaybackConfig {
    /// Longest of the two fade-out windows
    pub fn fade_out_frames(&self) -> f32 {
        self.bone_fade_out_frames.max(self.morph_fade_out_frames)
    }
}

/// Configuration of a whole [`crate::Rig`]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-support", serde(default))]
pub struct RigConfig {
    pub ik: IkConfig,
    pub playback: PlaybackConfig,
    pub center_bone_name: String,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            ik: IkConfig::default(),
            playback: PlaybackConfig::default(),
            center_bone_name: DEFAULT_CENTER_BONE_NAME.to_string(),
        }
    }
}

impl RigConfig {
    /// Reject values that would make the pipeline misbehave
    pub fn validate(&self) -> Result<()> {
        let windows = [
            ("bone_start_margin", self.playback.bone_start_margin),
            ("morph_start_margin", self.playback.morph_start_margin),
            ("bone_fade_out_frames", self.playback.bone_fade_out_frames),
            ("morph_fade_out_frames", self.playback.morph_fade_out_frames),
        ];
        for (name, value) in windows {
            if !value.is_finite() || value < 0.0 {
                return Err(PoseError::InvalidOptions(format!(
                    "{name} must be a finite, non-negative frame count, got {value}"
                )));
            }
        }
        if !self.ik.limit_x_lower.is_finite() || !self.ik.limit_x_upper.is_finite() {
            return Err(PoseError::InvalidOptions(format!(
                "X limit bounds must be finite, got [{}, {}]",
                self.ik.limit_x_lower, self.ik.limit_x_upper
            )));
        }
        if self.ik.limit_x_lower > self.ik.limit_x_upper {
            return Err(PoseError::InvalidOptions(format!(
                "X limit lower bound {} exceeds upper bound {}",
                self.ik.limit_x_lower, self.ik.limit_x_upper
            )));
        }
        if !(self.ik.min_distance_sq > 0.0 && self.ik.min_distance_sq.is_finite()) {
            return Err(PoseError::InvalidOptions(
                "IK min_distance_sq must be finite and positive".to_string(),
            ));
        }
        Ok(())
    }
}
