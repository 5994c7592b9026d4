//! Motion playback
//!
//! This module turns recorded motion clips into candidate bone poses:
//! - Keyframe tracks with per-channel Bezier easing
//! - Immutable, shareable motion clips
//! - A playback state machine per running motion (hold, loop, fade out)
//! - A mixer compositing concurrent players by priority
//!
//! # Example
//!
//! ```rust,ignore
//! use mmd_pose::animation::{MotionMixer, MotionOptions, OnEnd};
//!
//! let mut mixer = MotionMixer::new();
//! let handle = mixer.start(
//!     "base",
//!     motion.clone(),
//!     MotionOptions { on_end: OnEnd::Loop, ..Default::default() },
//!     config.playback,
//!     &bones,
//!     &morphs,
//! )?;
//!
//! // Every frame
//! for event in mixer.advance(delta_frames) {
//!     println!("{event:?}");
//! }
//! mixer.apply(&mut bones, &mut morphs);
//! bones.update();
//! ```

mod interpolation;
mod mixer;
mod motion;
mod player;
mod state;
mod track;
mod types;

pub use interpolation::{
    BezierCurve, INTERPOLATION_TABLE_SIZE, InterpolationCurve, find_keyframe_index,
};
pub use mixer::{MixerEvent, MotionHandle, MotionMixer};
pub use motion::Motion;
pub use player::{MotionOptions, MotionPlayer};
pub use state::{OnEnd, PlayerEvent, PlayerState};
pub use track::{BONE_CHANNELS, BoneChannel, BoneKeyframe, BoneTrack, MorphKeyframe, MorphTrack};
pub use types::{BonePose, Lerp};
