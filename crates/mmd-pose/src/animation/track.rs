//! Keyframe tracks for bones and morphs
//!
//! Tracks are validated once at construction and immutable afterwards. The
//! only interior state is each curve's lazily built easing table, so a track
//! can be shared between players on different threads.

use glam::{Quat, Vec3};

use super::interpolation::{BezierCurve, InterpolationCurve, find_keyframe_index};
use super::types::{BonePose, Lerp};
use crate::error::{PoseError, Result};

/// Interpolated channels of a bone keyframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoneChannel {
    X = 0,
    Y = 1,
    Z = 2,
    Rotation = 3,
}

/// Number of independently eased channels per bone keyframe
pub const BONE_CHANNELS: usize = 4;

/// One bone keyframe
///
/// The curves describe the segment that ends at this keyframe.
#[derive(Debug, Clone, PartialEq)]
pub struct BoneKeyframe {
    pub frame: f32,
    pub position: Vec3,
    pub rotation: Quat,
    pub curves: [InterpolationCurve; BONE_CHANNELS],
}

impl BoneKeyframe {
    pub fn new(frame: f32, position: Vec3, rotation: Quat) -> Self {
        Self {
            frame,
            position,
            rotation,
            curves: Default::default(),
        }
    }

    pub fn with_curve(mut self, channel: BoneChannel, curve: BezierCurve) -> Self {
        self.curves[channel as usize] = InterpolationCurve::new(curve);
        self
    }

    /// Same curve on every channel
    pub fn with_all_curves(mut self, curve: BezierCurve) -> Self {
        self.curves = std::array::from_fn(|_| InterpolationCurve::new(curve));
        self
    }

    pub fn curve(&self, channel: BoneChannel) -> &InterpolationCurve {
        &self.curves[channel as usize]
    }

    fn pose(&self) -> BonePose {
        BonePose::new(self.position, self.rotation)
    }
}

/// One morph keyframe, interpolated linearly
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MorphKeyframe {
    pub frame: f32,
    pub weight: f32,
}

impl MorphKeyframe {
    pub const fn new(frame: f32, weight: f32) -> Self {
        Self { frame, weight }
    }
}

trait Keyframe {
    fn frame(&self) -> f32;
    fn is_finite(&self) -> bool;
}

impl Keyframe for BoneKeyframe {
    fn frame(&self) -> f32 {
        self.frame
    }

    fn is_finite(&self) -> bool {
        self.frame.is_finite() && self.position.is_finite() && self.rotation.is_finite()
    }
}

impl Keyframe for MorphKeyframe {
    fn frame(&self) -> f32 {
        self.frame
    }

    fn is_finite(&self) -> bool {
        self.frame.is_finite() && self.weight.is_finite()
    }
}

/// Sort keyframes by frame, rejecting duplicates and non-finite data
fn validate_keyframes<K: Keyframe>(track: &str, keyframes: &mut [K]) -> Result<Vec<f32>> {
    if let Some(bad) = keyframes.iter().find(|k| !k.is_finite()) {
        return Err(PoseError::NonFiniteKeyframe {
            track: track.to_string(),
            frame: bad.frame(),
        });
    }

    keyframes.sort_by(|a, b| a.frame().total_cmp(&b.frame()));

    if let Some(pair) = keyframes.windows(2).find(|w| w[0].frame() == w[1].frame()) {
        return Err(PoseError::DuplicateKeyframe {
            track: track.to_string(),
            frame: pair[0].frame(),
        });
    }

    Ok(keyframes.iter().map(Keyframe::frame).collect())
}

/// Bracketing pair for a frame, or a single keyframe to hold
enum Bracket {
    Hold(usize),
    Between(usize, f32),
}

fn bracket(frames: &[f32], frame: f32, hint: &mut usize) -> Option<Bracket> {
    let index = find_keyframe_index(frames, frame, Some(*hint))?;
    *hint = index;

    if frame <= frames[index] || index + 1 >= frames.len() {
        return Some(Bracket::Hold(index));
    }
    let span = frames[index + 1] - frames[index];
    let t = ((frame - frames[index]) / span).clamp(0.0, 1.0);
    Some(Bracket::Between(index, t))
}

/// Keyframes of one bone
#[derive(Debug, Clone)]
pub struct BoneTrack {
    name: String,
    frames: Vec<f32>,
    keyframes: Vec<BoneKeyframe>,
}

impl BoneTrack {
    pub fn new(name: impl Into<String>, mut keyframes: Vec<BoneKeyframe>) -> Result<Self> {
        let name = name.into();
        let frames = validate_keyframes(&name, &mut keyframes)?;
        for keyframe in &mut keyframes {
            keyframe.rotation = keyframe.rotation.normalize();
        }
        Ok(Self {
            name,
            frames,
            keyframes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keyframes(&self) -> &[BoneKeyframe] {
        &self.keyframes
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    /// A track with a single keyframe never changes
    pub fn is_static(&self) -> bool {
        self.keyframes.len() == 1
    }

    pub fn last_frame(&self) -> f32 {
        self.frames.last().copied().unwrap_or(0.0)
    }

    pub fn sample(&self, frame: f32) -> BonePose {
        let mut hint = 0;
        self.sample_with_hint(frame, &mut hint)
    }

    /// Sample the track, reusing and updating a per-player cursor
    pub fn sample_with_hint(&self, frame: f32, hint: &mut usize) -> BonePose {
        match bracket(&self.frames, frame, hint) {
            None => BonePose::REST,
            Some(Bracket::Hold(index)) => self.keyframes[index].pose(),
            Some(Bracket::Between(index, t)) => {
                let from = &self.keyframes[index];
                let to = &self.keyframes[index + 1];
                let ease = |channel| to.curve(channel).ease(t);
                let position = Vec3::new(
                    Lerp::lerp(&from.position.x, &to.position.x, ease(BoneChannel::X)),
                    Lerp::lerp(&from.position.y, &to.position.y, ease(BoneChannel::Y)),
                    Lerp::lerp(&from.position.z, &to.position.z, ease(BoneChannel::Z)),
                );
                let rotation =
                    Lerp::lerp(&from.rotation, &to.rotation, ease(BoneChannel::Rotation));
                BonePose::new(position, rotation)
            }
        }
    }
}

/// Keyframes of one morph
#[derive(Debug, Clone)]
pub struct MorphTrack {
    name: String,
    frames: Vec<f32>,
    keyframes: Vec<MorphKeyframe>,
}

impl MorphTrack {
    pub fn new(name: impl Into<String>, mut keyframes: Vec<MorphKeyframe>) -> Result<Self> {
        let name = name.into();
        let frames = validate_keyframes(&name, &mut keyframes)?;
        Ok(Self {
            name,
            frames,
            keyframes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keyframes(&self) -> &[MorphKeyframe] {
        &self.keyframes
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    pub fn is_static(&self) -> bool {
        self.keyframes.len() == 1
    }

    pub fn last_frame(&self) -> f32 {
        self.frames.last().copied().unwrap_or(0.0)
    }

    pub fn sample(&self, frame: f32) -> f32 {
        let mut hint = 0;
        self.sample_with_hint(frame, &mut hint)
    }

    pub fn sample_with_hint(&self, frame: f32, hint: &mut usize) -> f32 {
        match bracket(&self.frames, frame, hint) {
            None => 0.0,
            Some(Bracket::Hold(index)) => self.keyframes[index].weight,
            Some(Bracket::Between(index, t)) => Lerp::lerp(
                &self.keyframes[index].weight,
                &self.keyframes[index + 1].weight,
                t,
            ),
        }
    }
}
