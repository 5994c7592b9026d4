//! Playback of one motion on one model
//!
//! A player binds a shared [`Motion`] to the bones and morphs of a model,
//! advances its own frame counter and produces candidate samples. It never
//! writes the skeleton; [`super::MotionMixer`] decides whose samples win.

use std::sync::Arc;

use super::motion::Motion;
use super::state::{OnEnd, PlayerEvent, PlayerState};
use super::types::{BonePose, Lerp};
use crate::config::PlaybackConfig;
use crate::diagnostics::Anomaly;
use crate::error::{PoseError, Result};
use crate::skeleton::{BoneGraph, MorphWeights};

/// Per-player playback settings
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-support", serde(default))]
pub struct MotionOptions {
    /// Higher priorities override lower ones for shared bones
    pub priority: i32,
    pub on_end: OnEnd,
    /// Frame to wrap to when looping
    pub loop_at: f32,
    /// Skip tracks that have a single keyframe
    pub ignore_static: bool,
    /// Blend in from the current pose on start and on every loop
    pub enable_smooth: bool,
    /// Move the model origin under the center bone when starting
    pub enable_re_pos: bool,
    /// Playback rate multiplier
    pub speed: f32,
}

impl Default for MotionOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            on_end: OnEnd::Hold,
            loop_at: 0.0,
            ignore_static: false,
            enable_smooth: true,
            enable_re_pos: false,
            speed: 1.0,
        }
    }
}

impl MotionOptions {
    pub fn validate(&self) -> Result<()> {
        if !self.loop_at.is_finite() || self.loop_at < 0.0 {
            return Err(PoseError::InvalidOptions(format!(
                "loop_at must be a finite, non-negative frame, got {}",
                self.loop_at
            )));
        }
        validate_speed(self.speed)
    }
}

fn validate_speed(speed: f32) -> Result<()> {
    if !speed.is_finite() || speed <= 0.0 {
        return Err(PoseError::InvalidOptions(format!(
            "speed must be finite and positive, got {speed}"
        )));
    }
    Ok(())
}

/// Share of the snapshot still mixed in while smoothing
fn smoothing_weight(remaining: f32, margin: f32) -> f32 {
    if margin > 0.0 {
        (remaining / margin).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Track bound to a bone or morph index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Binding {
    target: usize,
    track: usize,
}

/// Playback state machine for one motion
#[derive(Debug, Clone)]
pub struct MotionPlayer {
    name: String,
    motion: Arc<Motion>,
    options: MotionOptions,
    playback: PlaybackConfig,
    state: PlayerState,
    /// Start order assigned by the mixer
    sequence: u64,
    current_frame: f32,
    previous_frame: f32,

    bone_bindings: Vec<Binding>,
    morph_bindings: Vec<Binding>,
    bone_cursors: Vec<usize>,
    morph_cursors: Vec<usize>,

    /// Pose to blend away from while smoothing or fading
    bone_snapshot: Vec<BonePose>,
    morph_snapshot: Vec<f32>,
    bone_smooth_remaining: f32,
    morph_smooth_remaining: f32,
    bone_fade: f32,
    morph_fade: f32,

    bone_output: Vec<BonePose>,
    morph_output: Vec<f32>,
}

impl MotionPlayer {
    /// Bind `motion` to a model and start at frame 0
    ///
    /// When smoothing is enabled the current pose of `bones` and `morphs` is
    /// captured as the blend-in start.
    pub fn new(
        name: impl Into<String>,
        motion: Arc<Motion>,
        options: MotionOptions,
        playback: PlaybackConfig,
        bones: &BoneGraph,
        morphs: &MorphWeights,
    ) -> Result<Self> {
        options.validate()?;

        let mut player = Self {
            name: name.into(),
            motion,
            options,
            playback,
            state: PlayerState::Running,
            sequence: 0,
            current_frame: 0.0,
            previous_frame: 0.0,
            bone_bindings: Vec::new(),
            morph_bindings: Vec::new(),
            bone_cursors: Vec::new(),
            morph_cursors: Vec::new(),
            bone_snapshot: Vec::new(),
            morph_snapshot: Vec::new(),
            bone_smooth_remaining: 0.0,
            morph_smooth_remaining: 0.0,
            bone_fade: 1.0,
            morph_fade: 1.0,
            bone_output: Vec::new(),
            morph_output: Vec::new(),
        };
        player.bind(bones, morphs);
        player.smooth_from_model(bones, morphs);
        player.evaluate();
        Ok(player)
    }

    /// Alias the player was started under
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn motion(&self) -> &Arc<Motion> {
        &self.motion
    }

    pub fn options(&self) -> &MotionOptions {
        &self.options
    }

    pub fn priority(&self) -> i32 {
        self.options.priority
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn is_deleted(&self) -> bool {
        self.state == PlayerState::Deleted
    }

    pub fn current_frame(&self) -> f32 {
        self.current_frame
    }

    pub fn previous_frame(&self) -> f32 {
        self.previous_frame
    }

    pub fn speed(&self) -> f32 {
        self.options.speed
    }

    pub(crate) fn sequence(&self) -> u64 {
        self.sequence
    }

    pub(crate) fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    pub(crate) fn set_priority(&mut self, priority: i32) {
        self.options.priority = priority;
    }

    pub fn set_speed(&mut self, speed: f32) -> Result<()> {
        validate_speed(speed)?;
        self.options.speed = speed;
        Ok(())
    }

    /// Candidate local pose for every bound bone
    pub fn bone_samples(&self) -> impl Iterator<Item = (usize, BonePose)> + '_ {
        self.bone_bindings
            .iter()
            .zip(&self.bone_output)
            .map(|(binding, pose)| (binding.target, *pose))
    }

    /// Candidate weight for every bound morph
    pub fn morph_samples(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.morph_bindings
            .iter()
            .zip(&self.morph_output)
            .map(|(binding, weight)| (binding.target, *weight))
    }

    pub fn bound_bone_count(&self) -> usize {
        self.bone_bindings.len()
    }

    pub fn bound_morph_count(&self) -> usize {
        self.morph_bindings.len()
    }

    /// Advance by `delta` frames and refresh the samples
    pub fn advance(&mut self, delta: f32) -> Option<PlayerEvent> {
        let delta = delta.max(0.0);
        let event = match self.state {
            PlayerState::Deleted => return None,
            PlayerState::FadingOut => self.advance_fade(delta),
            PlayerState::Running | PlayerState::Looped => {
                self.state = PlayerState::Running;
                self.advance_frame(delta * self.options.speed)
            }
        };
        if self.state != PlayerState::Deleted {
            self.evaluate();
        }
        event
    }

    /// Begin fading out from the current frame
    pub fn stop(&mut self) {
        if matches!(self.state, PlayerState::Running | PlayerState::Looped) {
            self.begin_fade();
            self.evaluate();
        }
    }

    /// Mark the player for removal on the next mixer advance
    pub fn remove(&mut self) {
        self.state = PlayerState::Deleted;
    }

    /// Restart from frame 0, smoothing from the last samples
    pub fn rewind(&mut self) {
        if self.is_deleted() {
            return;
        }
        self.previous_frame = self.current_frame;
        self.current_frame = 0.0;
        self.state = PlayerState::Running;
        self.smooth_from_output();
        self.evaluate();
    }

    /// Replace the clip, keeping name and options, and restart from frame 0
    pub fn swap_motion(&mut self, motion: Arc<Motion>, bones: &BoneGraph, morphs: &MorphWeights) {
        log::debug!(
            "Player '{}' swapping motion '{}' for '{}'",
            self.name,
            self.motion.name(),
            motion.name()
        );
        self.motion = motion;
        self.previous_frame = 0.0;
        self.current_frame = 0.0;
        self.state = PlayerState::Running;
        self.bind(bones, morphs);
        self.smooth_from_model(bones, morphs);
        self.evaluate();
    }

    /// Re-resolve track names after the model was replaced
    pub fn rebind(&mut self, bones: &BoneGraph, morphs: &MorphWeights) {
        self.bind(bones, morphs);
        self.smooth_from_model(bones, morphs);
        self.evaluate();
    }

    fn bind(&mut self, bones: &BoneGraph, morphs: &MorphWeights) {
        let diagnostics = bones.diagnostics();
        let motion = &self.motion;
        let ignore_static = self.options.ignore_static;

        self.bone_bindings.clear();
        for (track, bone_track) in motion.bone_tracks().iter().enumerate() {
            if ignore_static && bone_track.is_static() {
                continue;
            }
            match bones.find(bone_track.name()) {
                Some(target) => self.bone_bindings.push(Binding { target, track }),
                None => diagnostics.report(&Anomaly::UnboundTrack {
                    motion: motion.name().to_string(),
                    name: bone_track.name().to_string(),
                    kind: "bone",
                }),
            }
        }

        self.morph_bindings.clear();
        for (track, morph_track) in motion.morph_tracks().iter().enumerate() {
            if ignore_static && morph_track.is_static() {
                continue;
            }
            match morphs.find(morph_track.name()) {
                Some(target) => self.morph_bindings.push(Binding { target, track }),
                None => diagnostics.report(&Anomaly::UnboundTrack {
                    motion: motion.name().to_string(),
                    name: morph_track.name().to_string(),
                    kind: "morph",
                }),
            }
        }

        if self.bone_bindings.is_empty() && self.morph_bindings.is_empty() {
            diagnostics.report(&Anomaly::EmptyPlayer {
                motion: motion.name().to_string(),
            });
        }

        let bone_count = self.bone_bindings.len();
        let morph_count = self.morph_bindings.len();
        self.bone_cursors = vec![0; bone_count];
        self.morph_cursors = vec![0; morph_count];
        self.bone_snapshot = vec![BonePose::REST; bone_count];
        self.morph_snapshot = vec![0.0; morph_count];
        self.bone_output = vec![BonePose::REST; bone_count];
        self.morph_output = vec![0.0; morph_count];
    }

    fn smooth_from_model(&mut self, bones: &BoneGraph, morphs: &MorphWeights) {
        for (slot, binding) in self.bone_snapshot.iter_mut().zip(&self.bone_bindings) {
            if let Some(bone) = bones.bone(binding.target) {
                *slot = BonePose::new(bone.position(), bone.rotation());
            }
        }
        for (slot, binding) in self.morph_snapshot.iter_mut().zip(&self.morph_bindings) {
            *slot = morphs.weight(binding.target);
        }
        self.restart_smoothing(0.0);
    }

    fn smooth_from_output(&mut self) {
        self.bone_snapshot.copy_from_slice(&self.bone_output);
        self.morph_snapshot.copy_from_slice(&self.morph_output);
        self.restart_smoothing(0.0);
    }

    fn restart_smoothing(&mut self, elapsed: f32) {
        if self.options.enable_smooth {
            self.bone_smooth_remaining = (self.playback.bone_start_margin - elapsed).max(0.0);
            self.morph_smooth_remaining = (self.playback.morph_start_margin - elapsed).max(0.0);
        } else {
            self.bone_smooth_remaining = 0.0;
            self.morph_smooth_remaining = 0.0;
        }
    }

    fn advance_frame(&mut self, step: f32) -> Option<PlayerEvent> {
        self.previous_frame = self.current_frame;
        self.current_frame += step;
        self.bone_smooth_remaining = (self.bone_smooth_remaining - step).max(0.0);
        self.morph_smooth_remaining = (self.morph_smooth_remaining - step).max(0.0);

        let end = self.motion.max_frame();
        if self.current_frame < end {
            return None;
        }

        let overshoot = self.current_frame - end;
        self.current_frame = end;
        match self.options.on_end {
            OnEnd::Hold => None,
            OnEnd::Loop => {
                let period = end - self.options.loop_at;
                if period <= 0.0 {
                    return None;
                }
                // Snapshot the end pose, then wrap
                self.evaluate();
                let overshoot = overshoot % period;
                self.current_frame = self.options.loop_at + overshoot;
                self.bone_snapshot.copy_from_slice(&self.bone_output);
                self.morph_snapshot.copy_from_slice(&self.morph_output);
                self.restart_smoothing(overshoot);
                self.state = PlayerState::Looped;
                log::trace!("Player '{}' looped to frame {}", self.name, self.current_frame);
                Some(PlayerEvent::Looped)
            }
            OnEnd::FadeOut => {
                self.evaluate();
                self.begin_fade();
                None
            }
        }
    }

    fn begin_fade(&mut self) {
        self.bone_snapshot.copy_from_slice(&self.bone_output);
        self.morph_snapshot.copy_from_slice(&self.morph_output);
        self.bone_fade = 1.0;
        self.morph_fade = 1.0;
        self.state = PlayerState::FadingOut;
        log::trace!("Player '{}' fading out at frame {}", self.name, self.current_frame);
    }

    fn advance_fade(&mut self, delta: f32) -> Option<PlayerEvent> {
        // The rest pose is written for one tick before the player goes away
        if self.bone_fade <= 0.0 && self.morph_fade <= 0.0 {
            self.state = PlayerState::Deleted;
            return Some(PlayerEvent::Deleted);
        }
        let step = |frames: f32| if frames > 0.0 { delta / frames } else { 1.0 };
        self.bone_fade = (self.bone_fade - step(self.playback.bone_fade_out_frames)).max(0.0);
        self.morph_fade = (self.morph_fade - step(self.playback.morph_fade_out_frames)).max(0.0);
        None
    }

    fn evaluate(&mut self) {
        let frame = self.current_frame;
        let fading = self.state == PlayerState::FadingOut;

        let bone_weight =
            smoothing_weight(self.bone_smooth_remaining, self.playback.bone_start_margin);
        for k in 0..self.bone_bindings.len() {
            self.bone_output[k] = if fading {
                Lerp::lerp(&BonePose::REST, &self.bone_snapshot[k], self.bone_fade)
            } else {
                let track = &self.motion.bone_tracks()[self.bone_bindings[k].track];
                let sampled = track.sample_with_hint(frame, &mut self.bone_cursors[k]);
                Lerp::lerp(&sampled, &self.bone_snapshot[k], bone_weight)
            };
        }

        let morph_weight =
            smoothing_weight(self.morph_smooth_remaining, self.playback.morph_start_margin);
        for k in 0..self.morph_bindings.len() {
            self.morph_output[k] = if fading {
                self.morph_snapshot[k] * self.morph_fade
            } else {
                let track = &self.motion.morph_tracks()[self.morph_bindings[k].track];
                let sampled = track.sample_with_hint(frame, &mut self.morph_cursors[k]);
                Lerp::lerp(&sampled, &self.morph_snapshot[k], morph_weight)
            };
        }
    }
}
