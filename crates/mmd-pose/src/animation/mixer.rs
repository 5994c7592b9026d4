//! Concurrent motion players with priority compositing

use std::sync::Arc;

use super::motion::Motion;
use super::player::{MotionOptions, MotionPlayer};
use super::state::PlayerEvent;
use crate::config::PlaybackConfig;
use crate::error::Result;
use crate::skeleton::{BoneGraph, MorphWeights};

/// Stable identifier of a player inside a [`MotionMixer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MotionHandle(u64);

impl MotionHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Lifecycle notification produced by [`MotionMixer::advance`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MixerEvent {
    Looped { handle: MotionHandle, name: String },
    Deleted { handle: MotionHandle, name: String },
}

#[derive(Debug, Clone)]
struct Slot {
    handle: MotionHandle,
    player: MotionPlayer,
}

/// Runs every player of one model and composites their samples
///
/// Players are kept sorted by `(priority, start order)` and written in that
/// order, so for a bone touched by several players the highest priority wins
/// and ties go to the most recently started one.
#[derive(Debug, Clone, Default)]
pub struct MotionMixer {
    slots: Vec<Slot>,
    next_id: u64,
}

impl MotionMixer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Bind and start a motion under an alias
    pub fn start(
        &mut self,
        name: impl Into<String>,
        motion: Arc<Motion>,
        options: MotionOptions,
        playback: PlaybackConfig,
        bones: &BoneGraph,
        morphs: &MorphWeights,
    ) -> Result<MotionHandle> {
        let player = MotionPlayer::new(name, motion, options, playback, bones, morphs)?;
        Ok(self.insert(player))
    }

    /// Take ownership of an already bound player
    pub fn insert(&mut self, mut player: MotionPlayer) -> MotionHandle {
        let handle = MotionHandle(self.next_id);
        self.next_id += 1;
        player.set_sequence(handle.0);
        log::debug!(
            "Starting motion '{}' as '{}' (priority {})",
            player.motion().name(),
            player.name(),
            player.priority()
        );
        self.slots.push(Slot { handle, player });
        self.sort();
        handle
    }

    fn sort(&mut self) {
        self.slots
            .sort_by_key(|slot| (slot.player.priority(), slot.player.sequence()));
    }

    pub fn get(&self, handle: MotionHandle) -> Option<&MotionPlayer> {
        self.slots
            .iter()
            .find(|slot| slot.handle == handle)
            .map(|slot| &slot.player)
    }

    pub fn get_mut(&mut self, handle: MotionHandle) -> Option<&mut MotionPlayer> {
        self.slots
            .iter_mut()
            .find(|slot| slot.handle == handle)
            .map(|slot| &mut slot.player)
    }

    /// Most recently started live player with the given alias
    pub fn find(&self, name: &str) -> Option<MotionHandle> {
        self.slots
            .iter()
            .filter(|slot| !slot.player.is_deleted() && slot.player.name() == name)
            .max_by_key(|slot| slot.player.sequence())
            .map(|slot| slot.handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = (MotionHandle, &MotionPlayer)> {
        self.slots.iter().map(|slot| (slot.handle, &slot.player))
    }

    /// Fade a player out; returns false for unknown handles
    pub fn stop(&mut self, handle: MotionHandle) -> bool {
        let Some(player) = self.get_mut(handle) else {
            return false;
        };
        player.stop();
        true
    }

    /// Delete a player immediately; it is purged on the next advance
    pub fn remove(&mut self, handle: MotionHandle) -> bool {
        let Some(player) = self.get_mut(handle) else {
            return false;
        };
        player.remove();
        true
    }

    pub fn swap_motion(
        &mut self,
        handle: MotionHandle,
        motion: Arc<Motion>,
        bones: &BoneGraph,
        morphs: &MorphWeights,
    ) -> bool {
        let Some(player) = self.get_mut(handle) else {
            return false;
        };
        player.swap_motion(motion, bones, morphs);
        true
    }

    pub fn set_priority(&mut self, handle: MotionHandle, priority: i32) -> bool {
        let Some(player) = self.get_mut(handle) else {
            return false;
        };
        player.set_priority(priority);
        self.sort();
        true
    }

    /// Re-resolve every player against a replaced model
    pub fn rebind(&mut self, bones: &BoneGraph, morphs: &MorphWeights) {
        for slot in &mut self.slots {
            slot.player.rebind(bones, morphs);
        }
    }

    /// Advance every player, then purge the deleted ones
    pub fn advance(&mut self, delta: f32) -> Vec<MixerEvent> {
        let mut events = Vec::new();
        for slot in &mut self.slots {
            if slot.player.advance(delta) == Some(PlayerEvent::Looped) {
                events.push(MixerEvent::Looped {
                    handle: slot.handle,
                    name: slot.player.name().to_string(),
                });
            }
        }

        self.slots.retain(|slot| {
            if slot.player.is_deleted() {
                log::debug!("Motion '{}' deleted", slot.player.name());
                events.push(MixerEvent::Deleted {
                    handle: slot.handle,
                    name: slot.player.name().to_string(),
                });
                false
            } else {
                true
            }
        });
        events
    }

    /// Write the winning samples into the model
    ///
    /// Bones and morphs no player touches keep their current values.
    pub fn apply(&self, bones: &mut BoneGraph, morphs: &mut MorphWeights) {
        for slot in &self.slots {
            if slot.player.is_deleted() {
                continue;
            }
            for (bone, pose) in slot.player.bone_samples() {
                bones.set_local_pose(bone, pose.position, pose.rotation);
            }
            for (morph, weight) in slot.player.morph_samples() {
                morphs.set_weight(morph, weight);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::animation::{BoneKeyframe, BoneTrack, OnEnd};
    use crate::skeleton::BoneDef;

    fn model() -> (BoneGraph, MorphWeights) {
        let defs = vec![
            BoneDef::new("センター", -1, Vec3::ZERO),
            BoneDef::new("頭", 0, Vec3::Y),
        ];
        (BoneGraph::new(&defs), MorphWeights::default())
    }

    fn hold(name: &str, bone: &str, x: f32) -> Arc<Motion> {
        let track = BoneTrack::new(
            bone,
            vec![
                BoneKeyframe::new(0.0, Vec3::new(x, 0.0, 0.0), Quat::IDENTITY),
                BoneKeyframe::new(60.0, Vec3::new(x, 0.0, 0.0), Quat::IDENTITY),
            ],
        )
        .unwrap();
        Arc::new(Motion::new(name, vec![track], vec![]).unwrap())
    }

    fn options(priority: i32) -> MotionOptions {
        MotionOptions {
            priority,
            enable_smooth: false,
            ..MotionOptions::default()
        }
    }

    fn start(
        mixer: &mut MotionMixer,
        bones: &BoneGraph,
        morphs: &MorphWeights,
        name: &str,
        x: f32,
        priority: i32,
    ) -> MotionHandle {
        mixer
            .start(
                name,
                hold(name, "頭", x),
                options(priority),
                PlaybackConfig::default(),
                bones,
                morphs,
            )
            .unwrap()
    }

    #[test]
    fn test_higher_priority_wins_regardless_of_order() {
        let (mut bones, mut morphs) = model();
        let mut mixer = MotionMixer::new();
        start(&mut mixer, &bones, &morphs, "high", 5.0, 10);
        start(&mut mixer, &bones, &morphs, "low", 1.0, 0);

        mixer.advance(1.0);
        mixer.apply(&mut bones, &mut morphs);
        assert_eq!(bones.bone(1).unwrap().position().x, 5.0);
    }

    #[test]
    fn test_equal_priority_latest_wins() {
        let (mut bones, mut morphs) = model();
        let mut mixer = MotionMixer::new();
        start(&mut mixer, &bones, &morphs, "first", 1.0, 0);
        start(&mut mixer, &bones, &morphs, "second", 2.0, 0);

        mixer.advance(1.0);
        mixer.apply(&mut bones, &mut morphs);
        assert_eq!(bones.bone(1).unwrap().position().x, 2.0);
    }

    #[test]
    fn test_untouched_bone_keeps_pose() {
        let (mut bones, mut morphs) = model();
        bones.set_position(0, Vec3::new(0.0, 0.0, 7.0));
        let mut mixer = MotionMixer::new();
        start(&mut mixer, &bones, &morphs, "head", 1.0, 0);

        mixer.advance(1.0);
        mixer.apply(&mut bones, &mut morphs);
        assert_eq!(bones.bone(0).unwrap().position(), Vec3::new(0.0, 0.0, 7.0));
    }

    #[test]
    fn test_priority_change_resorts() {
        let (mut bones, mut morphs) = model();
        let mut mixer = MotionMixer::new();
        let a = start(&mut mixer, &bones, &morphs, "a", 1.0, 5);
        start(&mut mixer, &bones, &morphs, "b", 2.0, 1);

        assert!(mixer.set_priority(a, 0));
        mixer.advance(1.0);
        mixer.apply(&mut bones, &mut morphs);
        assert_eq!(bones.bone(1).unwrap().position().x, 2.0);
    }

    #[test]
    fn test_remove_purges_with_event() {
        let (bones, morphs) = model();
        let mut mixer = MotionMixer::new();
        let handle = start(&mut mixer, &bones, &morphs, "wave", 1.0, 0);
        assert_eq!(mixer.find("wave"), Some(handle));

        assert!(mixer.remove(handle));
        assert_eq!(mixer.find("wave"), None);
        let events = mixer.advance(1.0);
        assert_eq!(
            events,
            vec![MixerEvent::Deleted {
                handle,
                name: "wave".to_string()
            }]
        );
        assert!(mixer.is_empty());
        assert!(!mixer.remove(handle));
    }

    #[test]
    fn test_loop_event() {
        let (bones, morphs) = model();
        let mut mixer = MotionMixer::new();
        let handle = mixer
            .start(
                "idle",
                hold("idle", "頭", 0.0),
                MotionOptions {
                    on_end: OnEnd::Loop,
                    ..options(0)
                },
                PlaybackConfig::default(),
                &bones,
                &morphs,
            )
            .unwrap();
        assert!(mixer.advance(59.0).is_empty());
        let events = mixer.advance(2.0);
        assert_eq!(
            events,
            vec![MixerEvent::Looped {
                handle,
                name: "idle".to_string()
            }]
        );
    }

    #[test]
    fn test_find_prefers_latest() {
        let (bones, morphs) = model();
        let mut mixer = MotionMixer::new();
        start(&mut mixer, &bones, &morphs, "dup", 1.0, 9);
        let latest = start(&mut mixer, &bones, &morphs, "dup", 1.0, 0);
        assert_eq!(mixer.find("dup"), Some(latest));
    }
}
