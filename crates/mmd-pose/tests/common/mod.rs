//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use glam::{Quat, Vec3};
use mmd_pose::animation::{BoneKeyframe, BoneTrack, Motion};
use mmd_pose::{BoneDef, IkChainDef, ModelDef};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Minimal upper body plus one leg with a foot IK chain
///
/// 0 センター, 1 上半身, 2 首, 3 頭, 4 左足, 5 左ひざ, 6 左足首, 7 左足ＩＫ
pub fn humanoid() -> ModelDef {
    ModelDef {
        bones: vec![
            BoneDef::new("センター", -1, Vec3::new(0.0, 2.0, 0.0)),
            BoneDef::new("上半身", 0, Vec3::new(0.0, 2.2, 0.0)),
            BoneDef::new("首", 1, Vec3::new(0.0, 3.0, 0.0)),
            BoneDef::new("頭", 2, Vec3::new(0.0, 3.2, 0.0)),
            BoneDef::new("左足", 0, Vec3::new(0.2, 2.0, 0.0)),
            BoneDef::new("左ひざ", 4, Vec3::new(0.2, 1.0, 0.0)),
            BoneDef::new("左足首", 5, Vec3::new(0.2, 0.0, 0.0)),
            BoneDef::new("左足ＩＫ", -1, Vec3::new(0.2, 0.4, 0.3)),
        ],
        ik_chains: vec![IkChainDef {
            destination: 7,
            target: 6,
            chain: vec![5, 4],
            iterations: 40,
            angle_constraint: 2.0,
        }],
        morphs: vec!["まばたき".to_string(), "あ".to_string()],
    }
}

/// Two-keyframe track moving a bone along X and turning it around Y
pub fn sweep(bone: &str, frames: f32, distance: f32, angle: f32) -> BoneTrack {
    BoneTrack::new(
        bone,
        vec![
            BoneKeyframe::new(0.0, Vec3::ZERO, Quat::IDENTITY),
            BoneKeyframe::new(frames, Vec3::new(distance, 0.0, 0.0), Quat::from_rotation_y(angle)),
        ],
    )
    .unwrap()
}

pub fn motion(name: &str, tracks: Vec<BoneTrack>) -> Arc<Motion> {
    Arc::new(Motion::new(name, tracks, vec![]).unwrap())
}

pub fn assert_vec_near(actual: Vec3, expected: Vec3, tolerance: f32) {
    assert!(
        (actual - expected).length() <= tolerance,
        "{actual:?} is not within {tolerance} of {expected:?}"
    );
}
