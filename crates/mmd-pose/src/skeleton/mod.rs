//! Bone hierarchy and morph weights

mod bone;
mod graph;
mod morph;

pub use bone::{AngleLimit, Bone, BoneDef, BoneFlags, BoneKind};
pub use graph::BoneGraph;
pub use morph::MorphWeights;
