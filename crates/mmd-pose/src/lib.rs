//! Skeletal pose core for MMD-style characters
//!
//! Builds a bone hierarchy from already-parsed model tables, plays recorded
//! motions on it with priority compositing, corrects IK chains with CCD and
//! layers procedural look-at overrides on top.
//!
//! # Example
//!
//! ```rust,ignore
//! use mmd_pose::{ModelDef, Rig, RigConfig};
//! use mmd_pose::animation::{MotionOptions, OnEnd};
//!
//! let mut rig = Rig::new(&model, RigConfig::default())?;
//! rig.start_motion("dance", motion, MotionOptions { on_end: OnEnd::Loop, ..Default::default() })?;
//!
//! // 60 Hz render loop, motions run at 30 frames per second
//! rig.tick(0.5);
//! let skinning: Vec<_> = rig.bones().skinning_transforms().collect();
//! ```

pub mod animation;
pub mod config;
pub mod controller;
pub mod diagnostics;
pub mod error;
pub mod ik;
pub mod rig;
pub mod skeleton;

// Re-export common types
pub use config::{FRAMES_PER_SECOND, IkConfig, PlaybackConfig, RigConfig};
pub use controller::BoneController;
pub use diagnostics::{Anomaly, CollectingDiagnostics, Diagnostics, LogDiagnostics};
pub use error::{PoseError, Result};
pub use ik::{IkChainDef, IkReport, IkSolver};
pub use rig::{ModelDef, Rig};
pub use skeleton::{BoneDef, BoneFlags, BoneGraph, BoneKind, MorphWeights};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
