//! Bone definitions and runtime bone state

use glam::{Mat4, Quat, Vec3};

use crate::error::{PoseError, Result};

/// Bone kind tag as stored in the model's bone table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub enum BoneKind {
    #[default]
    Rotate = 0,
    RotateAndMove = 1,
    /// Bone an IK chain pulls its target toward
    IkDestination = 2,
    Unknown = 3,
    /// Bone rotated by an IK chain
    UnderIk = 4,
    /// Copies the target bone's rotation on top of its own
    UnderRotate = 5,
    /// End effector of an IK chain
    IkTarget = 6,
    NoDisplay = 7,
    Twist = 8,
    /// Copies a weighted share of the target bone's rotation
    FollowRotate = 9,
}

impl BoneKind {
    /// Whether the bone takes part in the co-rotation pass
    pub fn is_corotating(self) -> bool {
        matches!(self, Self::UnderRotate | Self::FollowRotate)
    }
}

impl TryFrom<u8> for BoneKind {
    type Error = PoseError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Rotate),
            1 => Ok(Self::RotateAndMove),
            2 => Ok(Self::IkDestination),
            3 => Ok(Self::Unknown),
            4 => Ok(Self::UnderIk),
            5 => Ok(Self::UnderRotate),
            6 => Ok(Self::IkTarget),
            7 => Ok(Self::NoDisplay),
            8 => Ok(Self::Twist),
            9 => Ok(Self::FollowRotate),
            _ => Err(PoseError::InvalidBoneKind(value)),
        }
    }
}

impl From<BoneKind> for u8 {
    fn from(value: BoneKind) -> Self {
        value as u8
    }
}

bitflags::bitflags! {
    /// Per-bone behavior flags
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
    pub struct BoneFlags: u8 {
        /// IK may only rotate this bone around its local X axis
        const LIMIT_ANGLE_X = 0x01;
        /// Ignores ancestor rotation, inherits only the parent's position
        const MOTION_INDEPENDENT = 0x02;
        /// World transform is driven by the physics collaborator
        const SIMULATED = 0x04;
    }
}

/// Closed range for an Euler angle in radians
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct AngleLimit {
    pub lower: f32,
    pub upper: f32,
}

impl AngleLimit {
    pub const fn new(lower: f32, upper: f32) -> Self {
        Self { lower, upper }
    }

    /// Both bounds finite and ordered
    pub fn is_valid(&self) -> bool {
        self.lower.is_finite() && self.upper.is_finite() && self.lower <= self.upper
    }

    pub fn clamp(&self, angle: f32) -> f32 {
        angle.clamp(self.lower, self.upper)
    }

    pub fn contains(&self, angle: f32) -> bool {
        (self.lower..=self.upper).contains(&angle)
    }

    /// Direction IK should push a fresh bone into: +1 when the allowed range
    /// lies on the positive side, -1 otherwise
    pub fn preferred_sign(&self) -> f32 {
        if self.upper > 0.0 { 1.0 } else { -1.0 }
    }
}

/// One row of the loader's bone table
///
/// Indices are signed; `-1` or anything out of range means "none".
#[derive(Debug, Clone, PartialEq)]
pub struct BoneDef {
    pub name: String,
    pub parent: i32,
    pub child: i32,
    pub kind: BoneKind,
    pub target: i32,
    /// Bind pose position in model space
    pub origin: Vec3,
    /// Share of the target rotation copied by co-rotating kinds
    pub rotate_coef: f32,
    pub flags: BoneFlags,
}

impl BoneDef {
    pub fn new(name: impl Into<String>, parent: i32, origin: Vec3) -> Self {
        Self {
            name: name.into(),
            parent,
            child: -1,
            kind: BoneKind::Rotate,
            target: -1,
            origin,
            rotate_coef: 1.0,
            flags: BoneFlags::empty(),
        }
    }

    pub fn with_kind(mut self, kind: BoneKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_child(mut self, child: i32) -> Self {
        self.child = child;
        self
    }

    pub fn with_target(mut self, target: i32) -> Self {
        self.target = target;
        self
    }

    pub fn with_rotate_coef(mut self, coef: f32) -> Self {
        self.rotate_coef = coef;
        self
    }

    pub fn with_flags(mut self, flags: BoneFlags) -> Self {
        self.flags |= flags;
        self
    }
}

/// Runtime bone owned by [`super::BoneGraph`]
#[derive(Debug, Clone)]
pub struct Bone {
    pub(crate) name: String,
    pub(crate) parent: Option<usize>,
    pub(crate) child: Option<usize>,
    pub(crate) kind: BoneKind,
    pub(crate) target: Option<usize>,
    pub(crate) origin: Vec3,
    /// Origin relative to the parent's origin, fixed at load
    pub(crate) offset: Vec3,
    pub(crate) flags: BoneFlags,
    pub(crate) limit_x: AngleLimit,
    pub(crate) rotate_coef: f32,
    pub(crate) position: Vec3,
    pub(crate) rotation: Quat,
    /// Extra rotation applied by the co-rotation pass this tick
    pub(crate) corotation: Quat,
    /// Procedural rotation layered on top by bone controllers
    pub(crate) overlay: Quat,
    pub(crate) world: Mat4,
}

impl Bone {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn child(&self) -> Option<usize> {
        self.child
    }

    pub fn kind(&self) -> BoneKind {
        self.kind
    }

    pub fn target(&self) -> Option<usize> {
        self.target
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn offset(&self) -> Vec3 {
        self.offset
    }

    pub fn flags(&self) -> BoneFlags {
        self.flags
    }

    pub fn is_simulated(&self) -> bool {
        self.flags.contains(BoneFlags::SIMULATED)
    }

    pub fn is_limit_angle_x(&self) -> bool {
        self.flags.contains(BoneFlags::LIMIT_ANGLE_X)
    }

    pub fn limit_x(&self) -> AngleLimit {
        self.limit_x
    }

    pub fn rotate_coef(&self) -> f32 {
        self.rotate_coef
    }

    /// Current local translation on top of the bind offset
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Current local rotation
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn overlay(&self) -> Quat {
        self.overlay
    }

    pub fn world(&self) -> Mat4 {
        self.world
    }

    pub fn world_position(&self) -> Vec3 {
        self.world.w_axis.truncate()
    }
}

/// Knee bones only bend one way
pub(crate) fn is_knee_name(name: &str) -> bool {
    name.contains("ひざ") || name.to_lowercase().contains("knee")
}
