//! Common value types for the animation system

use glam::{Quat, Vec3};

/// Trait for types that can be interpolated between two samples
pub trait Lerp: Copy {
    /// Interpolation between self and other, `t` in `[0, 1]`
    fn lerp(&self, other: &Self, t: f32) -> Self;
}

impl Lerp for f32 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        self + (other - self) * t
    }
}

impl Lerp for Vec3 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        Self::new(
            Lerp::lerp(&self.x, &other.x, t),
            Lerp::lerp(&self.y, &other.y, t),
            Lerp::lerp(&self.z, &other.z, t),
        )
    }
}

impl Lerp for Quat {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        // Shortest-arc spherical interpolation
        self.slerp(*other, t)
    }
}

/// Local translation and rotation of one bone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BonePose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl BonePose {
    /// Bind pose: no translation on top of the offset, no rotation
    pub const REST: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub const fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }
}

impl Default for BonePose {
    fn default() -> Self {
        Self::REST
    }
}

impl Lerp for BonePose {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        if t <= 0.0 {
            return *self;
        }
        if t >= 1.0 {
            return *other;
        }
        Self {
            position: Lerp::lerp(&self.position, &other.position, t),
            rotation: Lerp::lerp(&self.rotation, &other.rotation, t),
        }
    }
}
