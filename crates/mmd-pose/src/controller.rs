//! Procedural look-at overrides layered on top of keyframe motion
//!
//! A controller turns a set of bones toward a world-space point. The override
//! is stored on each bone separately from its keyframe rotation, eased in while
//! the controller is enabled and eased back out after it is disabled.

use glam::{EulerRot, Quat, Vec3};

use crate::diagnostics::Anomaly;
use crate::error::{PoseError, Result};
use crate::skeleton::BoneGraph;

const MIN_AXIS_SQ: f32 = 1.0e-12;

/// Look-at controller for one or more bones (head, neck, eyes)
#[derive(Debug, Clone)]
pub struct BoneController {
    name: String,
    bone_names: Vec<String>,
    /// Resolved bone indices, parallel to `held`
    bones: Vec<usize>,
    held: Vec<Quat>,
    /// Direction the bones face at rest, in bone-local space
    base_vector: Vec3,
    /// Euler limits in radians, components are X, Y, Z
    lower: Vec3,
    upper: Vec3,
    rate_on: f32,
    rate_off: f32,
    enabled: bool,
    fading_rate: f32,
}

impl BoneController {
    pub fn new(
        name: impl Into<String>,
        bone_names: Vec<String>,
        base_vector: Vec3,
        lower: Vec3,
        upper: Vec3,
        rate_on: f32,
        rate_off: f32,
    ) -> Result<Self> {
        let name = name.into();
        let Some(base_vector) = base_vector.try_normalize() else {
            return Err(PoseError::InvalidOptions(format!(
                "controller '{name}' needs a non-zero base vector"
            )));
        };
        if !lower.is_finite() || !upper.is_finite() {
            return Err(PoseError::InvalidOptions(format!(
                "controller '{name}' limits must be finite, got {lower} and {upper}"
            )));
        }
        if lower.cmpgt(upper).any() {
            return Err(PoseError::InvalidOptions(format!(
                "controller '{name}' lower limit {lower} exceeds upper limit {upper}"
            )));
        }
        if !(rate_on.is_finite() && rate_on >= 0.0 && rate_off.is_finite() && rate_off >= 0.0) {
            return Err(PoseError::InvalidOptions(format!(
                "controller '{name}' rates must be finite and non-negative"
            )));
        }
        Ok(Self {
            name,
            bone_names,
            bones: Vec::new(),
            held: Vec::new(),
            base_vector,
            lower,
            upper,
            rate_on,
            rate_off,
            enabled: false,
            fading_rate: 0.0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bone_names(&self) -> &[String] {
        &self.bone_names
    }

    /// Indices of the bones that resolved during the last bind
    pub fn bones(&self) -> &[usize] {
        &self.bones
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the controller still touches its bones
    pub fn is_active(&self) -> bool {
        self.enabled || self.fading_rate > 0.0
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Held override of the `k`th bound bone
    pub fn held_rotation(&self, k: usize) -> Option<Quat> {
        self.held.get(k).copied()
    }

    /// Resolve bone names against a (possibly new) model
    ///
    /// Resets every held override.
    pub fn bind(&mut self, bones: &BoneGraph) {
        self.bones.clear();
        for name in &self.bone_names {
            match bones.find(name) {
                Some(index) => self.bones.push(index),
                None => bones.diagnostics().report(&Anomaly::UnboundControllerBone {
                    controller: self.name.clone(),
                    bone: name.clone(),
                }),
            }
        }
        self.held = vec![Quat::IDENTITY; self.bones.len()];
        self.fading_rate = 0.0;
    }

    /// Apply the override for this tick
    ///
    /// Must run after motion, IK and co-rotation have settled the pose.
    pub fn update(&mut self, bones: &mut BoneGraph, target: Vec3, delta: f32) {
        if self.enabled {
            self.track(bones, target, delta);
        } else if self.fading_rate > 0.0 {
            self.release(bones, delta);
        }
    }

    fn track(&mut self, bones: &mut BoneGraph, target: Vec3, delta: f32) {
        let rate = (self.rate_on * delta).clamp(0.0, 1.0);
        for k in 0..self.bones.len() {
            let index = self.bones[k];
            if bones.bone(index).is_none_or(|b| b.is_simulated()) {
                continue;
            }

            let held = match self.aim(bones, index, target) {
                Some(aim) => self.held[k].slerp(aim, rate),
                None => self.held[k],
            };
            self.held[k] = limit_to_bone(bones, index, held);
            bones.set_overlay(index, self.held[k]);
            bones.update_subtree(index);
        }
        self.fading_rate = 1.0;
    }

    /// Clamped rotation turning the base vector toward `target`
    fn aim(&self, bones: &BoneGraph, index: usize, target: Vec3) -> Option<Quat> {
        // The current world transform already carries last tick's
        // override, so measure from the keyframe-only frame
        let overlay = bones.bone(index)?.overlay();
        let local = bones.world_transform(index).inverse().transform_point3(target);
        let direction = (overlay * local).try_normalize()?;

        let axis = self.base_vector.cross(direction);
        if axis.length_squared() < MIN_AXIS_SQ {
            return None;
        }
        let angle = self.base_vector.dot(direction).clamp(-1.0, 1.0).acos();
        let (z, y, x) = Quat::from_axis_angle(axis.normalize(), angle).to_euler(EulerRot::ZYX);
        Some(Quat::from_euler(
            EulerRot::ZYX,
            z.clamp(self.lower.z, self.upper.z),
            y.clamp(self.lower.y, self.upper.y),
            x.clamp(self.lower.x, self.upper.x),
        ))
    }

    fn release(&mut self, bones: &mut BoneGraph, delta: f32) {
        let previous = self.fading_rate;
        self.fading_rate = (previous - (self.rate_off * delta).max(0.0)).max(0.0);
        let finished = self.fading_rate <= 0.0;
        // Scale the override with the accumulator so both reach zero together
        let weight = self.fading_rate / previous;

        for k in 0..self.bones.len() {
            let index = self.bones[k];
            self.held[k] = if finished {
                Quat::IDENTITY
            } else {
                limit_to_bone(bones, index, Quat::IDENTITY.slerp(self.held[k], weight))
            };
            bones.set_overlay(index, self.held[k]);
            bones.update_subtree(index);
        }
        if finished {
            log::trace!("Controller '{}' released its bones", self.name);
        }
    }
}

/// Knee-like bones only take the X part of an override, kept so that the
/// combined X angle stays inside the bone's limit
fn limit_to_bone(bones: &BoneGraph, index: usize, overlay: Quat) -> Quat {
    let Some(bone) = bones.bone(index) else {
        return overlay;
    };
    if !bone.is_limit_angle_x() {
        return overlay;
    }
    let limit = bone.limit_x();
    let (_, _, current_x) = bone.rotation().to_euler(EulerRot::ZYX);
    let (_, _, x) = overlay.to_euler(EulerRot::ZYX);
    Quat::from_rotation_x(x.clamp(limit.lower - current_x, limit.upper - current_x))
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_4;
    use std::sync::Arc;

    use super::*;
    use crate::config::IkConfig;
    use crate::diagnostics::CollectingDiagnostics;
    use crate::skeleton::BoneDef;

    fn head() -> BoneGraph {
        let defs = vec![
            BoneDef::new("首", -1, Vec3::new(0.0, 1.0, 0.0)),
            BoneDef::new("頭", 0, Vec3::new(0.0, 1.2, 0.0)),
            BoneDef::new("鼻", 1, Vec3::new(0.0, 1.2, 0.1)),
        ];
        BoneGraph::new(&defs)
    }

    fn look_at(upper_y: f32, rate_on: f32, rate_off: f32) -> BoneController {
        BoneController::new(
            "look",
            vec!["頭".to_string()],
            Vec3::Z,
            Vec3::new(-1.0, -upper_y, -1.0),
            Vec3::new(1.0, upper_y, 1.0),
            rate_on,
            rate_off,
        )
        .unwrap()
    }

    fn yaw(bones: &BoneGraph, index: usize) -> f32 {
        let (_, y, _) = bones.bone(index).unwrap().overlay().to_euler(EulerRot::ZYX);
        y
    }

    #[test]
    fn test_turns_toward_target() {
        let mut bones = head();
        let mut controller = look_at(1.0, 1.0, 1.0);
        controller.bind(&bones);
        controller.set_enabled(true);

        controller.update(&mut bones, Vec3::new(1.0, 1.2, 1.0), 1.0);
        assert!((yaw(&bones, 1) - FRAC_PI_4).abs() < 1e-4);
        // The nose follows the head toward +X
        assert!(bones.world_position(2).x > 0.05);
    }

    #[test]
    fn test_limit_clamps_rotation() {
        let mut bones = head();
        let mut controller = look_at(0.5, 1.0, 1.0);
        controller.bind(&bones);
        controller.set_enabled(true);

        controller.update(&mut bones, Vec3::new(1.0, 1.2, 1.0), 1.0);
        assert!((yaw(&bones, 1) - 0.5).abs() < 1e-4);

        // Re-measuring next tick does not accumulate the override
        controller.update(&mut bones, Vec3::new(1.0, 1.2, 1.0), 1.0);
        assert!((yaw(&bones, 1) - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_rate_eases_in() {
        let mut bones = head();
        let mut controller = look_at(1.0, 0.1, 1.0);
        controller.bind(&bones);
        controller.set_enabled(true);

        controller.update(&mut bones, Vec3::new(1.0, 1.2, 1.0), 1.0);
        let first = yaw(&bones, 1);
        assert!(first > 0.0 && first < FRAC_PI_4 * 0.2);
    }

    #[test]
    fn test_fades_back_to_keyframe_rotation() {
        let mut bones = head();
        let mut controller = look_at(1.0, 1.0, 0.25);
        controller.bind(&bones);
        controller.set_enabled(true);
        controller.update(&mut bones, Vec3::new(1.0, 1.2, 1.0), 1.0);

        controller.set_enabled(false);
        controller.update(&mut bones, Vec3::ZERO, 1.0);
        assert!(controller.is_active());
        let partial = yaw(&bones, 1);
        assert!(partial > 0.0 && partial < FRAC_PI_4);

        // The return is even: no tick moves further than the one before
        let mut previous_yaw = partial;
        let mut previous_step = FRAC_PI_4 - partial;
        for _ in 0..3 {
            controller.update(&mut bones, Vec3::ZERO, 1.0);
            let step = previous_yaw - yaw(&bones, 1);
            assert!(step >= 0.0, "moved away by {step}");
            assert!(step <= previous_step + 1e-4, "step {step} after {previous_step}");
            previous_yaw = yaw(&bones, 1);
            previous_step = step;
        }
        assert!(previous_yaw.abs() < 1e-6);
        controller.update(&mut bones, Vec3::ZERO, 1.0);
        assert!(!controller.is_active());
        assert_eq!(bones.bone(1).unwrap().overlay(), Quat::IDENTITY);
        assert!((bones.world_position(2) - Vec3::new(0.0, 1.2, 0.1)).length() < 1e-5);
    }

    #[test]
    fn test_knee_override_respects_limit() {
        let defs = vec![
            BoneDef::new("左足", -1, Vec3::new(0.0, 2.0, 0.0)),
            BoneDef::new("左ひざ", 0, Vec3::new(0.0, 1.0, 0.0)),
            BoneDef::new("左足首", 1, Vec3::ZERO),
        ];
        let mut bones = BoneGraph::new(&defs);
        bones.set_rotation(1, Quat::from_rotation_x(0.3));
        bones.update();

        let mut controller = BoneController::new(
            "knee",
            vec!["左ひざ".to_string()],
            Vec3::NEG_Y,
            Vec3::splat(-1.5),
            Vec3::splat(1.5),
            1.0,
            1.0,
        )
        .unwrap();
        controller.bind(&bones);
        controller.set_enabled(true);

        // Target in front of the shin asks the knee to straighten past its limit
        controller.update(&mut bones, Vec3::new(0.0, 0.0, 5.0), 1.0);
        let knee = bones.bone(1).unwrap();
        let (z, y, x) = (knee.rotation() * knee.overlay()).to_euler(EulerRot::ZYX);
        assert!(knee.limit_x().contains(x) || (x - knee.limit_x().lower).abs() < 1e-5);
        assert!(z.abs() < 1e-5 && y.abs() < 1e-5);
        assert!(knee.overlay().angle_between(Quat::IDENTITY) > 0.1);
    }

    #[test]
    fn test_unbound_bone_reported() {
        let sink = Arc::new(CollectingDiagnostics::new());
        let defs = vec![BoneDef::new("頭", -1, Vec3::ZERO)];
        let bones = BoneGraph::with_config(&defs, &IkConfig::default(), sink.clone());
        let mut controller = BoneController::new(
            "eyes",
            vec!["左目".to_string(), "頭".to_string()],
            Vec3::Z,
            Vec3::splat(-1.0),
            Vec3::splat(1.0),
            1.0,
            1.0,
        )
        .unwrap();
        controller.bind(&bones);
        assert_eq!(controller.bones(), &[0]);
        assert!(matches!(
            &sink.anomalies()[0],
            Anomaly::UnboundControllerBone { bone, .. } if bone == "左目"
        ));
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let zero = BoneController::new(
            "bad",
            vec![],
            Vec3::ZERO,
            Vec3::ZERO,
            Vec3::ZERO,
            1.0,
            1.0,
        );
        assert!(zero.is_err());
        let inverted = BoneController::new(
            "bad",
            vec![],
            Vec3::Z,
            Vec3::ONE,
            Vec3::ZERO,
            1.0,
            1.0,
        );
        assert!(inverted.is_err());
        let non_finite = BoneController::new(
            "bad",
            vec![],
            Vec3::Z,
            Vec3::new(f32::NAN, -1.0, -1.0),
            Vec3::ONE,
            1.0,
            1.0,
        );
        assert!(non_finite.is_err());
    }
}
