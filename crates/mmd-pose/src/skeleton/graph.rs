//! Bone hierarchy transform computation
//!
//! The graph owns every bone in a flat arena. Parents are always updated
//! before their children by walking a depth-first order computed at load,
//! and each bone's descendants occupy a contiguous range of that order so a
//! subtree can be re-propagated without allocating.

use std::collections::HashMap;

use glam::{Mat4, Quat, Vec3};

use super::bone::{AngleLimit, Bone, BoneDef, BoneFlags, is_knee_name};
use crate::config::IkConfig;
use crate::diagnostics::{Anomaly, Diagnostics, SharedDiagnostics, log_diagnostics};

/// Arena of bones plus the traversal tables derived from it
pub struct BoneGraph {
    bones: Vec<Bone>,
    /// Depth-first order, parents before children
    order: Vec<usize>,
    /// Position of each bone in `order`
    order_pos: Vec<usize>,
    /// Exclusive end of each bone's subtree in `order`
    subtree_end: Vec<usize>,
    /// Co-rotating bones in tree order
    corotated: Vec<usize>,
    names: HashMap<String, usize>,
    root_transform: Mat4,
    root_inverse: Mat4,
    root_offset: Vec3,
    diagnostics: SharedDiagnostics,
}

fn resolve_index(index: i32, count: usize) -> Option<usize> {
    usize::try_from(index).ok().filter(|&i| i < count)
}

impl BoneGraph {
    /// Build a graph with default limits, logging anomalies through `log`
    pub fn new(defs: &[BoneDef]) -> Self {
        Self::with_config(defs, &IkConfig::default(), log_diagnostics())
    }

    /// Build a graph from the loader's bone table
    ///
    /// Dangling references are dropped (a bone with a missing parent becomes
    /// a top-level bone) and parent cycles are broken; both are reported.
    pub fn with_config(defs: &[BoneDef], ik: &IkConfig, diagnostics: SharedDiagnostics) -> Self {
        let count = defs.len();
        let mut limit_x = AngleLimit::new(ik.limit_x_lower, ik.limit_x_upper);
        if !limit_x.is_valid() {
            log::warn!("Ignoring invalid X limit {limit_x:?}, using the default range");
            let fallback = IkConfig::default();
            limit_x = AngleLimit::new(fallback.limit_x_lower, fallback.limit_x_upper);
        }
        let mut bones = Vec::with_capacity(count);
        let mut names = HashMap::with_capacity(count);

        for (index, def) in defs.iter().enumerate() {
            let resolve = |raw: i32, field: &'static str| {
                let resolved = resolve_index(raw, count);
                if resolved.is_none() && raw >= 0 {
                    diagnostics.report(&Anomaly::DanglingBoneReference {
                        bone: def.name.clone(),
                        field,
                        index: raw,
                    });
                }
                resolved
            };
            let parent = resolve(def.parent, "parent");
            let child = resolve(def.child, "child");
            let target = resolve(def.target, "target");

            let mut flags = def.flags;
            if is_knee_name(&def.name) {
                flags |= BoneFlags::LIMIT_ANGLE_X;
            }

            if names.contains_key(&def.name) {
                diagnostics.report(&Anomaly::DuplicateBoneName {
                    name: def.name.clone(),
                });
            } else {
                names.insert(def.name.clone(), index);
            }

            bones.push(Bone {
                name: def.name.clone(),
                parent,
                child,
                kind: def.kind,
                target,
                origin: def.origin,
                offset: def.origin,
                flags,
                limit_x,
                rotate_coef: def.rotate_coef,
                position: Vec3::ZERO,
                rotation: Quat::IDENTITY,
                corotation: Quat::IDENTITY,
                overlay: Quat::IDENTITY,
                world: Mat4::from_translation(def.origin),
            });
        }

        break_parent_cycles(&mut bones, diagnostics.as_ref());

        for index in 0..count {
            if let Some(parent) = bones[index].parent {
                bones[index].offset = bones[index].origin - bones[parent].origin;
            }
        }

        let (order, order_pos, subtree_end) = depth_first_order(&bones);
        let corotated = order
            .iter()
            .copied()
            .filter(|&i| bones[i].kind.is_corotating() && bones[i].target.is_some())
            .collect();

        let mut graph = Self {
            bones,
            order,
            order_pos,
            subtree_end,
            corotated,
            names,
            root_transform: Mat4::IDENTITY,
            root_inverse: Mat4::IDENTITY,
            root_offset: Vec3::ZERO,
            diagnostics,
        };
        graph.update();
        graph
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn bone(&self, index: usize) -> Option<&Bone> {
        self.bones.get(index)
    }

    /// Look a bone up by its UTF-8 name
    pub fn find(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    pub fn diagnostics(&self) -> &SharedDiagnostics {
        &self.diagnostics
    }

    /// Whether `ancestor` lies strictly above `bone` in the hierarchy
    pub fn is_ancestor(&self, ancestor: usize, bone: usize) -> bool {
        if ancestor >= self.bones.len() || bone >= self.bones.len() || ancestor == bone {
            return false;
        }
        let pos = self.order_pos[bone];
        pos > self.order_pos[ancestor] && pos < self.subtree_end[ancestor]
    }

    /// Model placement applied above all top-level bones
    pub fn root_transform(&self) -> Mat4 {
        self.root_transform
    }

    pub fn set_root_transform(&mut self, transform: Mat4) {
        self.root_transform = transform;
        self.root_inverse = transform.inverse();
    }

    /// Model-space translation added to every top-level bone
    pub fn root_offset(&self) -> Vec3 {
        self.root_offset
    }

    pub fn set_root_offset(&mut self, offset: Vec3) {
        self.root_offset = offset;
    }

    pub fn set_position(&mut self, index: usize, position: Vec3) {
        if let Some(bone) = self.bones.get_mut(index) {
            bone.position = position;
        }
    }

    pub fn set_rotation(&mut self, index: usize, rotation: Quat) {
        if let Some(bone) = self.bones.get_mut(index) {
            bone.rotation = rotation;
        }
    }

    pub fn set_local_pose(&mut self, index: usize, position: Vec3, rotation: Quat) {
        if let Some(bone) = self.bones.get_mut(index) {
            bone.position = position;
            bone.rotation = rotation;
        }
    }

    /// Set the procedural rotation applied after the local and co-rotation
    pub fn set_overlay(&mut self, index: usize, overlay: Quat) {
        if let Some(bone) = self.bones.get_mut(index) {
            bone.overlay = overlay;
        }
    }

    /// Replace a bone's X limit; inverted or non-finite limits are refused
    pub fn set_limit_x(&mut self, index: usize, limit: AngleLimit) -> bool {
        if !limit.is_valid() {
            log::debug!("Refusing X limit {limit:?} for bone {index}");
            return false;
        }
        match self.bones.get_mut(index) {
            Some(bone) => {
                bone.limit_x = limit;
                true
            }
            None => false,
        }
    }

    /// Hand a bone over to (or take it back from) the physics collaborator
    pub fn set_simulated(&mut self, index: usize, simulated: bool) {
        if let Some(bone) = self.bones.get_mut(index) {
            bone.flags.set(BoneFlags::SIMULATED, simulated);
        }
    }

    /// Write a physics-driven world transform into a simulated bone
    ///
    /// Ignored for bones that are not simulated.
    pub fn inject_world_transform(&mut self, index: usize, world: Mat4) {
        if let Some(bone) = self.bones.get_mut(index)
            && bone.is_simulated()
        {
            bone.world = world;
        }
    }

    /// Return every bone to its bind pose
    pub fn reset_pose(&mut self) {
        for bone in &mut self.bones {
            bone.position = Vec3::ZERO;
            bone.rotation = Quat::IDENTITY;
            bone.corotation = Quat::IDENTITY;
            bone.overlay = Quat::IDENTITY;
        }
        self.update();
    }

    /// Recompute every world transform in tree order
    pub fn update(&mut self) {
        for &index in &self.corotated {
            self.bones[index].corotation = Quat::IDENTITY;
        }
        for pos in 0..self.order.len() {
            self.update_bone(self.order[pos]);
        }
    }

    /// Recompute a single bone from its parent's current transform
    pub fn update_bone(&mut self, index: usize) {
        let Some(bone) = self.bones.get(index) else {
            return;
        };
        if bone.is_simulated() {
            return;
        }
        let world = self.compute_world(index);
        self.bones[index].world = world;
    }

    /// Recompute a bone and all of its descendants
    pub fn update_subtree(&mut self, index: usize) {
        if index >= self.bones.len() {
            return;
        }
        for pos in self.order_pos[index]..self.subtree_end[index] {
            self.update_bone(self.order[pos]);
        }
    }

    /// Co-rotation pass for UnderRotate and FollowRotate bones
    ///
    /// Must run after all primary bones are current.
    pub fn update_rotate(&mut self) {
        for i in 0..self.corotated.len() {
            let index = self.corotated[i];
            let Some(target) = self.bones[index].target else {
                continue;
            };
            if self.bones[index].is_simulated() {
                continue;
            }
            let target_rotation = self.bones[target].rotation;
            let coef = self.bones[index].rotate_coef;
            self.bones[index].corotation = if coef == 1.0 {
                target_rotation
            } else {
                Quat::IDENTITY.slerp(target_rotation, coef)
            };
            self.update_subtree(index);
        }
    }

    fn compute_world(&self, index: usize) -> Mat4 {
        let bone = &self.bones[index];
        let rotation = bone.rotation * bone.corotation * bone.overlay;
        let local = bone.offset + bone.position;

        match bone.parent {
            Some(parent) => {
                let parent_world = self.bones[parent].world;
                if bone.flags.contains(BoneFlags::MOTION_INDEPENDENT) {
                    let anchor = self
                        .root_inverse
                        .transform_point3(parent_world.w_axis.truncate());
                    self.root_transform * Mat4::from_rotation_translation(rotation, anchor + local)
                } else {
                    parent_world * Mat4::from_rotation_translation(rotation, local)
                }
            }
            None => {
                self.root_transform
                    * Mat4::from_rotation_translation(rotation, self.root_offset + local)
            }
        }
    }

    pub fn world_transform(&self, index: usize) -> Mat4 {
        self.bones
            .get(index)
            .map_or(Mat4::IDENTITY, |b| b.world)
    }

    pub fn world_position(&self, index: usize) -> Vec3 {
        self.world_transform(index).w_axis.truncate()
    }

    /// Position relative to the model root transform
    pub fn model_position(&self, index: usize) -> Vec3 {
        self.root_inverse.transform_point3(self.world_position(index))
    }

    /// World transform with the bind pose removed, ready for skinning
    pub fn skinning_transform(&self, index: usize) -> Mat4 {
        self.bones.get(index).map_or(Mat4::IDENTITY, |b| {
            b.world * Mat4::from_translation(-b.origin)
        })
    }

    /// Skinning matrices for every bone, in bone order
    pub fn skinning_transforms(&self) -> impl Iterator<Item = Mat4> + '_ {
        (0..self.bones.len()).map(|i| self.skinning_transform(i))
    }
}

fn break_parent_cycles(bones: &mut [Bone], diagnostics: &dyn Diagnostics) {
    let count = bones.len();
    for start in 0..count {
        let mut current = bones[start].parent;
        let mut steps = 0;
        while let Some(index) = current {
            if index == start {
                diagnostics.report(&Anomaly::ParentCycle {
                    bone: bones[start].name.clone(),
                });
                bones[start].parent = None;
                break;
            }
            steps += 1;
            if steps > count {
                break;
            }
            current = bones[index].parent;
        }
    }
}

fn depth_first_order(bones: &[Bone]) -> (Vec<usize>, Vec<usize>, Vec<usize>) {
    let count = bones.len();
    let mut children = vec![Vec::new(); count];
    let mut stack = Vec::new();
    for (index, bone) in bones.iter().enumerate() {
        match bone.parent {
            Some(parent) => children[parent].push(index),
            None => stack.push(index),
        }
    }
    stack.reverse();

    let mut order = Vec::with_capacity(count);
    while let Some(index) = stack.pop() {
        order.push(index);
        stack.extend(children[index].iter().rev());
    }

    let mut order_pos = vec![0; count];
    for (pos, &index) in order.iter().enumerate() {
        order_pos[index] = pos;
    }

    let mut size = vec![1usize; count];
    for &index in order.iter().rev() {
        if let Some(parent) = bones[index].parent {
            size[parent] += size[index];
        }
    }
    let subtree_end = (0..count).map(|i| order_pos[i] + size[i]).collect();

    (order, order_pos, subtree_end)
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;
    use std::sync::Arc;

    use super::*;
    use crate::diagnostics::CollectingDiagnostics;
    use crate::skeleton::BoneKind;

    fn assert_vec_eq(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-4, "{a:?} != {b:?}");
    }

    fn arm() -> Vec<BoneDef> {
        vec![
            BoneDef::new("shoulder", -1, Vec3::new(0.0, 0.0, 0.0)),
            BoneDef::new("elbow", 0, Vec3::new(0.0, 1.0, 0.0)),
            BoneDef::new("wrist", 1, Vec3::new(0.0, 2.0, 0.0)),
        ]
    }

    #[test]
    fn test_empty_graph() {
        let graph = BoneGraph::new(&[]);
        assert!(graph.is_empty());
        assert_eq!(graph.world_transform(0), Mat4::IDENTITY);
    }

    #[test]
    fn test_bind_pose_matches_origin() {
        let graph = BoneGraph::new(&arm());
        assert_vec_eq(graph.world_position(2), Vec3::new(0.0, 2.0, 0.0));
        assert_vec_eq(graph.bone(2).unwrap().offset(), Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(graph.skinning_transform(2), Mat4::IDENTITY);
    }

    #[test]
    fn test_parent_rotation_propagates() {
        let mut graph = BoneGraph::new(&arm());
        graph.set_rotation(0, Quat::from_rotation_z(FRAC_PI_2));
        graph.update();
        // +Y rotated a quarter turn around Z points to -X
        assert_vec_eq(graph.world_position(1), Vec3::new(-1.0, 0.0, 0.0));
        assert_vec_eq(graph.world_position(2), Vec3::new(-2.0, 0.0, 0.0));
    }

    #[test]
    fn test_translation_chain() {
        let mut graph = BoneGraph::new(&arm());
        graph.set_position(0, Vec3::new(1.0, 0.0, 0.0));
        graph.set_position(2, Vec3::new(0.0, 0.0, 1.0));
        graph.update();
        assert_vec_eq(graph.world_position(2), Vec3::new(1.0, 2.0, 1.0));
    }

    #[test]
    fn test_simulated_bone_not_overwritten() {
        let mut graph = BoneGraph::new(&arm());
        let injected = Mat4::from_translation(Vec3::new(5.0, 5.0, 5.0));
        graph.set_simulated(1, true);
        graph.inject_world_transform(1, injected);
        graph.set_rotation(0, Quat::from_rotation_z(FRAC_PI_2));
        graph.update();
        assert_eq!(graph.world_transform(1), injected);
        // Children of a simulated bone follow the injected transform
        assert_vec_eq(graph.world_position(2), Vec3::new(5.0, 6.0, 5.0));
    }

    #[test]
    fn test_inject_ignored_for_kinematic_bone() {
        let mut graph = BoneGraph::new(&arm());
        graph.inject_world_transform(1, Mat4::from_translation(Vec3::X));
        assert_vec_eq(graph.world_position(1), Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_dangling_parent_becomes_root() {
        let sink = Arc::new(CollectingDiagnostics::new());
        let defs = vec![
            BoneDef::new("a", -1, Vec3::ZERO),
            BoneDef::new("b", 42, Vec3::new(0.0, 3.0, 0.0)),
        ];
        let graph = BoneGraph::with_config(&defs, &IkConfig::default(), sink.clone());
        assert_eq!(graph.bone(1).unwrap().parent(), None);
        assert_vec_eq(graph.world_position(1), Vec3::new(0.0, 3.0, 0.0));
        assert!(matches!(
            sink.anomalies()[0],
            Anomaly::DanglingBoneReference { index: 42, .. }
        ));
    }

    #[test]
    fn test_parent_cycle_broken() {
        let sink = Arc::new(CollectingDiagnostics::new());
        let defs = vec![
            BoneDef::new("a", 1, Vec3::ZERO),
            BoneDef::new("b", 0, Vec3::Y),
        ];
        let graph = BoneGraph::with_config(&defs, &IkConfig::default(), sink.clone());
        assert_eq!(graph.bone(0).unwrap().parent(), None);
        assert_eq!(graph.bone(1).unwrap().parent(), Some(0));
        assert_eq!(sink.anomalies().len(), 1);
    }

    #[test]
    fn test_subtree_ranges() {
        let defs = vec![
            BoneDef::new("root", -1, Vec3::ZERO),
            BoneDef::new("left", 0, Vec3::X),
            BoneDef::new("right", 0, Vec3::NEG_X),
            BoneDef::new("left_tip", 1, Vec3::X * 2.0),
        ];
        let graph = BoneGraph::new(&defs);
        assert!(graph.is_ancestor(0, 3));
        assert!(graph.is_ancestor(1, 3));
        assert!(!graph.is_ancestor(2, 3));
        assert!(!graph.is_ancestor(3, 3));
    }

    #[test]
    fn test_update_subtree_leaves_siblings() {
        let defs = vec![
            BoneDef::new("root", -1, Vec3::ZERO),
            BoneDef::new("left", 0, Vec3::X),
            BoneDef::new("right", 0, Vec3::NEG_X),
        ];
        let mut graph = BoneGraph::new(&defs);
        graph.set_position(1, Vec3::Y);
        graph.set_position(2, Vec3::Y);
        graph.update_subtree(1);
        assert_vec_eq(graph.world_position(1), Vec3::new(1.0, 1.0, 0.0));
        assert_vec_eq(graph.world_position(2), Vec3::new(-1.0, 0.0, 0.0));
    }

    #[test]
    fn test_under_rotate_copies_target() {
        let defs = vec![
            BoneDef::new("root", -1, Vec3::ZERO),
            BoneDef::new("source", 0, Vec3::X),
            BoneDef::new("follower", 0, Vec3::NEG_X)
                .with_kind(BoneKind::UnderRotate)
                .with_target(1),
            BoneDef::new("follower_tip", 2, Vec3::new(-1.0, 1.0, 0.0)),
        ];
        let mut graph = BoneGraph::new(&defs);
        graph.set_rotation(1, Quat::from_rotation_z(FRAC_PI_2));
        graph.update();
        assert_vec_eq(graph.world_position(3), Vec3::new(-1.0, 1.0, 0.0));

        graph.update_rotate();
        assert_vec_eq(graph.world_position(3), Vec3::new(-2.0, 0.0, 0.0));

        // The co-rotation never leaks into the local rotation
        assert_eq!(graph.bone(2).unwrap().rotation(), Quat::IDENTITY);
    }

    #[test]
    fn test_follow_rotate_uses_coefficient() {
        let defs = vec![
            BoneDef::new("source", -1, Vec3::ZERO),
            BoneDef::new("follower", -1, Vec3::ZERO)
                .with_kind(BoneKind::FollowRotate)
                .with_target(0)
                .with_rotate_coef(0.5),
        ];
        let mut graph = BoneGraph::new(&defs);
        graph.set_rotation(0, Quat::from_rotation_y(FRAC_PI_2));
        graph.update();
        graph.update_rotate();
        let (_, rotation, _) = graph.world_transform(1).to_scale_rotation_translation();
        assert!(rotation.angle_between(Quat::from_rotation_y(FRAC_PI_2 * 0.5)) < 1e-4);
    }

    #[test]
    fn test_motion_independent_ignores_parent_rotation() {
        let defs = vec![
            BoneDef::new("root", -1, Vec3::ZERO),
            BoneDef::new("free", 0, Vec3::Y).with_flags(BoneFlags::MOTION_INDEPENDENT),
            BoneDef::new("free_tip", 1, Vec3::new(0.0, 2.0, 0.0)),
        ];
        let mut graph = BoneGraph::new(&defs);
        graph.set_rotation(0, Quat::from_rotation_z(FRAC_PI_2));
        graph.set_position(0, Vec3::X);
        graph.update();
        assert_vec_eq(graph.world_position(1), Vec3::new(1.0, 1.0, 0.0));
        assert_vec_eq(graph.world_position(2), Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_root_transform_and_offset() {
        let mut graph = BoneGraph::new(&arm());
        graph.set_root_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, 10.0)));
        graph.set_root_offset(Vec3::new(2.0, 0.0, 0.0));
        graph.update();
        assert_vec_eq(graph.world_position(2), Vec3::new(2.0, 2.0, 10.0));
        assert_vec_eq(graph.model_position(2), Vec3::new(2.0, 2.0, 0.0));
    }

    #[test]
    fn test_knee_gets_limit_flag() {
        let defs = vec![
            BoneDef::new("左足", -1, Vec3::ZERO),
            BoneDef::new("左ひざ", 0, Vec3::NEG_Y),
        ];
        let graph = BoneGraph::new(&defs);
        assert!(!graph.bone(0).unwrap().is_limit_angle_x());
        assert!(graph.bone(1).unwrap().is_limit_angle_x());
        assert_eq!(graph.find("左ひざ"), Some(1));
    }

    #[test]
    fn test_invalid_limit_refused() {
        let defs = vec![
            BoneDef::new("左足", -1, Vec3::ZERO),
            BoneDef::new("左ひざ", 0, Vec3::NEG_Y),
        ];
        let mut graph = BoneGraph::new(&defs);
        let original = graph.bone(1).unwrap().limit_x();

        assert!(!graph.set_limit_x(1, AngleLimit::new(1.0, -1.0)));
        assert!(!graph.set_limit_x(1, AngleLimit::new(f32::NAN, 1.0)));
        assert_eq!(graph.bone(1).unwrap().limit_x(), original);

        assert!(graph.set_limit_x(1, AngleLimit::new(0.1, 2.0)));
        assert_eq!(graph.bone(1).unwrap().limit_x(), AngleLimit::new(0.1, 2.0));
        assert!(!graph.set_limit_x(7, AngleLimit::new(0.1, 2.0)));
    }

    #[test]
    fn test_invalid_config_limit_falls_back() {
        let ik = IkConfig {
            limit_x_lower: 1.0,
            limit_x_upper: -1.0,
            ..IkConfig::default()
        };
        let defs = vec![BoneDef::new("左ひざ", -1, Vec3::ZERO)];
        let graph = BoneGraph::with_config(&defs, &ik, log_diagnostics());
        assert!(graph.bone(0).unwrap().limit_x().is_valid());
    }

    #[test]
    fn test_reset_pose() {
        let mut graph = BoneGraph::new(&arm());
        graph.set_local_pose(1, Vec3::X, Quat::from_rotation_x(1.0));
        graph.update();
        graph.reset_pose();
        assert_vec_eq(graph.world_position(2), Vec3::new(0.0, 2.0, 0.0));
    }
}
