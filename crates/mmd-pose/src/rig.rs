//! A posed character: skeleton, morphs, IK, motions and controllers

use std::sync::Arc;

use glam::{Mat4, Vec3};

use crate::animation::{MixerEvent, Motion, MotionHandle, MotionMixer, MotionOptions};
use crate::config::RigConfig;
use crate::controller::BoneController;
use crate::diagnostics::{Anomaly, SharedDiagnostics, log_diagnostics};
use crate::error::Result;
use crate::ik::{IkChainDef, IkSolver};
use crate::skeleton::{BoneDef, BoneGraph, MorphWeights};

/// Loader tables describing one model
#[derive(Debug, Clone, Default)]
pub struct ModelDef {
    pub bones: Vec<BoneDef>,
    pub ik_chains: Vec<IkChainDef>,
    pub morphs: Vec<String>,
}

/// Owns every pose component of one character and runs them in order
///
/// Per tick: motions are advanced and composited into the skeleton, world
/// transforms are propagated, IK chains are solved, co-rotating bones follow
/// their targets and finally look-at controllers apply their overrides.
pub struct Rig {
    bones: BoneGraph,
    morphs: MorphWeights,
    ik: IkSolver,
    mixer: MotionMixer,
    controllers: Vec<BoneController>,
    look_target: Vec3,
    config: RigConfig,
    diagnostics: SharedDiagnostics,
}

impl Rig {
    /// Build a rig logging anomalies through `log`
    pub fn new(model: &ModelDef, config: RigConfig) -> Result<Self> {
        Self::with_diagnostics(model, config, log_diagnostics())
    }

    pub fn with_diagnostics(
        model: &ModelDef,
        config: RigConfig,
        diagnostics: SharedDiagnostics,
    ) -> Result<Self> {
        config.validate()?;
        let bones = BoneGraph::with_config(&model.bones, &config.ik, diagnostics.clone());
        let ik = IkSolver::new(&model.ik_chains, &bones, config.ik);
        let morphs = MorphWeights::new(model.morphs.iter().cloned());
        log::debug!(
            "Rig built: {} bones, {} IK chains, {} morphs",
            bones.len(),
            ik.len(),
            morphs.len()
        );
        Ok(Self {
            bones,
            morphs,
            ik,
            mixer: MotionMixer::new(),
            controllers: Vec::new(),
            look_target: Vec3::ZERO,
            config,
            diagnostics,
        })
    }

    pub fn bones(&self) -> &BoneGraph {
        &self.bones
    }

    /// Direct access for hosts that drive bones themselves (physics)
    pub fn bones_mut(&mut self) -> &mut BoneGraph {
        &mut self.bones
    }

    pub fn morphs(&self) -> &MorphWeights {
        &self.morphs
    }

    pub fn ik(&self) -> &IkSolver {
        &self.ik
    }

    pub fn ik_mut(&mut self) -> &mut IkSolver {
        &mut self.ik
    }

    pub fn mixer(&self) -> &MotionMixer {
        &self.mixer
    }

    pub fn config(&self) -> &RigConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> &SharedDiagnostics {
        &self.diagnostics
    }

    pub fn set_root_transform(&mut self, transform: Mat4) {
        self.bones.set_root_transform(transform);
    }

    /// Start a motion under an alias
    ///
    /// With `enable_re_pos` the model origin is first moved under the center
    /// bone (XZ plane) so the new motion continues from where the body is.
    pub fn start_motion(
        &mut self,
        name: impl Into<String>,
        motion: Arc<Motion>,
        options: MotionOptions,
    ) -> Result<MotionHandle> {
        options.validate()?;
        if options.enable_re_pos {
            self.reposition_to_center();
        }
        self.mixer.start(
            name,
            motion,
            options,
            self.config.playback,
            &self.bones,
            &self.morphs,
        )
    }

    fn reposition_to_center(&mut self) {
        let Some(center) = self.bones.find(&self.config.center_bone_name) else {
            self.diagnostics.report(&Anomaly::MissingCenterBone {
                name: self.config.center_bone_name.clone(),
            });
            return;
        };
        let Some(bone) = self.bones.bone(center) else {
            return;
        };
        let origin = bone.origin();
        let position = bone.position();

        let offset = self.bones.root_offset();
        let drift = self.bones.model_position(center) - origin - offset;
        let drift = Vec3::new(drift.x, 0.0, drift.z);

        log::debug!("Re-positioning model origin by {drift}");
        self.bones.set_root_offset(offset + drift);
        self.bones.set_position(center, position - drift);
        self.bones.update();
    }

    pub fn find_motion(&self, name: &str) -> Option<MotionHandle> {
        self.mixer.find(name)
    }

    pub fn stop_motion(&mut self, handle: MotionHandle) -> bool {
        self.mixer.stop(handle)
    }

    pub fn remove_motion(&mut self, handle: MotionHandle) -> bool {
        self.mixer.remove(handle)
    }

    pub fn swap_motion(&mut self, handle: MotionHandle, motion: Arc<Motion>) -> bool {
        self.mixer
            .swap_motion(handle, motion, &self.bones, &self.morphs)
    }

    pub fn set_motion_priority(&mut self, handle: MotionHandle, priority: i32) -> bool {
        self.mixer.set_priority(handle, priority)
    }

    pub fn set_motion_speed(&mut self, handle: MotionHandle, speed: f32) -> Result<bool> {
        match self.mixer.get_mut(handle) {
            Some(player) => player.set_speed(speed).map(|()| true),
            None => Ok(false),
        }
    }

    /// Attach a controller, binding it to the current skeleton
    pub fn add_controller(&mut self, mut controller: BoneController) -> usize {
        controller.bind(&self.bones);
        self.controllers.push(controller);
        self.controllers.len() - 1
    }

    pub fn controllers(&self) -> &[BoneController] {
        &self.controllers
    }

    pub fn controller_mut(&mut self, index: usize) -> Option<&mut BoneController> {
        self.controllers.get_mut(index)
    }

    /// World-space point look-at controllers turn toward
    pub fn set_look_target(&mut self, target: Vec3) {
        self.look_target = target;
    }

    pub fn look_target(&self) -> Vec3 {
        self.look_target
    }

    /// Replace the model, rebinding motions and controllers by name
    pub fn swap_model(&mut self, model: &ModelDef) {
        let root = self.bones.root_transform();
        self.bones =
            BoneGraph::with_config(&model.bones, &self.config.ik, self.diagnostics.clone());
        self.bones.set_root_transform(root);
        self.ik = IkSolver::new(&model.ik_chains, &self.bones, self.config.ik);
        self.morphs = MorphWeights::new(model.morphs.iter().cloned());
        self.mixer.rebind(&self.bones, &self.morphs);
        for controller in &mut self.controllers {
            controller.bind(&self.bones);
        }
        self.bones.update();
    }

    /// Return skeleton and morphs to the bind pose without touching motions
    pub fn reset_pose(&mut self) {
        self.bones.set_root_offset(Vec3::ZERO);
        self.bones.reset_pose();
        self.morphs.reset();
    }

    /// Advance everything by `delta` frames
    pub fn tick(&mut self, delta: f32) -> Vec<MixerEvent> {
        let events = self.mixer.advance(delta);
        self.mixer.apply(&mut self.bones, &mut self.morphs);
        self.bones.update();
        self.ik.solve_all(&mut self.bones);
        self.bones.update_rotate();
        for controller in &mut self.controllers {
            controller.update(&mut self.bones, self.look_target, delta);
        }
        events
    }
}
