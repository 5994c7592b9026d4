//! Cyclic coordinate descent inverse kinematics
//!
//! Each chain rotates its bones, leaf first, so that the chain's target bone
//! reaches the world position of its destination bone. The solver runs after
//! motion sampling and before the co-rotation pass.

use glam::{EulerRot, Quat};

use crate::config::IkConfig;
use crate::diagnostics::{Anomaly, Diagnostics};
use crate::skeleton::BoneGraph;

/// One row of the loader's IK table
///
/// Indices are signed; `-1` or anything out of range means "none".
#[derive(Debug, Clone, PartialEq)]
pub struct IkChainDef {
    /// Bone whose position the target should reach
    pub destination: i32,
    /// End effector moved by the chain
    pub target: i32,
    /// Bones rotated by the solver, leaf first
    pub chain: Vec<i32>,
    /// Maximum solver rounds per tick
    pub iterations: u16,
    /// Largest rotation applied to a bone in one step, radians
    pub angle_constraint: f32,
}

/// Resolved chain
#[derive(Debug, Clone, PartialEq)]
pub struct IkChain {
    destination: usize,
    target: usize,
    chain: Vec<usize>,
    iterations: u16,
    angle_constraint: f32,
    enabled: bool,
}

impl IkChain {
    pub fn destination(&self) -> usize {
        self.destination
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn bones(&self) -> &[usize] {
        &self.chain
    }

    pub fn iterations(&self) -> u16 {
        self.iterations
    }

    pub fn angle_constraint(&self) -> f32 {
        self.angle_constraint
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Outcome of solving one chain for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IkReport {
    /// Rounds completed before stopping
    pub iterations: u16,
    /// Target got within tolerance of the destination
    pub converged: bool,
    /// Chain was not touched at all
    pub skipped: bool,
}

impl IkReport {
    const SKIPPED: Self = Self {
        iterations: 0,
        converged: false,
        skipped: true,
    };
}

/// CCD solver over every IK chain of a model
#[derive(Debug, Clone, Default)]
pub struct IkSolver {
    /// `None` for chains that failed to resolve
    chains: Vec<Option<IkChain>>,
    config: IkConfig,
}

impl IkSolver {
    /// Resolve the loader's IK table against a bone graph
    ///
    /// Chains referencing missing bones, or listing bones that are not
    /// ancestors of the target, are kept as inert entries and reported.
    pub fn new(defs: &[IkChainDef], bones: &BoneGraph, config: IkConfig) -> Self {
        let diagnostics = bones.diagnostics();
        let chains = defs
            .iter()
            .enumerate()
            .map(|(index, def)| resolve_chain(index, def, bones, diagnostics.as_ref()))
            .collect();
        Self { chains, config }
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    pub fn config(&self) -> &IkConfig {
        &self.config
    }

    /// Resolved chain at `index`, None if it is inert
    pub fn chain(&self, index: usize) -> Option<&IkChain> {
        self.chains.get(index).and_then(Option::as_ref)
    }

    /// Switch a chain on or off; returns false for inert or unknown chains
    pub fn set_chain_enabled(&mut self, index: usize, enabled: bool) -> bool {
        match self.chains.get_mut(index).and_then(Option::as_mut) {
            Some(chain) => {
                chain.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Solve every chain in table order
    pub fn solve_all(&self, bones: &mut BoneGraph) {
        for index in 0..self.chains.len() {
            let report = self.solve(index, bones);
            if !report.skipped && !report.converged {
                log::trace!(
                    "IK chain {} stopped after {} rounds without converging",
                    index,
                    report.iterations
                );
            }
        }
    }

    /// Solve one chain against the current world transforms
    pub fn solve(&self, index: usize, bones: &mut BoneGraph) -> IkReport {
        let Some(chain) = self.chain(index) else {
            return IkReport::SKIPPED;
        };
        if !chain.enabled {
            return IkReport::SKIPPED;
        }
        let simulated = |bone: usize| bones.bone(bone).is_some_and(|b| b.is_simulated());
        if simulated(chain.target) || chain.chain.first().is_some_and(|&b| simulated(b)) {
            return IkReport::SKIPPED;
        }

        let Some(original) = bones.bone(chain.target).map(|b| b.rotation()) else {
            return IkReport::SKIPPED;
        };
        let destination = bones.world_position(chain.destination);
        let mut report = IkReport::default();

        'rounds: for iteration in 0..chain.iterations {
            for &link in &chain.chain {
                let inverse = bones.world_transform(link).inverse();
                let local_destination = inverse.transform_point3(destination);
                let local_target = inverse.transform_point3(bones.world_position(chain.target));

                if local_destination.distance_squared(local_target) < self.config.min_distance_sq {
                    report.converged = true;
                    break 'rounds;
                }

                let destination_dir = local_destination.normalize_or_zero();
                let target_dir = local_target.normalize_or_zero();
                let angle = destination_dir.dot(target_dir).clamp(-1.0, 1.0).acos();
                if angle < self.config.min_angle {
                    continue;
                }
                let angle = angle.min(chain.angle_constraint);

                let axis = target_dir.cross(destination_dir);
                if iteration > 0 && axis.length_squared() < self.config.min_axis_sq {
                    continue;
                }

                let Some(bone) = bones.bone(link) else {
                    continue;
                };
                let current = bone.rotation();
                let delta = if bone.is_limit_angle_x() {
                    let limit = bone.limit_x();
                    let (_, _, current_x) = current.to_euler(EulerRot::ZYX);
                    let step = if iteration == 0 {
                        angle * limit.preferred_sign()
                    } else {
                        let Some(axis) = axis.try_normalize() else {
                            continue;
                        };
                        let (_, _, x) = Quat::from_axis_angle(axis, angle).to_euler(EulerRot::ZYX);
                        x.clamp(-chain.angle_constraint, chain.angle_constraint)
                    };
                    // Keep the accumulated angle inside the limit
                    let step = step.clamp(limit.lower - current_x, limit.upper - current_x);
                    Quat::from_rotation_x(step)
                } else {
                    let Some(axis) = axis.try_normalize() else {
                        continue;
                    };
                    Quat::from_axis_angle(axis, angle)
                };

                bones.set_rotation(link, (current * delta).normalize());
                bones.update_subtree(link);
            }
            report.iterations = iteration + 1;
        }

        bones.set_rotation(chain.target, original);
        bones.update_subtree(chain.target);
        report
    }
}

fn resolve_chain(
    index: usize,
    def: &IkChainDef,
    bones: &BoneGraph,
    diagnostics: &dyn Diagnostics,
) -> Option<IkChain> {
    let inert = |raw: i32| {
        diagnostics.report(&Anomaly::InertIkChain { chain: index, index: raw });
        None
    };
    let resolve = |raw: i32| usize::try_from(raw).ok().filter(|&i| i < bones.len());

    let Some(destination) = resolve(def.destination) else {
        return inert(def.destination);
    };
    let Some(target) = resolve(def.target) else {
        return inert(def.target);
    };
    if def.chain.is_empty() {
        return inert(-1);
    }
    if !def.angle_constraint.is_finite() || def.angle_constraint < 0.0 {
        diagnostics.report(&Anomaly::InvalidIkConstraint {
            chain: index,
            angle: def.angle_constraint,
        });
        return None;
    }

    let mut chain = Vec::with_capacity(def.chain.len());
    for &raw in &def.chain {
        match resolve(raw) {
            Some(bone) if bones.is_ancestor(bone, target) => chain.push(bone),
            _ => return inert(raw),
        }
    }

    Some(IkChain {
        destination,
        target,
        chain,
        iterations: def.iterations,
        angle_constraint: def.angle_constraint,
        enabled: true,
    })
}
