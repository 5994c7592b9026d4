//! Injected diagnostics sink
//!
//! Components never log through global state directly. They receive an
//! `Arc<dyn Diagnostics>` and report [`Anomaly`] values to it; the default
//! [`LogDiagnostics`] forwards them to the `log` facade.

use std::sync::{Arc, Mutex};

use thiserror::Error;

/// A non-fatal irregularity found while building or running a rig
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Anomaly {
    /// A bone references a parent, child or target index that does not exist
    #[error("bone '{bone}' has dangling {field} index {index}")]
    DanglingBoneReference {
        bone: String,
        field: &'static str,
        index: i32,
    },

    /// Parent links form a cycle; the bone was detached to the top level
    #[error("bone '{bone}' is part of a parent cycle, detached to top level")]
    ParentCycle { bone: String },

    /// Two bones share one name; lookups resolve to the first
    #[error("duplicate bone name '{name}'")]
    DuplicateBoneName { name: String },

    /// An IK chain references a missing bone and will never be solved
    #[error("IK chain {chain} references missing bone index {index}, chain disabled")]
    InertIkChain { chain: usize, index: i32 },

    /// An IK chain's per-step angle constraint is negative or not finite
    #[error("IK chain {chain} has invalid angle constraint {angle}, chain disabled")]
    InvalidIkConstraint { chain: usize, angle: f32 },

    /// A motion track names a bone or morph that the model does not have
    #[error("motion '{motion}' track '{name}' has no matching {kind} in the model")]
    UnboundTrack {
        motion: String,
        name: String,
        kind: &'static str,
    },

    /// A player has no usable tracks after binding and static filtering
    #[error("motion '{motion}' contributes nothing to this model")]
    EmptyPlayer { motion: String },

    /// A procedural controller names a bone the model does not have
    #[error("controller '{controller}' bone '{bone}' not found")]
    UnboundControllerBone { controller: String, bone: String },

    /// Re-positioning was requested but the model has no center bone
    #[error("center bone '{name}' not found, motion start re-position skipped")]
    MissingCenterBone { name: String },
}

impl Anomaly {
    /// Log target used when forwarding to the `log` facade
    pub fn target(&self) -> &'static str {
        match self {
            Self::DanglingBoneReference { .. }
            | Self::ParentCycle { .. }
            | Self::DuplicateBoneName { .. } => "mmd_pose::skeleton",
            Self::InertIkChain { .. } | Self::InvalidIkConstraint { .. } => "mmd_pose::ik",
            Self::UnboundTrack { .. } | Self::EmptyPlayer { .. } => "mmd_pose::animation",
            Self::UnboundControllerBone { .. } => "mmd_pose::controller",
            Self::MissingCenterBone { .. } => "mmd_pose::rig",
        }
    }

    /// Whether the anomaly means part of the rig will not animate as authored
    pub fn is_degrading(&self) -> bool {
        !matches!(self, Self::UnboundTrack { .. } | Self::DuplicateBoneName { .. })
    }
}

/// Receiver for anomalies raised by the pose core
pub trait Diagnostics: Send + Sync {
    fn report(&self, anomaly: &Anomaly);
}

/// Forwards anomalies to the `log` crate
///
/// Degrading anomalies are logged at `warn`, the rest at `debug`. Partial
/// motions routinely miss bones, so unbound tracks stay quiet by default.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn report(&self, anomaly: &Anomaly) {
        if anomaly.is_degrading() {
            log::warn!(target: anomaly.target(), "{anomaly}");
        } else {
            log::debug!(target: anomaly.target(), "{anomaly}");
        }
    }
}

/// Keeps every reported anomaly in memory
#[derive(Debug, Default)]
pub struct CollectingDiagnostics {
    anomalies: Mutex<Vec<Anomaly>>,
}

impl CollectingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far
    pub fn anomalies(&self) -> Vec<Anomaly> {
        self.anomalies
            .lock()
            .map(|list| list.clone())
            .unwrap_or_default()
    }
}

impl Diagnostics for CollectingDiagnostics {
    fn report(&self, anomaly: &Anomaly) {
        if let Ok(mut list) = self.anomalies.lock() {
            list.push(anomaly.clone());
        }
    }
}

/// Shared diagnostics handle threaded through the components
pub type SharedDiagnostics = Arc<dyn Diagnostics>;

/// The default sink
pub fn log_diagnostics() -> SharedDiagnostics {
    Arc::new(LogDiagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_diagnostics() {
        let sink = CollectingDiagnostics::new();
        sink.report(&Anomaly::ParentCycle {
            bone: "arm".to_string(),
        });
        assert_eq!(sink.anomalies().len(), 1);
    }

    #[test]
    fn test_anomaly_display() {
        let anomaly = Anomaly::InertIkChain { chain: 2, index: 99 };
        assert!(anomaly.to_string().contains("missing bone index 99"));
        assert_eq!(anomaly.target(), "mmd_pose::ik");
        assert!(anomaly.is_degrading());
    }
}
