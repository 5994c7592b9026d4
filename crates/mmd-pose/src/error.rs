use thiserror::Error;

/// Error types for building skeletons, tracks and motions
///
/// Only construction is fallible. Once a [`crate::Rig`] is running, anomalies
/// are reported through [`crate::Diagnostics`] and degrade to no-ops.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoseError {
    /// Two keyframes of one track share the same frame number
    #[error("Duplicate keyframe at frame {frame} in track '{track}'")]
    DuplicateKeyframe { track: String, frame: f32 },

    /// Keyframe carries NaN or infinite data
    #[error("Non-finite keyframe data at frame {frame} in track '{track}'")]
    NonFiniteKeyframe { track: String, frame: f32 },

    /// Two tracks of one motion drive the same bone or morph
    #[error("Duplicate {kind} track '{name}' in motion '{motion}'")]
    DuplicateTrack {
        motion: String,
        name: String,
        kind: &'static str,
    },

    /// Raw bone kind value outside the known table
    #[error("Invalid bone kind value: {0}")]
    InvalidBoneKind(u8),

    /// Playback options that cannot be honored
    #[error("Invalid motion options: {0}")]
    InvalidOptions(String),
}

/// Result type using PoseError
pub type Result<T> = std::result::Result<T, PoseError>;
