use std::collections::HashMap;

use super::track::{BoneTrack, MorphTrack};
use crate::error::{PoseError, Result};

/// A loaded motion clip: named bone and morph tracks
///
/// Immutable once built; share it between players with `Arc<Motion>`.
#[derive(Debug, Clone)]
pub struct Motion {
    name: String,
    bone_tracks: Vec<BoneTrack>,
    morph_tracks: Vec<MorphTrack>,
    bone_lookup: HashMap<String, usize>,
    morph_lookup: HashMap<String, usize>,
    max_frame: f32,
}

impl Motion {
    pub fn new(
        name: impl Into<String>,
        bone_tracks: Vec<BoneTrack>,
        morph_tracks: Vec<MorphTrack>,
    ) -> Result<Self> {
        let name = name.into();
        let bone_lookup = index_names(&name, "bone", bone_tracks.iter().map(BoneTrack::name))?;
        let morph_lookup =
            index_names(&name, "morph", morph_tracks.iter().map(MorphTrack::name))?;

        let max_frame = bone_tracks
            .iter()
            .map(BoneTrack::last_frame)
            .chain(morph_tracks.iter().map(MorphTrack::last_frame))
            .fold(0.0, f32::max);

        log::debug!(
            "Motion '{}': {} bone tracks, {} morph tracks, {} frames",
            name,
            bone_tracks.len(),
            morph_tracks.len(),
            max_frame
        );

        Ok(Self {
            name,
            bone_tracks,
            morph_tracks,
            bone_lookup,
            morph_lookup,
            max_frame,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last keyframe frame across every track
    pub fn max_frame(&self) -> f32 {
        self.max_frame
    }

    pub fn bone_tracks(&self) -> &[BoneTrack] {
        &self.bone_tracks
    }

    pub fn morph_tracks(&self) -> &[MorphTrack] {
        &self.morph_tracks
    }

    pub fn bone_track(&self, name: &str) -> Option<&BoneTrack> {
        self.bone_lookup.get(name).map(|&i| &self.bone_tracks[i])
    }

    pub fn morph_track(&self, name: &str) -> Option<&MorphTrack> {
        self.morph_lookup.get(name).map(|&i| &self.morph_tracks[i])
    }
}

fn index_names<'a>(
    motion: &str,
    kind: &'static str,
    names: impl Iterator<Item = &'a str>,
) -> Result<HashMap<String, usize>> {
    let mut lookup = HashMap::new();
    for (index, name) in names.enumerate() {
        if lookup.insert(name.to_string(), index).is_some() {
            return Err(PoseError::DuplicateTrack {
                motion: motion.to_string(),
                name: name.to_string(),
                kind,
            });
        }
    }
    Ok(lookup)
}
