//! Playback state of a motion player

/// Lifecycle of a [`super::MotionPlayer`]
///
/// `Running -> Looped -> Running` on every wrap, `Running -> FadingOut ->
/// Deleted` when a FadeOut motion ends or is stopped, and any state goes
/// straight to `Deleted` on explicit removal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PlayerState {
    #[default]
    Running,
    /// Wrapped to the loop point during the last advance
    Looped,
    /// Blending toward the rest pose before removal
    FadingOut,
    Deleted,
}

impl PlayerState {
    /// Whether the player still produces samples
    pub fn is_active(self) -> bool {
        self != Self::Deleted
    }
}

/// What a player does when it reaches the last frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub enum OnEnd {
    /// Stay on the last frame until removed
    #[default]
    Hold,
    /// Wrap to the loop-at frame
    Loop,
    /// Blend to rest, then delete itself
    FadeOut,
}

/// Transition reported by [`super::MotionPlayer::advance`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    Looped,
    Deleted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_state_default() {
        let state = PlayerState::default();
        assert_eq!(state, PlayerState::Running);
        assert!(state.is_active());
        assert!(!PlayerState::Deleted.is_active());
    }

    #[test]
    fn test_on_end_default_holds() {
        assert_eq!(OnEnd::default(), OnEnd::Hold);
    }
}
