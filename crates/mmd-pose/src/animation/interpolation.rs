//! Keyframe search and Bezier easing for motion tracks

use std::sync::OnceLock;

/// Number of intervals in an expanded easing table
///
/// Tables hold one more sample than this so the last interval has both ends.
pub const INTERPOLATION_TABLE_SIZE: usize = 64;

const BISECTION_STEPS: usize = 32;

/// Find the index of the keyframe at or before the given frame
///
/// Returns None if there are no keyframes. For interpolation this is the
/// earlier keyframe of the bracketing pair (`[index]` and `[index + 1]`).
/// `hint` is tried first so sequential playback stays O(1).
pub fn find_keyframe_index(frames: &[f32], frame: f32, hint: Option<usize>) -> Option<usize> {
    if frames.is_empty() {
        return None;
    }

    let last_index = frames.len() - 1;
    if last_index == 0 || frame >= frames[last_index] {
        return Some(last_index);
    }
    if frame <= frames[0] {
        return Some(0);
    }

    if let Some(hint) = hint
        && hint < last_index
    {
        if frames[hint] <= frame && frame < frames[hint + 1] {
            return Some(hint);
        }
        if hint + 1 < last_index && frames[hint + 1] <= frame && frame < frames[hint + 2] {
            return Some(hint + 1);
        }
    }

    // Largest index where frames[index] <= frame
    let mut low = 0;
    let mut high = last_index;

    while low < high {
        let mid = (low + high).div_ceil(2);
        if frames[mid] <= frame {
            low = mid;
        } else {
            high = mid - 1;
        }
    }

    Some(low)
}

/// Cubic Bezier easing curve from (0, 0) to (1, 1)
///
/// The two inner control points are normalized to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct BezierCurve {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BezierCurve {
    /// Default curve written by motion editors, a straight line
    pub const LINEAR: Self = Self {
        x1: 20.0 / 127.0,
        y1: 20.0 / 127.0,
        x2: 107.0 / 127.0,
        y2: 107.0 / 127.0,
    };

    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x1: x1.clamp(0.0, 1.0),
            y1: y1.clamp(0.0, 1.0),
            x2: x2.clamp(0.0, 1.0),
            y2: y2.clamp(0.0, 1.0),
        }
    }

    /// Control points as stored by motion files, each in `0..=127`
    pub fn from_bytes(x1: u8, y1: u8, x2: u8, y2: u8) -> Self {
        let scale = |v: u8| f32::from(v.min(127)) / 127.0;
        Self::new(scale(x1), scale(y1), scale(x2), scale(y2))
    }

    /// Collinear control points make the curve the identity mapping
    pub fn is_linear(&self) -> bool {
        self.x1 == self.y1 && self.x2 == self.y2
    }

    fn component(p1: f32, p2: f32, s: f32) -> f32 {
        let inv = 1.0 - s;
        3.0 * inv * inv * s * p1 + 3.0 * inv * s * s * p2 + s * s * s
    }

    /// Continuous evaluation: y for the given x
    ///
    /// x(s) is monotonic for control points inside the unit square, so the
    /// curve parameter is found by bisection.
    pub fn evaluate(&self, x: f32) -> f32 {
        if x <= 0.0 {
            return 0.0;
        }
        if x >= 1.0 {
            return 1.0;
        }
        let mut low = 0.0f32;
        let mut high = 1.0f32;
        let mut s = x;
        for _ in 0..BISECTION_STEPS {
            s = 0.5 * (low + high);
            if Self::component(self.x1, self.x2, s) < x {
                low = s;
            } else {
                high = s;
            }
        }
        Self::component(self.y1, self.y2, s)
    }

    fn expand(&self) -> Box<[f32]> {
        (0..=INTERPOLATION_TABLE_SIZE)
            .map(|i| self.evaluate(i as f32 / INTERPOLATION_TABLE_SIZE as f32))
            .collect()
    }
}

impl Default for BezierCurve {
    fn default() -> Self {
        Self::LINEAR
    }
}

/// Easing curve of one keyframe channel with a lazily expanded table
#[derive(Debug, Clone, Default)]
pub struct InterpolationCurve {
    control: BezierCurve,
    table: OnceLock<Box<[f32]>>,
}

impl InterpolationCurve {
    pub fn new(control: BezierCurve) -> Self {
        Self {
            control,
            table: OnceLock::new(),
        }
    }

    pub fn linear() -> Self {
        Self::new(BezierCurve::LINEAR)
    }

    pub fn control(&self) -> BezierCurve {
        self.control
    }

    pub fn is_linear(&self) -> bool {
        self.control.is_linear()
    }

    /// Whether the lookup table has been built yet
    pub fn is_expanded(&self) -> bool {
        self.table.get().is_some()
    }

    /// Map the normalized interval position through the curve
    pub fn ease(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        if self.is_linear() {
            return t;
        }
        let table = self.table.get_or_init(|| self.control.expand());

        let scaled = t * INTERPOLATION_TABLE_SIZE as f32;
        let index = (scaled as usize).min(INTERPOLATION_TABLE_SIZE - 1);
        let frac = scaled - index as f32;
        table[index] + (table[index + 1] - table[index]) * frac
    }
}

impl PartialEq for InterpolationCurve {
    fn eq(&self, other: &Self) -> bool {
        self.control == other.control
    }
}
