use serde::{Deserialize, Serialize};

use super::sample::DetectionSample;

/// Why a frame does not qualify. Declared in priority order: when several
/// conditions hold at once the earliest variant wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NoFace,
    MultipleFaces,
    TooSmall,
    NotCentered,
    OutsideGuide,
    EyesCovered,
    MouthCovered,
    LowConfidence,
    None,
}

impl Default for FailureReason {
    fn default() -> Self {
        FailureReason::NoFace
    }
}

impl FailureReason {
    pub const PRIORITY: [FailureReason; 9] = [
        FailureReason::NoFace,
        FailureReason::MultipleFaces,
        FailureReason::TooSmall,
        FailureReason::NotCentered,
        FailureReason::OutsideGuide,
        FailureReason::EyesCovered,
        FailureReason::MouthCovered,
        FailureReason::LowConfidence,
        FailureReason::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::NoFace => "no_face",
            FailureReason::MultipleFaces => "multiple_faces",
            FailureReason::TooSmall => "too_small",
            FailureReason::NotCentered => "not_centered",
            FailureReason::OutsideGuide => "outside_guide",
            FailureReason::EyesCovered => "eyes_covered",
            FailureReason::MouthCovered => "mouth_covered",
            FailureReason::LowConfidence => "low_confidence",
            FailureReason::None => "none",
        }
    }

    /// Urgent reasons skip hint debouncing entirely.
    pub fn is_urgent(&self) -> bool {
        matches!(self, FailureReason::NoFace | FailureReason::MultipleFaces)
    }

    pub fn is_clear(&self) -> bool {
        *self == FailureReason::None
    }

    pub fn hint_text(&self) -> &'static str {
        match self {
            FailureReason::NoFace => "Look at the camera",
            FailureReason::MultipleFaces => "Only one person in the frame, please",
            FailureReason::TooSmall => "Move a little closer",
            FailureReason::NotCentered => "Center your face in the frame",
            FailureReason::OutsideGuide => "Keep your whole face inside the guide",
            FailureReason::EyesCovered => "Make sure your eyes are visible",
            FailureReason::MouthCovered => "Make sure your mouth is visible",
            FailureReason::LowConfidence => "Hold still in good light",
            FailureReason::None => "Perfect, hold still",
        }
    }
}

/// Tunable limits for frame qualification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessThresholds {
    /// Consecutive qualifying frames before the gate opens.
    pub stable_frames_required: u32,
    /// Smallest acceptable face size relative to the frame.
    pub min_face_size: f64,
    /// Largest allowed distance of the box centre from the frame centre, per axis.
    pub max_center_offset: f64,
    /// Inset of the on-screen guide from each frame edge.
    pub guide_margin: f64,
    pub min_confidence: f64,
}

impl Default for ReadinessThresholds {
    fn default() -> Self {
        Self {
            stable_frames_required: 12,
            min_face_size: 0.20,
            max_center_offset: 0.15,
            guide_margin: 0.05,
            min_confidence: 0.60,
        }
    }
}

impl ReadinessThresholds {
    /// Never below one: the gate only opens on qualifying frames.
    pub fn stable_frames_required(&self) -> u32 {
        self.stable_frames_required.max(1)
    }
}

/// Reduce a frame to its single highest-priority failure reason.
///
/// A missing or malformed sample is indistinguishable from an empty frame.
pub fn classify(
    sample: Option<&DetectionSample>,
    limits: &ReadinessThresholds,
) -> FailureReason {
    let Some(sample) = sample.filter(|sample| sample.is_well_formed()) else {
        return FailureReason::NoFace;
    };

    if sample.face_count == 0 {
        return FailureReason::NoFace;
    }
    if sample.face_count > 1 {
        return FailureReason::MultipleFaces;
    }
    let Some(bbox) = sample.normalized_box else {
        return FailureReason::NoFace;
    };

    if sample.normalized_size < limits.min_face_size {
        return FailureReason::TooSmall;
    }

    let (center_x, center_y) = bbox.center();
    if (center_x - 0.5).abs() > limits.max_center_offset
        || (center_y - 0.5).abs() > limits.max_center_offset
    {
        return FailureReason::NotCentered;
    }

    let low = limits.guide_margin;
    let high = 1.0 - limits.guide_margin;
    if bbox.x < low || bbox.y < low || bbox.right() > high || bbox.bottom() > high {
        return FailureReason::OutsideGuide;
    }

    if sample.eyes_covered {
        return FailureReason::EyesCovered;
    }
    if sample.mouth_covered {
        return FailureReason::MouthCovered;
    }
    if sample.confidence < limits.min_confidence {
        return FailureReason::LowConfidence;
    }

    FailureReason::None
}
