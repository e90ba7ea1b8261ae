use serde::{Deserialize, Serialize};

/// Face bounding box in frame-normalised coordinates (origin top-left, 0..1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A box of the given size centred in the frame.
    pub fn centered(size: f64) -> Self {
        let offset = (1.0 - size) / 2.0;
        Self::new(offset, offset, size, size)
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn is_well_formed(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|value| value.is_finite())
            && self.width > 0.0
            && self.height > 0.0
            && self.intersects_frame()
    }

    /// A box lying wholly outside the unit square is detector garbage, not a
    /// badly placed face.
    fn intersects_frame(&self) -> bool {
        self.x < 1.0 && self.y < 1.0 && self.right() > 0.0 && self.bottom() > 0.0
    }
}

/// One frame of detector output. Produced by the external face detector and
/// consumed exactly once by the readiness gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionSample {
    pub face_count: u32,
    pub confidence: f64,
    pub normalized_box: Option<NormalizedBox>,
    pub normalized_size: f64,
    pub brightness: f64,
    pub eyes_covered: bool,
    pub mouth_covered: bool,
    /// Milliseconds on the detector's monotonic clock.
    pub timestamp_ms: u64,
}

impl DetectionSample {
    /// A single, well-placed, confident face. Handy as a baseline that callers
    /// tweak one field at a time.
    pub fn centered_face(timestamp_ms: u64) -> Self {
        Self {
            face_count: 1,
            confidence: 0.95,
            normalized_box: Some(NormalizedBox::centered(0.4)),
            normalized_size: 0.4,
            brightness: 0.6,
            eyes_covered: false,
            mouth_covered: false,
            timestamp_ms,
        }
    }

    pub fn empty(timestamp_ms: u64) -> Self {
        Self {
            face_count: 0,
            confidence: 0.0,
            normalized_box: None,
            normalized_size: 0.0,
            brightness: 0.0,
            eyes_covered: false,
            mouth_covered: false,
            timestamp_ms,
        }
    }

    /// Non-finite numbers or a degenerate box make the sample unusable.
    pub fn is_well_formed(&self) -> bool {
        self.confidence.is_finite()
            && self.normalized_size.is_finite()
            && self.brightness.is_finite()
            && self
                .normalized_box
                .map(|bbox| bbox.is_well_formed())
                .unwrap_or(true)
    }
}
