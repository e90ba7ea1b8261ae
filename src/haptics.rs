//! Haptic cues for phase boundaries.

use serde::Serialize;

use crate::actions::PhaseKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HapticPattern {
    BreathInWave,
    BreathOutWave,
    HoldTap,
    PauseTap,
    Success,
}

impl HapticPattern {
    /// Alternating vibrate/rest durations in milliseconds.
    pub fn timings(&self) -> &'static [u32] {
        match self {
            Self::BreathInWave => &[10, 50, 15, 45, 20, 40, 30],
            Self::BreathOutWave => &[30, 40, 20, 45, 15, 50, 10],
            Self::HoldTap => &[15],
            Self::PauseTap => &[8, 60, 8],
            Self::Success => &[15, 30, 15, 30, 50],
        }
    }

    pub fn duration_ms(&self) -> u32 {
        self.timings().iter().sum()
    }

    pub fn for_phase(kind: PhaseKind) -> Self {
        match kind {
            PhaseKind::Inhale => Self::BreathInWave,
            PhaseKind::Exhale => Self::BreathOutWave,
            PhaseKind::Hold => Self::HoldTap,
            PhaseKind::Pause => Self::PauseTap,
        }
    }
}

/// Device vibration. Implementations must return immediately; the caller
/// never waits for a pattern to finish.
pub trait HapticDriver: Send + Sync {
    fn play(&self, pattern: HapticPattern);
}

/// For hosts without a vibration motor.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHaptics;

impl HapticDriver for NoHaptics {
    fn play(&self, _pattern: HapticPattern) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_phase_kind_has_a_pattern() {
        for kind in [
            PhaseKind::Inhale,
            PhaseKind::Hold,
            PhaseKind::Exhale,
            PhaseKind::Pause,
        ] {
            let pattern = HapticPattern::for_phase(kind);
            assert!(pattern.duration_ms() > 0);
            // Short enough never to bleed into the next one-second tick.
            assert!(pattern.duration_ms() < 1_000);
        }
    }

    #[test]
    fn waves_mirror_each_other() {
        let mut inhale = HapticPattern::BreathInWave.timings().to_vec();
        inhale.reverse();
        assert_eq!(inhale, HapticPattern::BreathOutWave.timings());
    }
}
