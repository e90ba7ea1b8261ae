//! Debounced hint surfacing.
//!
//! A candidate hint must be observed continuously for [`HINT_PENDING_MS`]
//! before it is shown, and a shown hint stays up for at least
//! [`HINT_MIN_DISPLAY_MS`]. Urgent reasons replace whatever is showing at once.
//! Time comes from sample timestamps; the debouncer owns no timers.

use serde::Serialize;

use super::classify::FailureReason;

pub const HINT_PENDING_MS: u64 = 300;
pub const HINT_MIN_DISPLAY_MS: u64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "phase")]
pub enum DebounceState {
    /// `hint` is on screen. `since_ms` is `None` until something is surfaced.
    Shown {
        hint: FailureReason,
        since_ms: Option<u64>,
    },
    /// `hint` is still on screen while `candidate` waits out its delay.
    Pending {
        hint: FailureReason,
        since_ms: Option<u64>,
        candidate: FailureReason,
        candidate_since_ms: u64,
    },
}

#[derive(Debug, Clone)]
pub struct HintDebouncer {
    state: DebounceState,
    pending_ms: u64,
    min_display_ms: u64,
}

impl Default for HintDebouncer {
    fn default() -> Self {
        Self::new()
    }
}

impl HintDebouncer {
    pub fn new() -> Self {
        Self::with_windows(HINT_PENDING_MS, HINT_MIN_DISPLAY_MS)
    }

    pub fn with_windows(pending_ms: u64, min_display_ms: u64) -> Self {
        Self {
            state: DebounceState::Shown {
                hint: FailureReason::None,
                since_ms: None,
            },
            pending_ms,
            min_display_ms,
        }
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    /// The hint currently on screen, `None` when nothing needs correcting.
    pub fn surfaced(&self) -> Option<FailureReason> {
        let hint = match self.state {
            DebounceState::Shown { hint, .. } | DebounceState::Pending { hint, .. } => hint,
        };
        (!hint.is_clear()).then_some(hint)
    }

    /// Feed the latest classified reason and return what should be displayed.
    pub fn observe(&mut self, candidate: FailureReason, now_ms: u64) -> Option<FailureReason> {
        if candidate.is_urgent() {
            self.state = DebounceState::Shown {
                hint: candidate,
                since_ms: Some(now_ms),
            };
            return self.surfaced();
        }

        self.state = match self.state {
            DebounceState::Shown { hint, since_ms } if hint == candidate => {
                DebounceState::Shown { hint, since_ms }
            }
            DebounceState::Shown { hint, since_ms } => DebounceState::Pending {
                hint,
                since_ms,
                candidate,
                candidate_since_ms: now_ms,
            },
            // The displayed hint is valid again; drop the pending one.
            DebounceState::Pending { hint, since_ms, .. } if hint == candidate => {
                DebounceState::Shown { hint, since_ms }
            }
            DebounceState::Pending {
                hint,
                since_ms,
                candidate: pending,
                candidate_since_ms,
            } => DebounceState::Pending {
                hint,
                since_ms,
                candidate,
                candidate_since_ms: if pending == candidate {
                    candidate_since_ms
                } else {
                    now_ms
                },
            },
        };

        self.promote(now_ms);
        self.surfaced()
    }

    fn promote(&mut self, now_ms: u64) {
        if let DebounceState::Pending {
            since_ms,
            candidate,
            candidate_since_ms,
            ..
        } = self.state
        {
            let waited = now_ms.saturating_sub(candidate_since_ms) >= self.pending_ms;
            let held = since_ms
                .map(|since| now_ms.saturating_sub(since) >= self.min_display_ms)
                .unwrap_or(true);
            if waited && held {
                self.state = DebounceState::Shown {
                    hint: candidate,
                    since_ms: Some(now_ms),
                };
            }
        }
    }

    pub fn reset(&mut self) {
        *self = Self::with_windows(self.pending_ms, self.min_display_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_waits_out_pending_window() {
        let mut hints = HintDebouncer::new();
        assert_eq!(hints.observe(FailureReason::TooSmall, 0), None);
        assert_eq!(hints.observe(FailureReason::TooSmall, 299), None);
        assert_eq!(
            hints.observe(FailureReason::TooSmall, 300),
            Some(FailureReason::TooSmall)
        );
    }

    #[test]
    fn flicker_never_surfaces() {
        let mut hints = HintDebouncer::new();
        for step in 0..20u64 {
            let reason = if step % 2 == 0 {
                FailureReason::TooSmall
            } else {
                FailureReason::NotCentered
            };
            assert_eq!(hints.observe(reason, step * 100), None);
        }
    }

    #[test]
    fn shown_hint_is_held_for_min_display() {
        let mut hints = HintDebouncer::new();
        hints.observe(FailureReason::TooSmall, 0);
        hints.observe(FailureReason::TooSmall, 300);

        // Replacement persists past its own delay but the hold is not over.
        hints.observe(FailureReason::NotCentered, 350);
        assert_eq!(
            hints.observe(FailureReason::NotCentered, 700),
            Some(FailureReason::TooSmall)
        );
        assert_eq!(
            hints.observe(FailureReason::NotCentered, 900),
            Some(FailureReason::NotCentered)
        );
    }

    #[test]
    fn urgent_reasons_bypass_both_windows() {
        let mut hints = HintDebouncer::new();
        hints.observe(FailureReason::TooSmall, 0);
        hints.observe(FailureReason::TooSmall, 300);
        assert_eq!(
            hints.observe(FailureReason::MultipleFaces, 310),
            Some(FailureReason::MultipleFaces)
        );
        assert_eq!(
            hints.observe(FailureReason::NoFace, 320),
            Some(FailureReason::NoFace)
        );
    }

    #[test]
    fn clearing_is_debounced_too() {
        let mut hints = HintDebouncer::new();
        hints.observe(FailureReason::NoFace, 0);
        assert_eq!(
            hints.observe(FailureReason::None, 100),
            Some(FailureReason::NoFace)
        );
        assert_eq!(hints.observe(FailureReason::None, 600), None);
    }

    #[test]
    fn returning_to_shown_hint_cancels_pending() {
        let mut hints = HintDebouncer::new();
        hints.observe(FailureReason::EyesCovered, 0);
        hints.observe(FailureReason::EyesCovered, 300);
        hints.observe(FailureReason::MouthCovered, 1_000);
        hints.observe(FailureReason::EyesCovered, 1_100);
        assert!(matches!(hints.state(), DebounceState::Shown { .. }));
        // A fresh candidate has to start its delay over.
        assert_eq!(
            hints.observe(FailureReason::MouthCovered, 1_200),
            Some(FailureReason::EyesCovered)
        );
    }
}
