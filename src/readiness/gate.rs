use serde::Serialize;

use super::{
    classify::{classify, FailureReason, ReadinessThresholds},
    hint::HintDebouncer,
    sample::DetectionSample,
};

// Runs on every camera frame; keep quiet unless chasing a detector issue.
const ENABLE_LOGS: bool = false;

use crate::{log_debug, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub reason: FailureReason,
    pub text: &'static str,
}

impl From<FailureReason> for Hint {
    fn from(reason: FailureReason) -> Self {
        Self {
            reason,
            text: reason.hint_text(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessState {
    pub stable_frame_count: u32,
    pub failure_reason: FailureReason,
    pub is_ready: bool,
    pub hint: Option<Hint>,
}

/// Result of feeding one frame through the gate.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessUpdate {
    pub is_ready: bool,
    pub hint: Option<Hint>,
    pub failure_reason: FailureReason,
    pub stable_frame_count: u32,
    /// True only on the frame where `is_ready` flipped from false to true.
    pub became_ready: bool,
}

/// Hysteresis gate owned by a single camera session.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    thresholds: ReadinessThresholds,
    state: ReadinessState,
    hints: HintDebouncer,
    last_timestamp_ms: u64,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new(ReadinessThresholds::default())
    }
}

impl ReadinessGate {
    pub fn new(thresholds: ReadinessThresholds) -> Self {
        Self {
            thresholds,
            state: ReadinessState::default(),
            hints: HintDebouncer::new(),
            last_timestamp_ms: 0,
        }
    }

    pub fn state(&self) -> &ReadinessState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready
    }

    pub fn update(&mut self, sample: &DetectionSample) -> ReadinessUpdate {
        self.apply(Some(sample), sample.timestamp_ms)
    }

    /// A frame arrived without usable detector output.
    pub fn update_missing(&mut self, timestamp_ms: u64) -> ReadinessUpdate {
        self.apply(None, timestamp_ms)
    }

    pub fn reset(&mut self) {
        self.state = ReadinessState::default();
        self.hints.reset();
        self.last_timestamp_ms = 0;
    }

    fn apply(&mut self, sample: Option<&DetectionSample>, timestamp_ms: u64) -> ReadinessUpdate {
        let reason = classify(sample, &self.thresholds);
        let was_ready = self.state.is_ready;

        if reason != self.state.failure_reason {
            log_debug!(
                "readiness reason {} -> {} after {} stable frames",
                self.state.failure_reason.as_str(),
                reason.as_str(),
                self.state.stable_frame_count
            );
        }

        if reason.is_clear() {
            self.state.stable_frame_count = self.state.stable_frame_count.saturating_add(1);
        } else {
            self.state.stable_frame_count = 0;
        }
        self.state.failure_reason = reason;
        self.state.is_ready = reason.is_clear()
            && self.state.stable_frame_count >= self.thresholds.stable_frames_required();

        // Out-of-order timestamps must not rewind the hint clock.
        if timestamp_ms < self.last_timestamp_ms {
            log_warn!(
                "frame at {timestamp_ms}ms arrived after {}ms",
                self.last_timestamp_ms
            );
        }
        let now_ms = timestamp_ms.max(self.last_timestamp_ms);
        self.last_timestamp_ms = now_ms;
        self.state.hint = self.hints.observe(reason, now_ms).map(Hint::from);

        ReadinessUpdate {
            is_ready: self.state.is_ready,
            hint: self.state.hint,
            failure_reason: reason,
            stable_frame_count: self.state.stable_frame_count,
            became_ready: self.state.is_ready && !was_ready,
        }
    }
}
