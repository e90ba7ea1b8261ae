use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::actions::{ActionDefinition, PhaseKind};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SchedulerStatus {
    Idle,
    Running,
    Complete,
    Stopped,
}

impl Default for SchedulerStatus {
    fn default() -> Self {
        SchedulerStatus::Idle
    }
}

impl SchedulerStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SchedulerStatus::Complete | SchedulerStatus::Stopped)
    }
}

/// Where playback is inside a routine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseRunState {
    pub phase_index: usize,
    /// Completed repetitions; equals the repetition count once complete.
    pub cycle: u32,
    /// Whole seconds left in the phase, rounded up. Always within `[0, duration]`.
    pub seconds_remaining: u32,
    /// `1 - remaining / duration` at millisecond resolution.
    pub phase_progress: f64,
    pub is_complete: bool,
    pub phase_kind: PhaseKind,
    pub phase_text: String,
    pub remaining_ms: u64,
    pub elapsed_ms: u64,
}

impl PhaseRunState {
    /// Playback position after `elapsed_ms` of wall time.
    ///
    /// Position is a pure function of elapsed time, so late or skipped ticks
    /// land on the same state an on-time tick would have produced.
    pub fn at(action: &ActionDefinition, elapsed_ms: u64) -> Self {
        let phases = action.phases();
        let total_ms = action.total_duration_ms();
        let cycle_ms = action.cycle_duration_ms();

        if elapsed_ms >= total_ms || cycle_ms == 0 {
            let last = phases.len().saturating_sub(1);
            let (phase_kind, phase_text) = phases
                .get(last)
                .map(|phase| (phase.kind, phase.text.clone()))
                .unwrap_or((PhaseKind::Pause, String::new()));
            return Self {
                phase_index: last,
                cycle: action.repetitions(),
                seconds_remaining: 0,
                phase_progress: 1.0,
                is_complete: true,
                phase_kind,
                phase_text,
                remaining_ms: 0,
                elapsed_ms: total_ms,
            };
        }

        let cycle = (elapsed_ms / cycle_ms) as u32;
        let mut offset = elapsed_ms % cycle_ms;
        let mut phase_index = 0;
        for (index, phase) in phases.iter().enumerate() {
            phase_index = index;
            if offset < phase.duration_ms() {
                break;
            }
            offset -= phase.duration_ms();
        }

        let phase = &phases[phase_index];
        let duration_ms = phase.duration_ms();
        let remaining_ms = duration_ms.saturating_sub(offset);

        Self {
            phase_index,
            cycle,
            seconds_remaining: remaining_ms.div_ceil(1_000) as u32,
            phase_progress: 1.0 - remaining_ms as f64 / duration_ms as f64,
            is_complete: false,
            phase_kind: phase.kind,
            phase_text: phase.text.clone(),
            remaining_ms,
            elapsed_ms,
        }
    }

    fn same_phase(&self, other: &Self) -> bool {
        self.cycle == other.cycle && self.phase_index == other.phase_index
    }
}

/// What a tick did to the run.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Not running; nothing to report.
    Inactive,
    Progress(PhaseRunState),
    PhaseChanged(PhaseRunState),
    Completed(PhaseRunState),
}

#[derive(Debug, Clone)]
pub struct ScheduleState {
    pub status: SchedulerStatus,
    pub action: Arc<ActionDefinition>,
    pub run: PhaseRunState,
    pub started_at: Option<DateTime<Utc>>,
    running_anchor: Option<Instant>,
}

impl ScheduleState {
    pub fn new(action: Arc<ActionDefinition>) -> Self {
        let run = PhaseRunState::at(&action, 0);
        Self {
            status: SchedulerStatus::Idle,
            action,
            run,
            started_at: None,
            running_anchor: None,
        }
    }

    pub fn begin(&mut self, started_at: DateTime<Utc>, now: Instant) -> PhaseRunState {
        self.status = SchedulerStatus::Running;
        self.started_at = Some(started_at);
        self.running_anchor = Some(now);
        self.run = PhaseRunState::at(&self.action, 0);
        self.run.clone()
    }

    pub fn advance(&mut self, now: Instant) -> TickOutcome {
        let anchor = match (self.status, self.running_anchor) {
            (SchedulerStatus::Running, Some(anchor)) => anchor,
            _ => return TickOutcome::Inactive,
        };

        let elapsed_ms = now.saturating_duration_since(anchor).as_millis() as u64;
        let next = PhaseRunState::at(&self.action, elapsed_ms);
        let changed = !next.same_phase(&self.run);
        self.run = next.clone();

        if next.is_complete {
            self.status = SchedulerStatus::Complete;
            self.running_anchor = None;
            TickOutcome::Completed(next)
        } else if changed {
            TickOutcome::PhaseChanged(next)
        } else {
            TickOutcome::Progress(next)
        }
    }

    /// Status and position at `now` without moving the run. A run past its
    /// end reads as complete before the final tick lands.
    pub fn peek(&self, now: Instant) -> (SchedulerStatus, PhaseRunState) {
        match self.clone().advance(now) {
            TickOutcome::Progress(run) | TickOutcome::PhaseChanged(run) => (self.status, run),
            TickOutcome::Completed(run) => (SchedulerStatus::Complete, run),
            TickOutcome::Inactive => (self.status, self.run.clone()),
        }
    }

    /// Returns false when there was nothing left to stop.
    pub fn stop(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = SchedulerStatus::Stopped;
        self.running_anchor = None;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionCatalog, Phase, DEFAULT_ACTION_ID};
    use std::time::Duration;

    fn box_breathing() -> Arc<ActionDefinition> {
        ActionCatalog::builtin()
            .unwrap()
            .get(DEFAULT_ACTION_ID)
            .unwrap()
    }

    #[test]
    fn starts_at_full_first_phase() {
        let run = PhaseRunState::at(&box_breathing(), 0);
        assert_eq!(run.phase_index, 0);
        assert_eq!(run.cycle, 0);
        assert_eq!(run.seconds_remaining, 4);
        assert_eq!(run.phase_kind, PhaseKind::Inhale);
        assert_eq!(run.phase_progress, 0.0);
        assert!(!run.is_complete);
    }

    #[test]
    fn seconds_round_up_and_progress_is_smooth() {
        let run = PhaseRunState::at(&box_breathing(), 1_500);
        assert_eq!(run.seconds_remaining, 3);
        assert_eq!(run.remaining_ms, 2_500);
        assert!((run.phase_progress - 0.375).abs() < 1e-9);
    }

    #[test]
    fn walks_phases_and_cycles() {
        let action = box_breathing();
        let run = PhaseRunState::at(&action, 4_000);
        assert_eq!((run.cycle, run.phase_index), (0, 1));
        let run = PhaseRunState::at(&action, 15_999);
        assert_eq!((run.cycle, run.phase_index), (0, 3));
        assert_eq!(run.seconds_remaining, 1);
        let run = PhaseRunState::at(&action, 16_000);
        assert_eq!((run.cycle, run.phase_index), (1, 0));
        let run = PhaseRunState::at(&action, 63_999);
        assert_eq!((run.cycle, run.phase_index), (3, 3));
        assert!(!run.is_complete);
    }

    #[test]
    fn completes_at_total_duration() {
        let run = PhaseRunState::at(&box_breathing(), 64_000);
        assert!(run.is_complete);
        assert_eq!(run.cycle, 4);
        assert_eq!(run.seconds_remaining, 0);
        assert_eq!(run.phase_progress, 1.0);
    }

    #[test]
    fn uneven_phases() {
        let action = ActionDefinition::new(
            "uneven",
            "Uneven",
            vec![
                Phase::new(PhaseKind::Inhale, 2, "in"),
                Phase::new(PhaseKind::Exhale, 5, "out"),
            ],
            2,
        )
        .unwrap();
        let run = PhaseRunState::at(&action, 6_100);
        assert_eq!((run.cycle, run.phase_index), (0, 1));
        assert_eq!(run.seconds_remaining, 1);
        let run = PhaseRunState::at(&action, 8_000);
        assert_eq!((run.cycle, run.phase_index), (1, 0));
        assert_eq!(run.seconds_remaining, 1);
    }

    #[test]
    fn late_tick_collapses_into_single_completion() {
        let mut state = ScheduleState::new(box_breathing());
        let anchor = Instant::now();
        state.begin(Utc::now(), anchor);

        let outcome = state.advance(anchor + Duration::from_secs(500));
        assert!(matches!(outcome, TickOutcome::Completed(ref run) if run.cycle == 4));
        assert_eq!(state.status, SchedulerStatus::Complete);
        assert_eq!(state.advance(anchor + Duration::from_secs(501)), TickOutcome::Inactive);
    }

    #[test]
    fn peek_past_the_end_reads_complete() {
        let mut state = ScheduleState::new(box_breathing());
        let anchor = Instant::now();
        state.begin(Utc::now(), anchor);

        let (status, run) = state.peek(anchor + Duration::from_millis(10_000));
        assert_eq!(status, SchedulerStatus::Running);
        assert_eq!(run.phase_index, 2);

        let (status, run) = state.peek(anchor + Duration::from_millis(64_500));
        assert_eq!(status, SchedulerStatus::Complete);
        assert!(run.is_complete);

        // Peeking leaves the real run untouched.
        assert_eq!(state.status, SchedulerStatus::Running);
        assert_eq!(state.run.phase_index, 0);
    }

    #[test]
    fn phase_change_is_reported_once() {
        let mut state = ScheduleState::new(box_breathing());
        let anchor = Instant::now();
        state.begin(Utc::now(), anchor);

        assert!(matches!(
            state.advance(anchor + Duration::from_millis(3_000)),
            TickOutcome::Progress(_)
        ));
        assert!(matches!(
            state.advance(anchor + Duration::from_millis(4_000)),
            TickOutcome::PhaseChanged(ref run) if run.phase_index == 1
        ));
        assert!(matches!(
            state.advance(anchor + Duration::from_millis(4_250)),
            TickOutcome::Progress(_)
        ));
    }

    #[test]
    fn stop_is_idempotent_and_blocks_completion() {
        let mut state = ScheduleState::new(box_breathing());
        let anchor = Instant::now();
        state.begin(Utc::now(), anchor);

        assert!(state.stop());
        assert!(!state.stop());
        assert_eq!(
            state.advance(anchor + Duration::from_secs(100)),
            TickOutcome::Inactive
        );
        assert_eq!(state.status, SchedulerStatus::Stopped);
    }
}
