//! Screen flow state machine.
//!
//! The transition table is the only authority on which screen may follow
//! which. A (state, event) pair missing from [`next_state`] has no edge: it is
//! rejected, logged, and leaves the machine where it was.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowState {
    HomeIdle,
    Camera,
    Analyzing,
    Result,
    ActionRunning,
    Feedback,
    SharePrompt,
    ShareCard,
    History,
    Error,
}

impl Default for FlowState {
    fn default() -> Self {
        FlowState::HomeIdle
    }
}

impl FlowState {
    pub const ALL: [FlowState; 10] = [
        FlowState::HomeIdle,
        FlowState::Camera,
        FlowState::Analyzing,
        FlowState::Result,
        FlowState::ActionRunning,
        FlowState::Feedback,
        FlowState::SharePrompt,
        FlowState::ShareCard,
        FlowState::History,
        FlowState::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FlowState::HomeIdle => "HOME_IDLE",
            FlowState::Camera => "CAMERA",
            FlowState::Analyzing => "ANALYZING",
            FlowState::Result => "RESULT",
            FlowState::ActionRunning => "ACTION_RUNNING",
            FlowState::Feedback => "FEEDBACK",
            FlowState::SharePrompt => "SHARE_PROMPT",
            FlowState::ShareCard => "SHARE_CARD",
            FlowState::History => "HISTORY",
            FlowState::Error => "ERROR",
        }
    }

    /// States that belong to a live session and can fail into `Error`.
    pub fn is_mid_flow(&self) -> bool {
        matches!(
            self,
            FlowState::Camera
                | FlowState::Analyzing
                | FlowState::Result
                | FlowState::ActionRunning
                | FlowState::Feedback
                | FlowState::SharePrompt
                | FlowState::ShareCard
        )
    }

    /// States with no preconditions, valid after a cold load.
    pub fn is_entry_point(&self) -> bool {
        matches!(self, FlowState::HomeIdle | FlowState::History)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowEvent {
    Start,
    OpenHistory,
    Captured,
    Analyzed,
    BeginAction,
    Retake,
    ActionDone,
    FeedbackGiven,
    AcceptShare,
    Decline,
    ShareDone,
    Error,
    Restart,
    GoHome,
}

impl FlowEvent {
    pub const ALL: [FlowEvent; 14] = [
        FlowEvent::Start,
        FlowEvent::OpenHistory,
        FlowEvent::Captured,
        FlowEvent::Analyzed,
        FlowEvent::BeginAction,
        FlowEvent::Retake,
        FlowEvent::ActionDone,
        FlowEvent::FeedbackGiven,
        FlowEvent::AcceptShare,
        FlowEvent::Decline,
        FlowEvent::ShareDone,
        FlowEvent::Error,
        FlowEvent::Restart,
        FlowEvent::GoHome,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FlowEvent::Start => "start",
            FlowEvent::OpenHistory => "open_history",
            FlowEvent::Captured => "captured",
            FlowEvent::Analyzed => "analyzed",
            FlowEvent::BeginAction => "begin_action",
            FlowEvent::Retake => "retake",
            FlowEvent::ActionDone => "action_done",
            FlowEvent::FeedbackGiven => "feedback_given",
            FlowEvent::AcceptShare => "accept_share",
            FlowEvent::Decline => "decline",
            FlowEvent::ShareDone => "share_done",
            FlowEvent::Error => "error",
            FlowEvent::Restart => "restart",
            FlowEvent::GoHome => "go_home",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("no transition from {} on '{}'", .from.as_str(), .event.as_str())]
    InvalidTransition { from: FlowState, event: FlowEvent },
}

/// The transition table.
pub fn next_state(state: FlowState, event: FlowEvent) -> Option<FlowState> {
    use FlowEvent as E;
    use FlowState as S;

    if event == E::Error {
        return state.is_mid_flow().then_some(S::Error);
    }

    let next = match (state, event) {
        (S::HomeIdle, E::Start) => S::Camera,
        (S::HomeIdle, E::OpenHistory) => S::History,
        (S::History, E::GoHome) => S::HomeIdle,

        (S::Camera, E::Captured) => S::Analyzing,
        (S::Camera, E::GoHome) => S::HomeIdle,

        (S::Analyzing, E::Analyzed) => S::Result,

        (S::Result, E::BeginAction) => S::ActionRunning,
        (S::Result, E::Retake) => S::Camera,
        (S::Result, E::GoHome) => S::HomeIdle,

        (S::ActionRunning, E::ActionDone) => S::Feedback,
        (S::ActionRunning, E::GoHome) => S::HomeIdle,

        (S::Feedback, E::FeedbackGiven) => S::SharePrompt,

        (S::SharePrompt, E::AcceptShare) => S::ShareCard,
        (S::SharePrompt, E::Decline) => S::HomeIdle,

        (S::ShareCard, E::ShareDone) => S::HomeIdle,
        (S::ShareCard, E::GoHome) => S::HomeIdle,

        (S::Error, E::Restart) => S::Camera,
        (S::Error, E::GoHome) => S::HomeIdle,

        _ => return None,
    };
    Some(next)
}

pub fn can_transition(state: FlowState, event: FlowEvent) -> bool {
    next_state(state, event).is_some()
}

/// Resolve an edge or fail loudly. A missing edge means some caller tried to
/// reach a screen without its prerequisite step.
pub fn transition(state: FlowState, event: FlowEvent) -> Result<FlowState, FlowError> {
    next_state(state, event).ok_or_else(|| {
        error!(
            "Rejected flow transition: {} has no edge for '{}'",
            state.as_str(),
            event.as_str()
        );
        FlowError::InvalidTransition { from: state, event }
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub from: FlowState,
    pub event: FlowEvent,
    pub to: FlowState,
    pub at: DateTime<Utc>,
}

const HISTORY_LIMIT: usize = 32;

/// A live flow: the current state plus a short trail of accepted edges.
#[derive(Debug, Clone, Default)]
pub struct FlowMachine {
    state: FlowState,
    trail: VecDeque<TransitionRecord>,
}

impl FlowMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Apply `event`. On rejection the state is left untouched.
    pub fn dispatch(&mut self, event: FlowEvent) -> Result<FlowState, FlowError> {
        let from = self.state;
        let to = transition(from, event)?;
        self.state = to;

        if self.trail.len() == HISTORY_LIMIT {
            self.trail.pop_front();
        }
        self.trail.push_back(TransitionRecord {
            from,
            event,
            to,
            at: Utc::now(),
        });

        info!("flow {} --{}--> {}", from.as_str(), event.as_str(), to.as_str());
        Ok(to)
    }

    pub fn trail(&self) -> impl Iterator<Item = &TransitionRecord> {
        self.trail.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_has_no_rejections() {
        let mut flow = FlowMachine::new();
        let steps = [
            (FlowEvent::Start, FlowState::Camera),
            (FlowEvent::Captured, FlowState::Analyzing),
            (FlowEvent::Analyzed, FlowState::Result),
            (FlowEvent::BeginAction, FlowState::ActionRunning),
            (FlowEvent::ActionDone, FlowState::Feedback),
            (FlowEvent::FeedbackGiven, FlowState::SharePrompt),
            (FlowEvent::Decline, FlowState::HomeIdle),
        ];
        for (event, expected) in steps {
            assert_eq!(flow.dispatch(event), Ok(expected));
        }
        assert_eq!(flow.trail().count(), steps.len());
    }

    #[test]
    fn rejected_event_leaves_state_in_place() {
        let mut flow = FlowMachine::new();
        let err = flow.dispatch(FlowEvent::ActionDone).unwrap_err();
        assert_eq!(
            err,
            FlowError::InvalidTransition {
                from: FlowState::HomeIdle,
                event: FlowEvent::ActionDone
            }
        );
        assert_eq!(flow.state(), FlowState::HomeIdle);
        assert_eq!(flow.trail().count(), 0);
    }

    #[test]
    fn error_reachable_from_every_mid_flow_state_only() {
        for state in FlowState::ALL {
            let next = next_state(state, FlowEvent::Error);
            if state.is_mid_flow() {
                assert_eq!(next, Some(FlowState::Error), "{state:?}");
            } else {
                assert_eq!(next, None, "{state:?}");
            }
        }
    }

    #[test]
    fn error_exits_only_by_restart_or_home() {
        for event in FlowEvent::ALL {
            let next = next_state(FlowState::Error, event);
            match event {
                FlowEvent::Restart => assert_eq!(next, Some(FlowState::Camera)),
                FlowEvent::GoHome => assert_eq!(next, Some(FlowState::HomeIdle)),
                _ => assert_eq!(next, None, "{event:?}"),
            }
        }
    }

    #[test]
    fn no_deep_entry_from_home() {
        for event in FlowEvent::ALL {
            if let Some(next) = next_state(FlowState::HomeIdle, event) {
                assert!(matches!(next, FlowState::Camera | FlowState::History));
            }
        }
    }

    #[test]
    fn error_message_names_both_sides() {
        let err = transition(FlowState::Feedback, FlowEvent::Start).unwrap_err();
        assert_eq!(err.to_string(), "no transition from FEEDBACK on 'start'");
    }

    #[test]
    fn trail_is_bounded() {
        let mut flow = FlowMachine::new();
        for _ in 0..40 {
            flow.dispatch(FlowEvent::OpenHistory).unwrap();
            flow.dispatch(FlowEvent::GoHome).unwrap();
        }
        assert_eq!(flow.trail().count(), HISTORY_LIMIT);
    }
}
