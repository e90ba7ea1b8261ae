//! Canonical route for each flow state.
//!
//! Kept apart from the transition table: renaming a route never touches
//! transition logic, and no route can move the machine by itself.

use serde::Serialize;

use super::machine::FlowState;

const ROUTES: [(FlowState, &str); 10] = [
    (FlowState::HomeIdle, "/"),
    (FlowState::Camera, "/camera"),
    (FlowState::Analyzing, "/analyzing"),
    (FlowState::Result, "/result"),
    (FlowState::ActionRunning, "/action"),
    (FlowState::Feedback, "/feedback"),
    (FlowState::SharePrompt, "/share"),
    (FlowState::ShareCard, "/share/card"),
    (FlowState::History, "/history"),
    (FlowState::Error, "/error"),
];

pub fn route_for(state: FlowState) -> &'static str {
    ROUTES
        .iter()
        .find(|(candidate, _)| *candidate == state)
        .map(|(_, route)| *route)
        .unwrap_or("/")
}

/// Exact lookup; trailing slashes and query strings are ignored.
pub fn state_for_route(route: &str) -> Option<FlowState> {
    let path = route.split(['?', '#']).next().unwrap_or_default();
    let trimmed = path.trim_end_matches('/');
    let path = if trimmed.is_empty() { "/" } else { trimmed };
    ROUTES
        .iter()
        .find(|(_, candidate)| *candidate == path)
        .map(|(state, _)| *state)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum RouteDecision {
    /// The requested route is the current screen.
    Render { state: FlowState },
    /// Send the user to the canonical route for `state` instead.
    Redirect { state: FlowState, to: &'static str },
}

impl RouteDecision {
    pub fn state(&self) -> FlowState {
        match self {
            RouteDecision::Render { state } | RouteDecision::Redirect { state, .. } => *state,
        }
    }
}

/// Decide what to show for a navigation request (refresh, back button, deep
/// link). `current` is the live machine state, or `None` after a cold load.
///
/// A route only renders if it names the state the machine is already in.
/// After a cold load only entry-point screens are reachable.
pub fn resolve_route(current: Option<FlowState>, requested: &str) -> RouteDecision {
    let requested_state = state_for_route(requested);

    let current = match current {
        Some(state) => state,
        None => {
            return match requested_state {
                Some(state) if state.is_entry_point() => RouteDecision::Render { state },
                _ => RouteDecision::Redirect {
                    state: FlowState::HomeIdle,
                    to: route_for(FlowState::HomeIdle),
                },
            };
        }
    };

    match requested_state {
        Some(state) if state == current => RouteDecision::Render { state },
        _ => RouteDecision::Redirect {
            state: current,
            to: route_for(current),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_state_has_a_unique_route() {
        for state in FlowState::ALL {
            assert_eq!(state_for_route(route_for(state)), Some(state));
        }
        let mut routes: Vec<_> = FlowState::ALL.iter().map(|s| route_for(*s)).collect();
        routes.sort();
        routes.dedup();
        assert_eq!(routes.len(), FlowState::ALL.len());
    }

    #[test]
    fn lookup_tolerates_slashes_and_queries() {
        assert_eq!(state_for_route("/camera/"), Some(FlowState::Camera));
        assert_eq!(state_for_route("/result?ref=share"), Some(FlowState::Result));
        assert_eq!(state_for_route(""), Some(FlowState::HomeIdle));
        assert_eq!(state_for_route("/nope"), None);
    }

    #[test]
    fn cold_deep_link_goes_home() {
        for state in FlowState::ALL {
            let decision = resolve_route(None, route_for(state));
            if state.is_entry_point() {
                assert_eq!(decision, RouteDecision::Render { state });
            } else {
                assert_eq!(decision.state(), FlowState::HomeIdle, "{state:?}");
            }
        }
    }

    #[test]
    fn back_navigation_cannot_skip_ahead_or_behind() {
        let decision = resolve_route(Some(FlowState::Feedback), "/action");
        assert_eq!(
            decision,
            RouteDecision::Redirect {
                state: FlowState::Feedback,
                to: "/feedback"
            }
        );
        let decision = resolve_route(Some(FlowState::Feedback), "/feedback");
        assert_eq!(decision, RouteDecision::Render { state: FlowState::Feedback });
    }
}
