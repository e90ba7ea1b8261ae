pub mod machine;
pub mod routes;
pub mod session;

pub use machine::{
    can_transition, next_state, transition, FlowError, FlowEvent, FlowMachine, FlowState,
    TransitionRecord,
};
pub use routes::{resolve_route, route_for, state_for_route, RouteDecision};
pub use session::FlowSession;
