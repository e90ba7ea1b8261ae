use serde::Serialize;

use crate::{
    analysis::AnalysisOutcome,
    flow::{FlowEvent, FlowState},
    readiness::ReadinessUpdate,
    scheduler::SchedulerEvent,
};

/// Everything a UI layer needs to redraw, in the order it happened.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum EngineEvent {
    #[serde(rename_all = "camelCase")]
    FlowChanged {
        session_id: Option<String>,
        from: FlowState,
        event: FlowEvent,
        to: FlowState,
        route: &'static str,
    },
    /// Sent only when readiness or the surfaced hint changes.
    Readiness(ReadinessUpdate),
    #[serde(rename_all = "camelCase")]
    AnalysisReady {
        session_id: String,
        outcome: AnalysisOutcome,
    },
    #[serde(rename_all = "camelCase")]
    Routine {
        session_id: String,
        event: SchedulerEvent,
    },
}
