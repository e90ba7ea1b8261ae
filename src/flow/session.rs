use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::machine::FlowState;

/// Facts gathered while a user walks one session through the flow.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSession {
    pub session_id: String,
    pub state: FlowState,
    pub created_at: DateTime<Utc>,
    pub before_score: Option<u8>,
    pub after_score: Option<u8>,
    pub feedback: Option<String>,
    pub analysis_state: Option<String>,
    pub action_id: Option<String>,
    pub used_fallback: bool,
}

impl FlowSession {
    pub fn begin(state: FlowState) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            state,
            created_at: Utc::now(),
            before_score: None,
            after_score: None,
            feedback: None,
            analysis_state: None,
            action_id: None,
            used_fallback: false,
        }
    }
}
