//! Persisted session ledger rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Running,
    Completed,
    /// Left through an error or by going home before feedback.
    Abandoned,
    /// Still running when the process last exited.
    Interrupted,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "Running",
            SessionStatus::Completed => "Completed",
            SessionStatus::Abandoned => "Abandoned",
            SessionStatus::Interrupted => "Interrupted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub status: SessionStatus,
    pub action_id: Option<String>,
    pub analysis_state: Option<String>,
    pub before_score: Option<u8>,
    pub after_score: Option<u8>,
    pub feedback: Option<String>,
    pub used_fallback: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn running(id: String, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            status: SessionStatus::Running,
            action_id: None,
            analysis_state: None,
            before_score: None,
            after_score: None,
            feedback: None,
            used_fallback: false,
            started_at,
            completed_at: None,
            created_at: started_at,
            updated_at: started_at,
        }
    }

    /// Signed change in score, once both ends are known.
    pub fn improvement(&self) -> Option<i16> {
        match (self.before_score, self.after_score) {
            (Some(before), Some(after)) => Some(i16::from(after) - i16::from(before)),
            _ => None,
        }
    }
}

/// Analysis facts recorded once the vision call (or its fallback) returns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisFacts {
    pub analysis_state: String,
    pub action_id: String,
    pub before_score: u8,
    pub used_fallback: bool,
}
