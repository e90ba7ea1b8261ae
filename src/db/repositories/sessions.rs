use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_optional_datetime, parse_status, to_score},
    models::{AnalysisFacts, SessionRecord, SessionStatus},
};

const SESSION_COLUMNS: &str = "id, status, action_id, analysis_state, before_score, after_score, feedback, used_fallback, started_at, completed_at, created_at, updated_at";

fn row_to_session(row: &Row) -> Result<SessionRecord> {
    let status: String = row.get("status")?;
    let before_score: Option<i64> = row.get("before_score")?;
    let after_score: Option<i64> = row.get("after_score")?;
    let started_at: String = row.get("started_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(SessionRecord {
        id: row.get("id")?,
        status: parse_status(&status)?,
        action_id: row.get("action_id")?,
        analysis_state: row.get("analysis_state")?,
        before_score: to_score(before_score, "before_score")?,
        after_score: to_score(after_score, "after_score")?,
        feedback: row.get("feedback")?,
        used_fallback: row.get::<_, i64>("used_fallback")? != 0,
        started_at: parse_datetime(&started_at, "started_at")?,
        completed_at: parse_optional_datetime(completed_at, "completed_at")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    pub async fn insert_session(&self, session: &SessionRecord) -> Result<()> {
        let record = session.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, status, action_id, analysis_state, before_score, after_score, feedback, used_fallback, started_at, completed_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    record.id,
                    record.status.as_str(),
                    record.action_id,
                    record.analysis_state,
                    record.before_score,
                    record.after_score,
                    record.feedback,
                    record.used_fallback,
                    record.started_at.to_rfc3339(),
                    record.completed_at.as_ref().map(|dt| dt.to_rfc3339()),
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn record_analysis(
        &self,
        session_id: &str,
        facts: &AnalysisFacts,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        let facts = facts.clone();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE sessions
                 SET analysis_state = ?1,
                     action_id = ?2,
                     before_score = ?3,
                     used_fallback = ?4,
                     updated_at = ?5
                 WHERE id = ?6",
                params![
                    facts.analysis_state,
                    facts.action_id,
                    facts.before_score,
                    facts.used_fallback,
                    updated_at.to_rfc3339(),
                    session_id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Close out a session once the feedback loop has concluded.
    pub async fn complete_session(
        &self,
        session_id: &str,
        after_score: Option<u8>,
        feedback: Option<String>,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE sessions
                 SET status = ?1,
                     after_score = ?2,
                     feedback = ?3,
                     completed_at = ?4,
                     updated_at = ?4
                 WHERE id = ?5",
                params![
                    SessionStatus::Completed.as_str(),
                    after_score,
                    feedback,
                    completed_at.to_rfc3339(),
                    session_id,
                ],
            )?;

            if rows_affected == 0 {
                return Err(anyhow::anyhow!("Session not found"));
            }
            Ok(())
        })
        .await
    }

    pub async fn mark_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE sessions
                 SET status = ?1,
                     updated_at = ?2
                 WHERE id = ?3",
                params![status.as_str(), updated_at.to_rfc3339(), session_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"
            ))?;

            let session = stmt
                .query_row(params![session_id], |row| Ok(row_to_session(row)))
                .optional()?
                .transpose()?;
            Ok(session)
        })
        .await
    }

    pub async fn get_incomplete_sessions(&self) -> Result<Vec<SessionRecord>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE status = 'Running'
                 ORDER BY started_at DESC"
            ))?;

            let mut rows = stmt.query([])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    pub async fn mark_session_interrupted(
        &self,
        session_id: &str,
        stopped_at: DateTime<Utc>,
    ) -> Result<()> {
        self.mark_session_status(session_id, SessionStatus::Interrupted, stopped_at)
            .await
    }

    /// Completed sessions, newest first.
    pub async fn list_completed_sessions(&self, limit: usize) -> Result<Vec<SessionRecord>> {
        let limit = limit as i64;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE status = 'Completed'
                 ORDER BY started_at DESC
                 LIMIT ?1"
            ))?;

            let mut rows = stmt.query(params![limit])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }
}
