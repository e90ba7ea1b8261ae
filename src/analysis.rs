//! Contract for the external vision model and the guard around it.
//!
//! The remote call is the only slow, fallible step in a session. It is
//! bounded by a timeout and every failure collapses into the same fixed
//! fallback result, so the flow never waits on it or fails because of it.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::actions::{ActionCatalog, DEFAULT_ACTION_ID};

pub const FALLBACK_SCORE: u8 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WellnessState {
    Calm,
    Stressed,
    Tired,
    Tense,
    Neutral,
}

impl WellnessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WellnessState::Calm => "calm",
            WellnessState::Stressed => "stressed",
            WellnessState::Tired => "tired",
            WellnessState::Tense => "tense",
            WellnessState::Neutral => "neutral",
        }
    }
}

/// A still taken from the camera once the readiness gate opened.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub state: WellnessState,
    /// 0..=100, higher is calmer.
    pub score: u8,
    pub action_id: String,
}

impl AnalysisResult {
    pub fn fallback() -> Self {
        Self {
            state: WellnessState::Neutral,
            score: FALLBACK_SCORE,
            action_id: DEFAULT_ACTION_ID.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("analysis timed out after {0:?}")]
    Timeout(Duration),
    #[error("analysis rate limited")]
    RateLimited,
    #[error("analysis credentials rejected")]
    Unauthorized,
    #[error("analysis unavailable: {0}")]
    Unavailable(String),
    #[error("analysis recommended unknown action '{0}'")]
    UnknownAction(String),
    #[error("analysis score {0} out of range")]
    ScoreOutOfRange(u8),
}

#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    async fn analyze(&self, frame: &CapturedFrame) -> Result<AnalysisResult, AnalysisError>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutcome {
    pub result: AnalysisResult,
    pub used_fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Run the analyzer with a deadline. Never fails: any error, timeout or
/// unusable answer yields [`AnalysisResult::fallback`].
pub async fn analyze_with_fallback(
    analyzer: &dyn VisionAnalyzer,
    frame: &CapturedFrame,
    timeout: Duration,
    catalog: &ActionCatalog,
) -> AnalysisOutcome {
    let attempt = match tokio::time::timeout(timeout, analyzer.analyze(frame)).await {
        Ok(Ok(result)) => validate(result, catalog),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(AnalysisError::Timeout(timeout)),
    };

    match attempt {
        Ok(result) => AnalysisOutcome {
            result,
            used_fallback: false,
            failure: None,
        },
        Err(err) => {
            warn!("Vision analysis failed, using fallback: {err}");
            AnalysisOutcome {
                result: AnalysisResult::fallback(),
                used_fallback: true,
                failure: Some(err.to_string()),
            }
        }
    }
}

fn validate(
    result: AnalysisResult,
    catalog: &ActionCatalog,
) -> Result<AnalysisResult, AnalysisError> {
    if result.score > 100 {
        return Err(AnalysisError::ScoreOutOfRange(result.score));
    }
    if !catalog.contains(&result.action_id) {
        return Err(AnalysisError::UnknownAction(result.action_id));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Result<AnalysisResult, AnalysisError>);

    #[async_trait]
    impl VisionAnalyzer for Fixed {
        async fn analyze(&self, _frame: &CapturedFrame) -> Result<AnalysisResult, AnalysisError> {
            self.0.clone()
        }
    }

    struct Stalled;

    #[async_trait]
    impl VisionAnalyzer for Stalled {
        async fn analyze(&self, _frame: &CapturedFrame) -> Result<AnalysisResult, AnalysisError> {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Ok(AnalysisResult::fallback())
        }
    }

    fn frame() -> CapturedFrame {
        CapturedFrame {
            width: 640,
            height: 480,
            jpeg: vec![0xFF, 0xD8, 0xFF],
            captured_at: Utc::now(),
        }
    }

    fn catalog() -> ActionCatalog {
        ActionCatalog::builtin().unwrap()
    }

    #[tokio::test]
    async fn passes_through_valid_result() {
        let answer = AnalysisResult {
            state: WellnessState::Stressed,
            score: 32,
            action_id: "4-7-8".into(),
        };
        let outcome = analyze_with_fallback(
            &Fixed(Ok(answer.clone())),
            &frame(),
            Duration::from_secs(1),
            &catalog(),
        )
        .await;
        assert_eq!(outcome.result, answer);
        assert!(!outcome.used_fallback);
    }

    #[tokio::test]
    async fn errors_fall_back() {
        for err in [
            AnalysisError::RateLimited,
            AnalysisError::Unauthorized,
            AnalysisError::Unavailable("502".into()),
        ] {
            let analyzer = Fixed(Err(err));
            let outcome =
                analyze_with_fallback(&analyzer, &frame(), Duration::from_secs(1), &catalog())
                    .await;
            assert!(outcome.used_fallback);
            assert_eq!(outcome.result, AnalysisResult::fallback());
        }
    }

    #[tokio::test]
    async fn unknown_action_falls_back() {
        let answer = AnalysisResult {
            state: WellnessState::Calm,
            score: 80,
            action_id: "levitation".into(),
        };
        let outcome =
            analyze_with_fallback(&Fixed(Ok(answer)), &frame(), Duration::from_secs(1), &catalog())
                .await;
        assert!(outcome.used_fallback);
        assert_eq!(
            outcome.failure.as_deref(),
            Some("analysis recommended unknown action 'levitation'")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_call_times_out() {
        let started = tokio::time::Instant::now();
        let outcome =
            analyze_with_fallback(&Stalled, &frame(), Duration::from_millis(800), &catalog()).await;
        assert!(outcome.used_fallback);
        assert_eq!(started.elapsed(), Duration::from_millis(800));
    }
}
