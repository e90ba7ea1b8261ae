//! Built-in guided routines.
//!
//! Each routine is an ordered list of whole-second phases played
//! `repetitions` times. Definitions are validated once when the catalog is
//! built and are immutable afterwards, so `total_duration_seconds` always
//! equals `sum(phase durations) * repetitions`.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

/// Routine the engine falls back to when analysis recommends nothing usable.
pub const DEFAULT_ACTION_ID: &str = "box-breathing";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Inhale,
    Hold,
    Exhale,
    Pause,
}

impl PhaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseKind::Inhale => "inhale",
            PhaseKind::Hold => "hold",
            PhaseKind::Exhale => "exhale",
            PhaseKind::Pause => "pause",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Phase {
    pub kind: PhaseKind,
    pub duration_seconds: u32,
    pub text: String,
}

impl Phase {
    pub fn new(kind: PhaseKind, duration_seconds: u32, text: impl Into<String>) -> Self {
        Self {
            kind,
            duration_seconds,
            text: text.into(),
        }
    }

    pub fn duration_ms(&self) -> u64 {
        u64::from(self.duration_seconds) * 1_000
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("action '{0}' has no phases")]
    NoPhases(String),
    #[error("action '{id}' phase {index} has zero duration")]
    ZeroDuration { id: String, index: usize },
    #[error("action '{0}' must repeat at least once")]
    ZeroRepetitions(String),
    #[error("action '{0}' is defined twice")]
    DuplicateId(String),
    #[error("action '{0}' is too long")]
    Overflow(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDefinition {
    id: String,
    label: String,
    phases: Vec<Phase>,
    repetitions: u32,
    total_duration_seconds: u32,
}

impl ActionDefinition {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        phases: Vec<Phase>,
        repetitions: u32,
    ) -> Result<Self, CatalogError> {
        let id = id.into();
        if phases.is_empty() {
            return Err(CatalogError::NoPhases(id));
        }
        if let Some(index) = phases.iter().position(|phase| phase.duration_seconds == 0) {
            return Err(CatalogError::ZeroDuration { id, index });
        }
        if repetitions == 0 {
            return Err(CatalogError::ZeroRepetitions(id));
        }

        let cycle_seconds = phases
            .iter()
            .try_fold(0u32, |sum, phase| sum.checked_add(phase.duration_seconds));
        let total_duration_seconds = match cycle_seconds.and_then(|c| c.checked_mul(repetitions)) {
            Some(total) => total,
            None => return Err(CatalogError::Overflow(id)),
        };

        Ok(Self {
            id,
            label: label.into(),
            phases,
            repetitions,
            total_duration_seconds,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn repetitions(&self) -> u32 {
        self.repetitions
    }

    pub fn total_duration_seconds(&self) -> u32 {
        self.total_duration_seconds
    }

    pub fn cycle_duration_ms(&self) -> u64 {
        self.phases.iter().map(Phase::duration_ms).sum()
    }

    pub fn total_duration_ms(&self) -> u64 {
        u64::from(self.total_duration_seconds) * 1_000
    }
}

#[derive(Debug, Clone)]
pub struct ActionCatalog {
    actions: HashMap<String, Arc<ActionDefinition>>,
}

impl ActionCatalog {
    pub fn from_definitions(definitions: Vec<ActionDefinition>) -> Result<Self, CatalogError> {
        let mut actions = HashMap::with_capacity(definitions.len());
        for definition in definitions {
            let id = definition.id.clone();
            if actions.insert(id.clone(), Arc::new(definition)).is_some() {
                return Err(CatalogError::DuplicateId(id));
            }
        }
        Ok(Self { actions })
    }

    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_definitions(builtin_definitions()?)
    }

    pub fn get(&self, id: &str) -> Option<Arc<ActionDefinition>> {
        self.actions.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.actions.contains_key(id)
    }

    /// The fallback routine, or any routine if a custom catalog lacks it.
    pub fn default_action(&self) -> Option<Arc<ActionDefinition>> {
        self.get(DEFAULT_ACTION_ID)
            .or_else(|| self.sorted().into_iter().next())
    }

    /// All routines ordered by id.
    pub fn sorted(&self) -> Vec<Arc<ActionDefinition>> {
        let mut all: Vec<_> = self.actions.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

fn builtin_definitions() -> Result<Vec<ActionDefinition>, CatalogError> {
    use PhaseKind::{Exhale, Hold, Inhale, Pause};

    Ok(vec![
        // Box breathing: equal sides, steadies focus.
        ActionDefinition::new(
            DEFAULT_ACTION_ID,
            "Box Breathing",
            vec![
                Phase::new(Inhale, 4, "Breathe in through your nose"),
                Phase::new(Hold, 4, "Hold"),
                Phase::new(Exhale, 4, "Breathe out slowly"),
                Phase::new(Hold, 4, "Hold"),
            ],
            4,
        )?,
        ActionDefinition::new(
            "4-7-8",
            "Tranquility",
            vec![
                Phase::new(Inhale, 4, "Breathe in quietly"),
                Phase::new(Hold, 7, "Hold your breath"),
                Phase::new(Exhale, 8, "Whoosh the air out"),
            ],
            4,
        )?,
        ActionDefinition::new(
            "coherence",
            "Coherent Breathing",
            vec![
                Phase::new(Inhale, 5, "Breathe in"),
                Phase::new(Exhale, 5, "Breathe out"),
            ],
            6,
        )?,
        // Double inhale then a long exhale; offloads CO2 quickly.
        ActionDefinition::new(
            "physiological-sigh",
            "Physiological Sigh",
            vec![
                Phase::new(Inhale, 2, "Breathe in deeply"),
                Phase::new(Inhale, 1, "Top up with a short sip"),
                Phase::new(Exhale, 6, "Long, slow exhale"),
                Phase::new(Pause, 2, "Rest"),
            ],
            5,
        )?,
        ActionDefinition::new(
            "shoulder-release",
            "Shoulder Release",
            vec![
                Phase::new(Inhale, 3, "Lift your shoulders to your ears"),
                Phase::new(Hold, 2, "Hold the shrug"),
                Phase::new(Exhale, 4, "Drop your shoulders and let go"),
                Phase::new(Pause, 3, "Sit tall, chin slightly tucked"),
            ],
            4,
        )?,
    ])
}
