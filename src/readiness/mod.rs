pub mod classify;
pub mod gate;
pub mod hint;
pub mod sample;

pub use classify::{classify, FailureReason, ReadinessThresholds};
pub use gate::{Hint, ReadinessGate, ReadinessState, ReadinessUpdate};
pub use hint::{DebounceState, HintDebouncer, HINT_MIN_DISPLAY_MS, HINT_PENDING_MS};
pub use sample::{DetectionSample, NormalizedBox};
