pub mod session;

pub use session::{AnalysisFacts, SessionRecord, SessionStatus};
