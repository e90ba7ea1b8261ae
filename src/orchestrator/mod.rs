pub mod controller;
pub mod events;

pub use controller::SessionOrchestrator;
pub use events::EngineEvent;
