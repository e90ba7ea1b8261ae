pub mod catalog;

pub use catalog::{
    ActionCatalog, ActionDefinition, CatalogError, Phase, PhaseKind, DEFAULT_ACTION_ID,
};
