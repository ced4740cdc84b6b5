pub mod config;
pub mod coordinator;
pub mod core;

// Re-export commonly used items for convenience
pub use config::{ConfigError, ConfigResult, DuoConfig};
pub use coordinator::{
    CombinedPlayReport, Coordinator, CoordinatorError, CoordinatorResult, ParticipantStatus,
};
pub use core::*;
