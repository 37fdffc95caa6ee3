//! AquaMind core crate - shared domain types, session events, configuration
//! and the top-level error type.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::AquaMindConfig;
pub use error::{AquaError, Result};
pub use events::SessionEvent;
pub use types::*;
