//! Core chat types: configuration, errors and identifiers.

pub mod config;
pub mod errors;
pub mod ids;

pub use config::{ChatConfig, ENV_CONFIG_PATH};
pub use errors::{ChatError, ChatResult};
pub use ids::SessionId;
