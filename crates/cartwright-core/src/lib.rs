//! Shared foundation for the Cartwright procurement assistant:
//! conversation model, configuration, errors, and the conversation store.

pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use error::{CartwrightError, Result};
