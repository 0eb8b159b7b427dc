//! # jnj Common Library
//!
//! Shared code for the jnj music recognition tools:
//! - Error type used across crates
//! - TOML configuration loading and credential resolution
//! - Recognition event types and the broadcast event bus
//! - Timestamp formatting for reports

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::{EventBus, RecognitionEvent};
