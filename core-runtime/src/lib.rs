//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the session and catalog crates:
//! - [`config`]: `CoreConfig` and its fail-fast builder
//! - [`logging`]: `tracing-subscriber` setup and redaction helpers
//! - [`events`]: the broadcast `EventBus` and typed lifecycle events
//! - [`error`]: runtime error type

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
