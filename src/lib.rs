//! Workspace umbrella crate.
//!
//! Re-exports the [`core_service`] façade so hosts can depend on a single
//! crate and pick features here instead of wiring each workspace crate.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
