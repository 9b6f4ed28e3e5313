//! Async runtime seam for the catalog client core.
//!
//! Every `core-*` and `bridge-*` crate reaches the executor through this crate
//! instead of naming Tokio directly, so the runtime can be swapped in one place.
//!
//! # Modules
//!
//! - `task`: Task spawning and execution
//! - `sync`: Synchronization primitives, channels and cancellation
//! - `runtime`: Runtime handles and a fallible `block_on` helper
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::CancellationToken;
//! use core_async::task;
//!
//! # async fn example() {
//! let cancel = CancellationToken::new();
//! let child = cancel.child_token();
//!
//! let handle = task::spawn(async move {
//!     child.cancelled().await;
//!     "stopped"
//! });
//!
//! cancel.cancel();
//! assert_eq!(handle.await.unwrap(), "stopped");
//! # }
//! ```

pub mod runtime;
pub mod sync;
pub mod task;

pub use task::spawn;
