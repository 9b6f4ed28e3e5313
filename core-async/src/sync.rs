//! Synchronization primitives.
//!
//! Async-aware locks and channels come from `tokio::sync`; cooperative
//! cancellation comes from `tokio_util::sync`.
//!
//! Locks from this module may be held across `.await` points. For short,
//! non-suspending critical sections prefer `std::sync::Mutex`.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::{watch, CancellationToken};
//!
//! # async fn example() {
//! let (tx, mut rx) = watch::channel(0u32);
//! tx.send_replace(1);
//! assert_eq!(*rx.borrow_and_update(), 1);
//!
//! let cancel = CancellationToken::new();
//! let guard = cancel.clone().drop_guard();
//! drop(guard);
//! assert!(cancel.is_cancelled());
//! # }
//! ```

pub use tokio::sync::{broadcast, watch, Mutex, MutexGuard, Notify};

pub use tokio_util::sync::{CancellationToken, DropGuard};
