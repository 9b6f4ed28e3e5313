//! Task spawning.
//!
//! Background work in the core (profile loads, page fetches) runs on tasks
//! spawned here. Those tasks hold weak references to their owners and a
//! cancellation token, so dropping the owner is enough to stop them.

pub use tokio::task::{yield_now, JoinError, JoinHandle};

/// Spawn `future` on the current runtime.
///
/// # Panics
///
/// Panics outside a Tokio runtime, like `tokio::spawn`.
///
/// ```rust
/// # async fn example() {
/// let handle = core_async::task::spawn(async { 6 * 7 });
/// assert_eq!(handle.await.unwrap(), 42);
/// # }
/// ```
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}
