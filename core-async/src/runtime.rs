//! Runtime handles for code that may run outside async context.
//!
//! The logging sink layer uses these to forward entries whether or not the
//! emitting thread is inside a runtime.

pub use tokio::runtime::{Builder, Handle};

/// Drive `future` to completion on a throwaway current-thread runtime.
///
/// Returns an error instead of panicking when the runtime cannot be built.
/// Must not be called from inside a runtime.
pub fn block_on<F>(future: F) -> std::io::Result<F::Output>
where
    F: std::future::Future,
{
    let runtime = Builder::new_current_thread().enable_all().build()?;
    Ok(runtime.block_on(future))
}
