use std::future::Future;

/// Spawns background work on the ambient tokio runtime.
///
/// Adapters are expected to live inside a runtime; without one the work is
/// dropped with a warning instead of panicking, since everything spawned here
/// (attribution fetch, deferred refreshes) is best-effort.
pub(crate) fn spawn<T>(future: T)
where
    T: Future + Send + 'static,
    T::Output: Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(future);
        }
        Err(_) => log::warn!("no async runtime available, background task dropped"),
    }
}
