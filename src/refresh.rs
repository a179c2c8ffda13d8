//! Coalescing of rapid-fire source refreshes.

use std::sync::Arc;

use parking_lot::Mutex;
use web_time::{Duration, Instant};

use crate::error::ArclinkError;

/// Refresh callback scheduled on the debouncer.
///
/// The callback recomputes the source descriptor when it runs, not when it is
/// scheduled, so a deferred refresh always reflects the latest option state.
pub(crate) type RefreshFn = Arc<dyn Fn() -> Result<(), ArclinkError> + Send + Sync>;

/// Minimum gap between two applied refreshes.
const REFRESH_WINDOW: Duration = Duration::from_millis(50);

/// Deferral granularity, one display frame.
const FRAME: Duration = Duration::from_millis(16);

#[derive(Debug, Default)]
struct DebounceState {
    last_applied: Option<Instant>,
    /// Bumped on every deferral; a sleeping task only runs if its generation
    /// is still current, which is how a newer call cancels an older one.
    generation: u64,
    pending: bool,
}

/// Coalesces bursts of mutation-triggered refreshes into single renderer
/// updates.
///
/// The first call in a burst applies immediately. Calls arriving within
/// [`REFRESH_WINDOW`] of the last applied refresh are deferred by one frame,
/// each new call superseding the previously deferred one, so a burst settles
/// with exactly one trailing refresh.
#[derive(Debug, Default)]
pub(crate) struct SourceRefreshDebouncer {
    state: Arc<Mutex<DebounceState>>,
}

impl SourceRefreshDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules a refresh.
    ///
    /// When the refresh applies immediately its result is returned; a
    /// deferred refresh has no caller left to report to, so its errors are
    /// logged instead.
    pub fn schedule(&self, refresh: RefreshFn) -> Result<(), ArclinkError> {
        let mut state = self.state.lock();
        let now = Instant::now();
        let in_window = state
            .last_applied
            .map(|last| now.duration_since(last) < REFRESH_WINDOW)
            .unwrap_or(false);

        if !in_window && !state.pending {
            state.last_applied = Some(now);
            drop(state);
            return refresh();
        }

        state.generation += 1;
        state.pending = true;
        let generation = state.generation;
        drop(state);

        let shared = Arc::clone(&self.state);
        crate::async_runtime::spawn(async move {
            tokio::time::sleep(FRAME).await;
            {
                let mut state = shared.lock();
                if state.generation != generation {
                    // A newer call superseded this one.
                    return;
                }
                state.pending = false;
                state.last_applied = Some(Instant::now());
            }
            if let Err(error) = refresh() {
                log::error!("deferred source refresh failed: {error}");
            }
        });
        Ok(())
    }

    /// Records an out-of-band applied refresh (an explicit `update()`), so a
    /// mutation immediately following it still coalesces.
    pub fn mark_applied(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        state.pending = false;
        state.last_applied = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting_refresh(counter: &Arc<AtomicUsize>) -> RefreshFn {
        let counter = Arc::clone(counter);
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[tokio::test]
    async fn first_call_applies_immediately() {
        let debouncer = SourceRefreshDebouncer::new();
        let counter = Arc::new(AtomicUsize::new(0));
        debouncer
            .schedule(counting_refresh(&counter))
            .expect("immediate refresh");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn burst_coalesces_into_one_trailing_refresh() {
        let debouncer = SourceRefreshDebouncer::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            debouncer
                .schedule(counting_refresh(&counter))
                .expect("schedule");
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn calls_apart_from_each_other_apply_directly() {
        let debouncer = SourceRefreshDebouncer::new();
        let counter = Arc::new(AtomicUsize::new(0));

        debouncer
            .schedule(counting_refresh(&counter))
            .expect("schedule");
        tokio::time::sleep(Duration::from_millis(80)).await;
        debouncer
            .schedule(counting_refresh(&counter))
            .expect("schedule");

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn deferred_refresh_runs_latest_closure() {
        let debouncer = SourceRefreshDebouncer::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        debouncer.schedule(counting_refresh(&first)).expect("schedule");
        debouncer.schedule(counting_refresh(&first)).expect("schedule");
        debouncer
            .schedule(counting_refresh(&second))
            .expect("schedule");

        tokio::time::sleep(Duration::from_millis(100)).await;
        // The first call applied immediately; of the two deferred calls only
        // the latest ran.
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }
}
