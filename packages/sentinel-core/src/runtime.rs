//! Task spawning for fire-and-forget side effects.
//!
//! Alarm playback is started through [`TaskSpawner`] so the dispatcher never
//! waits on it. [`TokioSpawner`] also keeps a count of tasks that have not
//! finished yet, which the controller reports so leaked playbacks are visible.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Abstraction for spawning detached background tasks.
///
/// The spawned task runs independently of the caller; there is no way to
/// cancel or join it through this trait.
pub trait TaskSpawner: Send + Sync {
    /// Spawns a future as a background task.
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Number of spawned tasks that have not completed yet.
    fn in_flight(&self) -> usize;
}

/// Tokio-based spawner that tracks outstanding tasks.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
    in_flight: Arc<AtomicUsize>,
}

impl TokioSpawner {
    /// Creates a new `TokioSpawner` with the given runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Creates a new `TokioSpawner` using the current runtime's handle.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }
}

/// Decrements the in-flight count when the task finishes, panics, or is
/// dropped by a shutting-down runtime.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard(Arc::clone(&self.in_flight));
        self.handle.spawn(async move {
            let _guard = guard;
            future.await;
        });
    }

    fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}
