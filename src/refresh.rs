//! Refresh supersession and snapshot handoff.
//!
//! Refreshes are raced against the user: a new refresh may start while an
//! old one's reads are still outstanding. The most recently *requested*
//! refresh wins; a late commit from a superseded one is discarded
//! silently. The current collection is a shared `Arc` swapped atomically
//! under a mutex, so an in-flight query keeps whichever snapshot it
//! started with.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::model::Run;

#[derive(Debug, Default)]
pub struct RefreshCoordinator {
    epoch: AtomicU64,
    current: Mutex<Arc<Vec<Run>>>,
    last_error: Mutex<Option<String>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // a poisoned lock only means another thread panicked mid-swap; the
    // data is a plain Arc/Option and stays usable
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a refresh; the returned token must accompany the commit.
    pub fn begin(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// True while no newer refresh has been requested since `token`.
    pub fn is_current(&self, token: u64) -> bool {
        token == self.epoch.load(Ordering::SeqCst)
    }

    /// Install a refresh result. Returns false (and drops the rows) when
    /// a newer refresh has been requested in the meantime.
    pub fn commit(&self, token: u64, rows: Vec<Run>) -> bool {
        if !self.is_current(token) {
            return false;
        }
        *lock(&self.current) = Arc::new(rows);
        *lock(&self.last_error) = None;
        true
    }

    /// Record a total refresh failure: zero rows plus a message the
    /// presenter can show in place of the result view. Same supersession
    /// rule as `commit`.
    pub fn fail(&self, token: u64, message: impl Into<String>) -> bool {
        if !self.is_current(token) {
            return false;
        }
        *lock(&self.current) = Arc::new(Vec::new());
        *lock(&self.last_error) = Some(message.into());
        true
    }

    /// The current collection. Cheap; callers hold the `Arc` for however
    /// long their query takes.
    pub fn current(&self) -> Arc<Vec<Run>> {
        lock(&self.current).clone()
    }

    /// Message from the last committed refresh, if it failed outright.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }
}
