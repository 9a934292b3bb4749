use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

enum FutureState<V> {
    Unset,
    Ready(V),
    Failed(Arc<Error>),
}

/// A single-assignment future with blocking readers.
///
/// The value is produced exactly once by [`compute`](Self::compute); any
/// number of threads may then observe it through [`get`](Self::get) or
/// [`get_timeout`](Self::get_timeout), which block until the future
/// resolves.  There is deliberately no way to cancel a pending
/// computation: the value's lifecycle is tied to the production step
/// itself.
pub struct SettableFuture<V> {
    cell: Mutex<FutureState<V>>,
    resolved: Condvar,
}

impl<V: Clone> SettableFuture<V> {
    pub fn new() -> SettableFuture<V> {
        SettableFuture {
            cell: Mutex::new(FutureState::Unset),
            resolved: Condvar::new(),
        }
    }

    /// Runs `produce` and records its outcome, waking all waiting readers.
    ///
    /// The production step runs under the future's lock, so readers cannot
    /// observe a half-made value.
    ///
    /// # Panics
    ///
    /// Panics if the future has already been computed, whatever the
    /// outcome of the first computation was.
    pub fn compute(&self, produce: impl FnOnce() -> Result<V>) {
        let mut cell = self.cell.lock().unwrap();
        if !matches!(*cell, FutureState::Unset) {
            panic!("SettableFuture::compute called more than once");
        }
        *cell = match produce() {
            Ok(value) => FutureState::Ready(value),
            Err(e) => FutureState::Failed(Arc::new(e)),
        };
        self.resolved.notify_all();
    }

    /// Returns whether a value or failure has been recorded.
    pub fn is_done(&self) -> bool {
        !matches!(*self.cell.lock().unwrap(), FutureState::Unset)
    }

    /// Blocks until the future resolves.
    ///
    /// A recorded failure is re-raised as [`Error::Execution`] on this and
    /// every later call, distinguishing "the operation failed" from a
    /// failed wait.
    pub fn get(&self) -> Result<V> {
        let mut cell = self.cell.lock().unwrap();
        loop {
            match &*cell {
                FutureState::Ready(value) => return Ok(value.clone()),
                FutureState::Failed(cause) => return Err(Error::Execution(Arc::clone(cause))),
                FutureState::Unset => {}
            }
            cell = self.resolved.wait(cell).unwrap();
        }
    }

    /// Like [`get`](Self::get), but gives up with [`Error::Timeout`] once
    /// `timeout` has elapsed without the future resolving.
    pub fn get_timeout(&self, timeout: Duration) -> Result<V> {
        let deadline = Instant::now() + timeout;
        let mut cell = self.cell.lock().unwrap();
        loop {
            match &*cell {
                FutureState::Ready(value) => return Ok(value.clone()),
                FutureState::Failed(cause) => return Err(Error::Execution(Arc::clone(cause))),
                FutureState::Unset => {}
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout);
            }
            let (guard, _) = self.resolved.wait_timeout(cell, deadline - now).unwrap();
            cell = guard;
        }
    }
}

impl<V: Clone> Default for SettableFuture<V> {
    fn default() -> SettableFuture<V> {
        SettableFuture::new()
    }
}
