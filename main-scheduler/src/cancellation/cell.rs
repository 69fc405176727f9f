//! Single-assignment cancellation cell.
//!
//! A [`CancellationCell`] holds at most one disposable resource over its
//! lifetime. Assigning into a cell that was already disposed releases the
//! incoming resource on the spot, so a cancellation that wins the race
//! against resource production never leaks the resource.

use super::Disposable;
use crate::errors::AlreadyAssignedError;
use parking_lot::Mutex;
use std::fmt;

/// Observable state of a [`CancellationCell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellStatus {
    /// Nothing assigned, not disposed.
    Empty,
    /// A resource is stored and still live.
    Holding,
    /// The cell was disposed; later assignments are released immediately.
    Disposed,
}

/// What happened to a resource handed to [`CancellationCell::assign`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    /// The resource is now owned by the cell.
    Stored,
    /// The cell was already disposed, so the resource was released at once.
    DisposedImmediately,
}

enum CellState<D> {
    Empty,
    Holding(D),
    Disposed,
}

/// A single-assignment container that disposes its resource exactly once.
pub struct CancellationCell<D: Disposable> {
    state: Mutex<CellState<D>>,
}

impl<D: Disposable> CancellationCell<D> {
    /// Creates an empty cell.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CellState::Empty),
        }
    }

    /// Stores `resource`, or disposes it immediately if the cell is disposed.
    ///
    /// # Panics
    ///
    /// Panics if the cell already holds a resource. Each cell accepts at most
    /// one assignment; a second one is a caller bug.
    pub fn assign(&self, resource: D) -> AssignOutcome {
        match self.try_assign(resource) {
            Ok(outcome) => outcome,
            Err(_) => panic!("cancellation cell assigned twice"),
        }
    }

    /// Like [`assign`](Self::assign), but hands the resource back instead of
    /// panicking when the cell already holds one.
    pub fn try_assign(&self, resource: D) -> Result<AssignOutcome, AlreadyAssignedError<D>> {
        let rejected = {
            let mut state = self.state.lock();
            match *state {
                CellState::Empty => {
                    *state = CellState::Holding(resource);
                    return Ok(AssignOutcome::Stored);
                }
                CellState::Holding(_) => return Err(AlreadyAssignedError { resource }),
                CellState::Disposed => resource,
            }
        };

        // Released outside the lock: disposal may block on another thread.
        let mut rejected = rejected;
        rejected.dispose();
        Ok(AssignOutcome::DisposedImmediately)
    }

    /// Disposes the cell and any resource it holds.
    ///
    /// Returns `true` for the call that performed the transition to
    /// [`CellStatus::Disposed`]; every later call is a no-op returning `false`.
    pub fn dispose(&self) -> bool {
        let previous = {
            let mut state = self.state.lock();
            std::mem::replace(&mut *state, CellState::Disposed)
        };

        match previous {
            CellState::Holding(mut resource) => {
                resource.dispose();
                true
            }
            CellState::Empty => true,
            CellState::Disposed => false,
        }
    }

    /// Returns the current state of the cell.
    #[must_use]
    pub fn status(&self) -> CellStatus {
        match *self.state.lock() {
            CellState::Empty => CellStatus::Empty,
            CellState::Holding(_) => CellStatus::Holding,
            CellState::Disposed => CellStatus::Disposed,
        }
    }

    /// Returns whether the cell has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.status() == CellStatus::Disposed
    }
}

impl<D: Disposable> Default for CancellationCell<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Disposable> Disposable for CancellationCell<D> {
    fn dispose(&mut self) {
        CancellationCell::dispose(self);
    }
}

impl<D: Disposable> fmt::Debug for CancellationCell<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationCell")
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::AnonymousDisposable;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn counting(counter: &Arc<AtomicUsize>) -> AnonymousDisposable {
        let counter = Arc::clone(counter);
        AnonymousDisposable::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_new_cell_is_empty() {
        let cell: CancellationCell<AnonymousDisposable> = CancellationCell::new();
        assert_eq!(cell.status(), CellStatus::Empty);
        assert!(!cell.is_disposed());
    }

    #[test]
    fn test_assign_then_dispose_releases_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let cell = CancellationCell::new();

        assert_eq!(cell.assign(counting(&counter)), AssignOutcome::Stored);
        assert_eq!(cell.status(), CellStatus::Holding);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        assert!(cell.dispose());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(cell.status(), CellStatus::Disposed);
    }

    #[test]
    fn test_assign_after_dispose_disposes_incoming_resource() {
        let counter = Arc::new(AtomicUsize::new(0));
        let cell = CancellationCell::new();

        assert!(cell.dispose());
        let outcome = cell.assign(counting(&counter));

        assert_eq!(outcome, AssignOutcome::DisposedImmediately);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(cell.status(), CellStatus::Disposed);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let counter = Arc::new(AtomicUsize::new(0));
        let cell = CancellationCell::new();
        cell.assign(counting(&counter));

        assert!(cell.dispose());
        assert!(!cell.dispose());
        assert!(!cell.dispose());

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[should_panic(expected = "assigned twice")]
    fn test_double_assign_fails_fast() {
        let cell = CancellationCell::new();
        cell.assign(AnonymousDisposable::new(|| {}));
        cell.assign(AnonymousDisposable::new(|| {}));
    }

    #[test]
    fn test_try_assign_hands_resource_back() {
        let counter = Arc::new(AtomicUsize::new(0));
        let cell = CancellationCell::new();
        cell.assign(counting(&counter));

        let err = cell.try_assign(counting(&counter)).unwrap_err();
        let mut rejected = err.into_resource();
        assert!(!rejected.is_disposed());
        rejected.dispose();

        cell.dispose();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_racing_assign_and_dispose_never_leaks() {
        for _ in 0..200 {
            let counter = Arc::new(AtomicUsize::new(0));
            let cell = Arc::new(CancellationCell::new());
            let barrier = Arc::new(Barrier::new(2));

            let assigner = {
                let cell = Arc::clone(&cell);
                let barrier = Arc::clone(&barrier);
                let resource = counting(&counter);
                thread::spawn(move || {
                    barrier.wait();
                    cell.assign(resource);
                })
            };
            let disposer = {
                let cell = Arc::clone(&cell);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cell.dispose();
                })
            };

            assigner.join().unwrap();
            disposer.join().unwrap();

            assert_eq!(cell.status(), CellStatus::Disposed);
            assert_eq!(counter.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_concurrent_dispose_releases_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let cell = Arc::new(CancellationCell::new());
        cell.assign(counting(&counter));

        let barrier = Arc::new(Barrier::new(8));
        let winners = Arc::new(AtomicUsize::new(0));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let cell = Arc::clone(&cell);
                let barrier = Arc::clone(&barrier);
                let winners = Arc::clone(&winners);
                thread::spawn(move || {
                    barrier.wait();
                    if cell.dispose() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
