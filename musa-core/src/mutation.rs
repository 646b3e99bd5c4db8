//! Optimistic local mutations
//!
//! A [`PendingMutation`] holds a snapshot of the whole state taken right
//! before an optimistic change. Compensating restores that snapshot in full,
//! so any change made to the state while the request was running is lost
//! along with the optimistic one.

/// An optimistic change awaiting confirmation from the backend
#[derive(Debug)]
#[must_use = "a pending mutation must be committed, compensated, or settled"]
pub struct PendingMutation<T: Clone> {
    snapshot: T,
}

impl<T: Clone> PendingMutation<T> {
    /// Snapshot `state`, then apply `change` to it.
    pub fn apply(state: &mut T, change: impl FnOnce(&mut T)) -> Self {
        let snapshot = state.clone();
        change(state);
        Self { snapshot }
    }

    /// Keep the optimistic state.
    pub fn commit(self) {}

    /// Put back the snapshot taken before the change.
    pub fn compensate(self, state: &mut T) {
        *state = self.snapshot;
    }

    /// Commit on `Ok`, compensate on `Err`.
    pub fn settle<R, E>(self, state: &mut T, outcome: &Result<R, E>) {
        match outcome {
            Ok(_) => self.commit(),
            Err(_) => self.compensate(state),
        }
    }
}
