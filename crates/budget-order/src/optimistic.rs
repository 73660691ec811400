//! Snapshot-and-restore wrapper for optimistic updates.
//!
//! The caller applies a pure next-state computation immediately, persists the
//! change, and then either confirms with the server's state or rolls back to
//! the snapshot taken before the first unconfirmed change.

use tracing::{debug, warn};

/// Locally cached state with at most one pending snapshot.
#[derive(Clone, Debug)]
pub struct Optimistic<T> {
    current: T,
    snapshot: Option<T>,
}

impl<T: Clone + PartialEq> Optimistic<T> {
    pub fn new(state: T) -> Self {
        Self {
            current: state,
            snapshot: None,
        }
    }

    pub fn current(&self) -> &T {
        &self.current
    }

    /// True while a change is applied but not yet confirmed or rolled back.
    pub fn is_pending(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Compute the next state from the current one and apply it.
    ///
    /// On error nothing changes. Stacked changes keep the oldest snapshot.
    pub fn apply<E, F>(&mut self, next: F) -> Result<&T, E>
    where
        F: FnOnce(&T) -> Result<T, E>,
    {
        let state = next(&self.current)?;
        if self.snapshot.is_none() {
            self.snapshot = Some(self.current.clone());
        }
        self.current = state;
        Ok(&self.current)
    }

    /// Restore the pre-change snapshot. Returns false if nothing was pending.
    pub fn rollback(&mut self) -> bool {
        match self.snapshot.take() {
            Some(snapshot) => {
                self.current = snapshot;
                debug!("optimistic change rolled back");
                true
            }
            None => false,
        }
    }

    /// Adopt the server-confirmed state.
    ///
    /// Returns whether the local prediction matched it.
    pub fn confirm(&mut self, authoritative: T) -> bool {
        let matched = self.current == authoritative;
        if !matched {
            warn!("server-confirmed state differs from optimistic prediction");
        }
        self.current = authoritative;
        self.snapshot = None;
        matched
    }
}
