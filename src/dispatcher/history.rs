//! Completed-action history and the parked-flow table behind postponement.

use crate::{Action, ActionFlow, ActionGroup};

/// Ordered record of the action names that completed dispatch successfully.
///
/// Appended by the coordinator only after an action's full cycle finished
/// without an unrecovered failure. Purging is explicit, never automatic,
/// and draws a hard boundary: nothing recorded before a purge counts
/// afterwards.
pub(crate) struct History<N> {
    entries: Vec<N>,
    resets: u64,
}

impl<N: Clone + Eq> History<N> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            resets: 0,
        }
    }

    pub fn record(&mut self, name: N) {
        self.entries.push(name);
    }

    pub fn contains(&self, name: &N) -> bool {
        self.entries.contains(name)
    }

    /// Whether any of `names` has completed since the last purge.
    pub fn satisfies_any(&self, names: &[N]) -> bool {
        names.iter().any(|n| self.contains(n))
    }

    pub fn entries(&self) -> &[N] {
        &self.entries
    }

    /// Clear the record. Parked flows are left untouched; they resume only
    /// once their dependency reappears in the post-purge history.
    pub fn purge(&mut self) {
        self.entries.clear();
        self.resets += 1;
    }

    /// Number of purges performed so far.
    pub fn resets(&self) -> u64 {
        self.resets
    }
}

/// A flow waiting for any of its dependency names to appear in history.
pub(crate) struct Parked<A: Action> {
    pub key: A::Name,
    pub deps: ActionGroup<A>,
    pub flow: ActionFlow<A>,
}

/// Table of parked flows, keyed by the waiting flow's first action name.
pub(crate) struct ParkedTable<A: Action> {
    entries: Vec<Parked<A>>,
}

impl<A: Action> ParkedTable<A> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Park a flow. An existing waiter under the same key is replaced, the
    /// parked counterpart of at-most-one-in-flight per name.
    pub fn park(&mut self, key: A::Name, deps: ActionGroup<A>, flow: ActionFlow<A>) {
        self.entries.retain(|entry| entry.key != key);
        self.entries.push(Parked { key, deps, flow });
    }

    /// Remove and return every flow whose dependency set intersects
    /// history, in parking order.
    pub fn resolve(&mut self, history: &History<A::Name>) -> Vec<ActionFlow<A>> {
        let mut resumable = Vec::new();
        let mut waiting = Vec::new();
        for entry in self.entries.drain(..) {
            if history.satisfies_any(entry.deps.names()) {
                resumable.push(entry.flow);
            } else {
                waiting.push(entry);
            }
        }
        self.entries = waiting;
        resumable
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
