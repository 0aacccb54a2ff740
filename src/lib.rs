//! In-process action dispatch engine.
//!
//! This crate routes typed actions through an ordered middleware pipeline,
//! fans them out to state-owning services, runs the collected side effects
//! concurrently, and records completed action names in a history used to
//! resume postponed actions. It provides:
//!
//! - Public data model: [`Action`], [`ActionFlow`], [`ActionGroup`]
//! - Interceptors: [`Middleware`] producing a [`Rewrite`] per action
//! - State owners: [`Reducer`], [`StatefulService`], and the [`Service`]
//!   fan-out trait with concurrently executed [`SideEffect`]s
//! - Coordinator: [`Dispatcher`] with `send`, `reset`, `drain`, and
//!   at-most-one-in-flight dispatch per action name
//!
//! Action identity is the *name* alone. Equality, history membership,
//! dependency matching, and in-flight keying all go through
//! [`Action::name`]; payloads never participate.

pub mod dispatcher;
mod error;
pub mod middleware;
pub mod service;

pub use dispatcher::{Dispatcher, Outcome, Reset};
pub use error::DispatchError;
pub use middleware::{Middleware, PreMiddleware, Rewrite};
pub use service::{
    side_effect, FnReducer, Reducer, Service, ServiceResult, SideEffect, StatefulService,
};

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;

/// A named unit of intent dispatched into the system.
///
/// One dispatcher instance handles one closed action type; applications
/// model their actions as an enum implementing this trait.
pub trait Action: Clone + Send + Sync + 'static {
    /// Identity used everywhere the engine keys or compares actions.
    type Name: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    /// Extract the action's name. Must be total.
    fn name(&self) -> Self::Name;

    /// Chain another action after this one into a flow.
    fn then(self, other: Self) -> ActionFlow<Self> {
        ActionFlow::new(self).then(other)
    }

    /// Combine this action's name with another name into a dependency group.
    fn and(self, other: Self::Name) -> ActionGroup<Self> {
        ActionGroup::new(self.name()).and(other)
    }
}

/// An ordered, non-empty sequence of actions processed as one logical unit.
///
/// Actions run strictly in order; the first unrecovered failure abandons the
/// remainder of the flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(serialize = "A: Serialize", deserialize = "A: Deserialize<'de>"))]
pub struct ActionFlow<A: Action> {
    actions: Vec<A>,
}

impl<A: Action> ActionFlow<A> {
    /// A flow containing a single action. Flows are non-empty by
    /// construction.
    pub fn new(first: A) -> Self {
        Self {
            actions: vec![first],
        }
    }

    /// Append one action.
    pub fn then(mut self, action: A) -> Self {
        self.actions.push(action);
        self
    }

    /// Append every action of another flow.
    pub fn then_flow(mut self, other: Self) -> Self {
        self.actions.extend(other.actions);
        self
    }

    /// The action whose name keys this flow's dispatch.
    pub fn first(&self) -> &A {
        &self.actions[0]
    }

    /// Number of actions in the flow; always at least one.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Flows are non-empty by construction.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub(crate) fn actions(&self) -> &[A] {
        &self.actions
    }
}

impl<A: Action> From<A> for ActionFlow<A> {
    fn from(action: A) -> Self {
        Self::new(action)
    }
}

/// An unordered collection of action names expressing a "resume when any of
/// these has completed" dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "A::Name: Serialize",
    deserialize = "A::Name: Deserialize<'de>"
))]
pub struct ActionGroup<A: Action> {
    names: Vec<A::Name>,
}

impl<A: Action> ActionGroup<A> {
    /// A group containing a single name.
    pub fn new(name: A::Name) -> Self {
        Self { names: vec![name] }
    }

    /// A group with no names. An empty group can never be satisfied by
    /// history; a flow postponed on it parks until explicitly re-dispatched.
    pub fn empty() -> Self {
        Self { names: Vec::new() }
    }

    /// Add a name to the group.
    pub fn and(mut self, name: A::Name) -> Self {
        self.names.push(name);
        self
    }

    /// Merge another group into this one.
    pub fn and_group(mut self, other: Self) -> Self {
        self.names.extend(other.names);
        self
    }

    /// Whether the group mentions `name`.
    pub fn contains(&self, name: &A::Name) -> bool {
        self.names.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub(crate) fn names(&self) -> &[A::Name] {
        &self.names
    }
}

impl<A: Action> PartialEq for ActionGroup<A> {
    fn eq(&self, other: &Self) -> bool {
        self.names == other.names
    }
}

impl<A: Action> Eq for ActionGroup<A> {}
