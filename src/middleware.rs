//! Interceptors consulted before and after every action dispatch.
//!
//! Middleware is used for:
//! 1) blocking, postponing, or redirecting an action before it reaches the
//!    services,
//! 2) handling all dispatch failures in one place,
//! 3) taking additional steps, like logging or asserting, after the
//!    services finished processing an action.

use crate::{Action, ActionFlow, ActionGroup, DispatchError};
use async_trait::async_trait;

/// A middleware's pre-dispatch decision for one action.
#[derive(Debug, Clone)]
pub enum Rewrite<A: Action> {
    /// Let the action continue untouched; the default.
    Pass,
    /// Replace the current action with a new flow before it reaches any
    /// service. The remainder of the original flow still follows the
    /// spliced actions. The issuing middleware's `pre` hook is skipped for
    /// every spliced action, so a middleware cannot redirect its own
    /// output forever; later middleware see the spliced actions normally.
    Redirect(ActionFlow<A>),
    /// Park the dispatch until any name in the group shows up in history.
    /// If the group is already satisfied, the action proceeds to the
    /// services immediately and the rewrite is consumed.
    Postpone(ActionGroup<A>),
}

/// An interceptor in the dispatcher's ordered pipeline.
///
/// `pre` hooks run in registration order; the first non-[`Rewrite::Pass`]
/// decision wins for that pass and the remaining `pre` hooks are skipped.
/// An entered hook always runs to completion. When using multiple
/// middleware it is best if each one only rewrites one kind of action.
#[async_trait]
pub trait Middleware<A: Action>: Send + Sync {
    /// Inspect an action before it reaches the services. An error aborts
    /// the dispatch and propagates to the `send` caller.
    async fn pre(&self, _action: &A) -> Result<Rewrite<A>, String> {
        Ok(Rewrite::Pass)
    }

    /// Called after all services and side effects finished for an action.
    async fn post(&self, _action: &A) {}

    /// Called when processing the action failed at any stage.
    async fn failure(&self, _action: &A, _error: &DispatchError) {}
}

/// Function wrapper implementing a pre-hook-only [`Middleware`].
pub struct PreMiddleware<F>(pub F);

#[async_trait]
impl<A, F> Middleware<A> for PreMiddleware<F>
where
    A: Action,
    F: Fn(&A) -> Result<Rewrite<A>, String> + Send + Sync,
{
    async fn pre(&self, action: &A) -> Result<Rewrite<A>, String> {
        (self.0)(action)
    }
}
