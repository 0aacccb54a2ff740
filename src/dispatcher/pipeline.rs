//! The middleware pre-hook pass and the post/failure hook runners.

use crate::middleware::{Middleware, Rewrite};
use crate::{Action, ActionFlow, ActionGroup, DispatchError};
use std::sync::Arc;

/// What one pipeline pass decided for one action.
pub(crate) enum Verdict<A: Action> {
    /// No middleware rewrote the action; continue to fan-out.
    Proceed,
    /// Replace the current action with `flow`. `issuer` is the index of
    /// the middleware whose `pre` hook must be skipped for the spliced
    /// actions.
    Redirected { issuer: usize, flow: ActionFlow<A> },
    /// Park the remainder of the dispatch until the group is satisfied.
    Postponed(ActionGroup<A>),
}

/// Run every middleware's `pre` hook in registration order, stopping at
/// the first non-`Pass` rewrite. `skip` names the middleware whose
/// redirect produced this action, if any; an entered hook always runs to
/// completion.
pub(crate) async fn pre_pass<A: Action>(
    middlewares: &[Arc<dyn Middleware<A>>],
    action: &A,
    skip: Option<usize>,
) -> Result<Verdict<A>, DispatchError> {
    for (index, middleware) in middlewares.iter().enumerate() {
        if skip == Some(index) {
            continue;
        }
        let rewrite = middleware
            .pre(action)
            .await
            .map_err(|reason| DispatchError::middleware(&action.name(), reason))?;
        match rewrite {
            Rewrite::Pass => {}
            Rewrite::Redirect(flow) => {
                return Ok(Verdict::Redirected {
                    issuer: index,
                    flow,
                })
            }
            Rewrite::Postpone(group) => return Ok(Verdict::Postponed(group)),
        }
    }
    Ok(Verdict::Proceed)
}

/// Fire every `post` hook in registration order.
pub(crate) async fn post_pass<A: Action>(middlewares: &[Arc<dyn Middleware<A>>], action: &A) {
    for middleware in middlewares {
        middleware.post(action).await;
    }
}

/// Fire every `failure` hook in registration order.
pub(crate) async fn failure_pass<A: Action>(
    middlewares: &[Arc<dyn Middleware<A>>],
    action: &A,
    error: &DispatchError,
) {
    for middleware in middlewares {
        middleware.failure(action, error).await;
    }
}
