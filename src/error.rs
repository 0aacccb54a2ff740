use std::fmt::Debug;
use thiserror::Error;

/// Failures surfaced to the caller of [`Dispatcher::send`](crate::Dispatcher::send).
///
/// Middleware refusals and side-effect failures propagate identically: the
/// remaining actions of the flow are abandoned, every registered
/// middleware's failure hook runs, then the error is returned. History is
/// never updated for a failed action, and other in-flight dispatches are
/// unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// A middleware pre-hook failed while inspecting the action.
    #[error("middleware rejected `{action}`: {reason}")]
    Middleware { action: String, reason: String },
    /// A side effect produced for the action failed.
    #[error("side effect of `{action}` failed: {reason}")]
    SideEffect { action: String, reason: String },
}

impl DispatchError {
    pub(crate) fn middleware<N: Debug>(name: &N, reason: String) -> Self {
        Self::Middleware {
            action: format!("{name:?}"),
            reason,
        }
    }

    pub(crate) fn side_effect<N: Debug>(name: &N, reason: String) -> Self {
        Self::SideEffect {
            action: format!("{name:?}"),
            reason,
        }
    }

    /// The failure reason without the action context.
    pub fn reason(&self) -> &str {
        match self {
            Self::Middleware { reason, .. } | Self::SideEffect { reason, .. } => reason,
        }
    }
}
