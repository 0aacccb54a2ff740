//! State-owning services, their reducers, and side-effect aggregation.

use crate::Action;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use tokio::task::JoinSet;

/// Deferred asynchronous work produced by a reducer, executed after all
/// reducers for an action have run. Domain-level failures surface here,
/// never as reducer panics.
pub type SideEffect = Pin<Box<dyn Future<Output = Result<(), String>> + Send + 'static>>;

/// Box a future into a [`SideEffect`].
pub fn side_effect<F>(fut: F) -> SideEffect
where
    F: Future<Output = Result<(), String>> + Send + 'static,
{
    Box::pin(fut)
}

/// Mutates a slice of state for an action and may emit one side effect.
///
/// Reducers are synchronous and must not block; all asynchronous work
/// belongs in the returned effect. A reducer with no interest in the
/// action returns `None`.
pub trait Reducer<S, A: Action>: Send + Sync {
    fn reduce(&self, state: &mut S, action: &A) -> Option<SideEffect>;
}

/// Function wrapper that implements [`Reducer`].
pub struct FnReducer<F>(pub F);

impl<S, A, F> Reducer<S, A> for FnReducer<F>
where
    A: Action,
    F: Fn(&mut S, &A) -> Option<SideEffect> + Send + Sync,
{
    fn reduce(&self, state: &mut S, action: &A) -> Option<SideEffect> {
        (self.0)(state, action)
    }
}

/// The side effects one service collected for one action.
///
/// Results from every service touched by an action are merged into one
/// aggregate and run together.
pub struct ServiceResult {
    effects: Vec<SideEffect>,
}

impl ServiceResult {
    /// A result with no side effects; running it is a no-op and skips
    /// scheduling entirely.
    pub fn none() -> Self {
        Self {
            effects: Vec::new(),
        }
    }

    pub fn from_effects(effects: Vec<SideEffect>) -> Self {
        Self { effects }
    }

    /// Add one effect to the result.
    pub fn push(&mut self, effect: SideEffect) {
        self.effects.push(effect);
    }

    /// Whether the result carries any side effects.
    pub fn has_side_effects(&self) -> bool {
        !self.effects.is_empty()
    }

    /// Merge the results of all services touched by one action.
    pub fn merge(results: impl IntoIterator<Item = ServiceResult>) -> Self {
        let mut merged = Self::none();
        for result in results {
            merged.effects.extend(result.effects);
        }
        merged
    }

    /// Launch every collected effect concurrently and wait for all of them.
    ///
    /// The aggregate completes only once every effect has finished. The
    /// first failure is surfaced after the drain; a failing effect never
    /// cancels its siblings.
    pub async fn run(self) -> Result<(), String> {
        if self.effects.is_empty() {
            return Ok(());
        }
        let mut set = JoinSet::new();
        for effect in self.effects {
            set.spawn(effect);
        }
        let mut first_err: Option<String> = None;
        while let Some(joined) = set.join_next().await {
            let outcome = match joined {
                Ok(res) => res,
                Err(e) => Err(format!("side effect task failed: {e}")),
            };
            if let Err(reason) = outcome {
                if first_err.is_none() {
                    first_err = Some(reason);
                }
            }
        }
        match first_err {
            None => Ok(()),
            Some(reason) => Err(reason),
        }
    }
}

/// A state-owning participant in the dispatcher's fan-out set.
///
/// All registered services process the same action concurrently; each
/// service's own state is only ever mutated from within its own
/// invocation.
#[async_trait]
pub trait Service<A: Action>: Send + Sync {
    /// Process one action and return the side effects it produced.
    async fn process(&self, action: &A) -> ServiceResult;
}

/// Service that owns one state slice and runs registered reducers over it
/// in registration order, each seeing the state as left by the previous
/// one.
pub struct StatefulService<S, A: Action> {
    state: Mutex<S>,
    reducers: Vec<Box<dyn Reducer<S, A>>>,
}

impl<S: Send + 'static, A: Action> StatefulService<S, A> {
    pub fn new(state: S) -> Self {
        Self {
            state: Mutex::new(state),
            reducers: Vec::new(),
        }
    }

    /// Append a reducer; builder-style.
    pub fn reducer(mut self, reducer: impl Reducer<S, A> + 'static) -> Self {
        self.reducers.push(Box::new(reducer));
        self
    }

    /// Append a closure reducer; builder-style.
    pub fn reduce_fn<F>(self, f: F) -> Self
    where
        F: Fn(&mut S, &A) -> Option<SideEffect> + Send + Sync + 'static,
    {
        self.reducer(FnReducer(f))
    }

    /// Clone the current state, for inspection.
    pub fn snapshot(&self) -> S
    where
        S: Clone,
    {
        self.state.lock().unwrap().clone()
    }
}

#[async_trait]
impl<S: Send + 'static, A: Action> Service<A> for StatefulService<S, A> {
    async fn process(&self, action: &A) -> ServiceResult {
        let mut effects = Vec::new();
        {
            // The critical section is synchronous and contains no await
            // points: an in-progress reduction always completes before
            // cooperative cancellation can take effect.
            let mut state = self.state.lock().unwrap();
            for reducer in &self.reducers {
                if let Some(effect) = reducer.reduce(&mut state, action) {
                    effects.push(effect);
                }
            }
        }
        ServiceResult::from_effects(effects)
    }
}
