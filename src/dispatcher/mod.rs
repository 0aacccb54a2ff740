//! The coordinator: owns the service/middleware registries, history, and
//! the parked and in-flight tables; drives the pipeline → fan-out →
//! side-effects cycle per action; enforces at-most-one-in-flight dispatch
//! per action name.

mod history;
mod pipeline;

use crate::middleware::Middleware;
use crate::service::{Service, ServiceResult};
use crate::{Action, ActionFlow, DispatchError};
use history::{History, ParkedTable};
use pipeline::Verdict;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tracing::{debug, warn};

/// How an awaited dispatch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every action in the flow ran through services and side effects.
    Completed,
    /// A middleware postponed the dispatch. It resumes once its dependency
    /// appears in history; the resumption is not observable by this caller
    /// (listen via middleware post hooks if needed).
    Parked,
    /// A later dispatch for the same action name cancelled this one before
    /// it finished.
    Superseded,
}

/// Selective clearing options for [`Dispatcher::reset`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Reset {
    pub history: bool,
    pub services: bool,
    pub middlewares: bool,
}

impl Reset {
    /// Clear only the completed-action history.
    pub fn history() -> Self {
        Self {
            history: true,
            ..Self::default()
        }
    }

    /// Clear everything the dispatcher owns.
    pub fn all() -> Self {
        Self {
            history: true,
            services: true,
            middlewares: true,
        }
    }
}

struct Flight {
    seq: u64,
    abort: AbortHandle,
}

struct Inner<A: Action> {
    services: Mutex<HashMap<String, Arc<dyn Service<A>>>>,
    middlewares: Mutex<Vec<Arc<dyn Middleware<A>>>>,
    history: Mutex<History<A::Name>>,
    parked: Mutex<ParkedTable<A>>,
    inflight: Mutex<HashMap<A::Name, Flight>>,
    seq: AtomicU64,
}

/// The dispatcher sends actions to all registered services and schedules
/// their side effects.
///
/// All mutable state lives behind the coordinator's own locks; services and
/// middleware observe actions, never each other. Cloning is cheap and
/// shares the same coordinator.
pub struct Dispatcher<A: Action> {
    inner: Arc<Inner<A>>,
}

impl<A: Action> Clone for Dispatcher<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A: Action> Default for Dispatcher<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Action> Dispatcher<A> {
    /// Create an empty dispatcher.
    ///
    /// Installs a default tracing subscriber if none is set (ok to call
    /// many times).
    pub fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .try_init();

        Self {
            inner: Arc::new(Inner {
                services: Mutex::new(HashMap::new()),
                middlewares: Mutex::new(Vec::new()),
                history: Mutex::new(History::new()),
                parked: Mutex::new(ParkedTable::new()),
                inflight: Mutex::new(HashMap::new()),
                seq: AtomicU64::new(0),
            }),
        }
    }

    /// Add a service to the fan-out set under `id`, replacing any previous
    /// service with the same id. Effective for the next dispatch, not one
    /// already in flight.
    pub async fn register_service(&self, id: impl Into<String>, service: Arc<dyn Service<A>>) {
        self.inner.services.lock().await.insert(id.into(), service);
    }

    /// Remove the service registered under `id`.
    pub async fn unregister_service(&self, id: impl AsRef<str>) {
        self.inner.services.lock().await.remove(id.as_ref());
    }

    /// Append a middleware to the pipeline. Order is significant: pre
    /// hooks run in registration order and the first rewrite wins.
    pub async fn register_middleware(&self, middleware: Arc<dyn Middleware<A>>) {
        self.inner.middlewares.lock().await.push(middleware);
    }

    /// Selectively clear history and/or the service and middleware
    /// registries.
    ///
    /// Purging history does not re-check or drop parked flows: a flow
    /// parked before the purge stays parked until its dependency reappears
    /// in the post-purge history.
    pub async fn reset(&self, reset: Reset) {
        if reset.history {
            self.inner.history.lock().await.purge();
        }
        if reset.services {
            self.inner.services.lock().await.clear();
        }
        if reset.middlewares {
            self.inner.middlewares.lock().await.clear();
        }
    }

    /// Dispatch an action or flow and wait for its full cycle: middleware
    /// pre hooks, concurrent service fan-out, concurrent side effects,
    /// then post hooks and history, action by action.
    ///
    /// A dispatch for an action name already in flight supersedes the
    /// prior one: the older task is cancelled cooperatively and its caller
    /// gets [`Outcome::Superseded`].
    pub async fn send(&self, flow: impl Into<ActionFlow<A>>) -> Result<Outcome, DispatchError> {
        let handle = self.inner.submit(flow.into()).await;
        match handle.await {
            Ok(result) => result,
            Err(join) if join.is_cancelled() => Ok(Outcome::Superseded),
            Err(join) => std::panic::resume_unwind(join.into_panic()),
        }
    }

    /// Abort the in-flight dispatch for an action name, if any.
    pub async fn cancel(&self, name: &A::Name) {
        if let Some(flight) = self.inner.inflight.lock().await.remove(name) {
            debug!(key = ?name, "cancelling in-flight dispatch");
            flight.abort.abort();
        }
    }

    /// Wait until no dispatch is in flight. Parked flows do not count;
    /// they hold no task while waiting.
    pub async fn drain(&self) {
        // poll with backoff
        let mut delay_ms: u64 = 1;
        loop {
            if self.inner.inflight.lock().await.is_empty() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            delay_ms = (delay_ms.saturating_mul(2)).min(20);
        }
    }

    /// Snapshot of completed action names since the last purge, oldest
    /// first.
    pub async fn history_snapshot(&self) -> Vec<A::Name> {
        self.inner.history.lock().await.entries().to_vec()
    }

    /// Number of history purges performed so far.
    pub async fn purge_count(&self) -> u64 {
        self.inner.history.lock().await.resets()
    }

    /// Number of flows currently parked on an unmet dependency.
    pub async fn parked_len(&self) -> usize {
        self.inner.parked.lock().await.len()
    }
}

impl<A: Action> Inner<A> {
    /// Spawn the drive task for a flow, superseding any in-flight dispatch
    /// keyed by the same first-action name. The in-flight lock is held
    /// across the spawn so registration cannot race the task's own
    /// cleanup.
    async fn submit(self: &Arc<Self>, flow: ActionFlow<A>) -> JoinHandle<Result<Outcome, DispatchError>> {
        let key = flow.first().name();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let mut inflight = self.inflight.lock().await;
        if let Some(prev) = inflight.get(&key) {
            debug!(key = ?key, "superseding in-flight dispatch");
            prev.abort.abort();
        }
        let this = self.clone();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let result = this.drive(&flow).await;
            this.clear_flight(&task_key, seq).await;
            result
        });
        inflight.insert(
            key,
            Flight {
                seq,
                abort: handle.abort_handle(),
            },
        );
        handle
    }

    /// Remove this task's in-flight entry unless a newer dispatch already
    /// replaced it.
    async fn clear_flight(&self, key: &A::Name, seq: u64) {
        let mut inflight = self.inflight.lock().await;
        if inflight.get(key).map(|flight| flight.seq) == Some(seq) {
            inflight.remove(key);
        }
    }

    /// Process every action of the flow in order: pipeline check, fan-out,
    /// side effects, post hooks, history. Stops at the first failure or
    /// unmet postponement.
    async fn drive(self: &Arc<Self>, flow: &ActionFlow<A>) -> Result<Outcome, DispatchError> {
        // Registry changes apply to the next dispatch, not this one: both
        // sets are pinned for the whole flow, which also keeps redirect
        // issuer indexes stable across spliced actions.
        let middlewares = self.middlewares.lock().await.clone();
        let services: Vec<Arc<dyn Service<A>>> =
            self.services.lock().await.values().cloned().collect();

        // Each queued action carries the index of the middleware to skip
        // when it was spliced in by that middleware's redirect.
        let mut queue: VecDeque<(A, Option<usize>)> =
            flow.actions().iter().cloned().map(|a| (a, None)).collect();

        while let Some((action, skip)) = queue.pop_front() {
            let verdict = match pipeline::pre_pass(&middlewares, &action, skip).await {
                Ok(verdict) => verdict,
                Err(error) => {
                    pipeline::failure_pass(&middlewares, &action, &error).await;
                    return Err(error);
                }
            };

            match verdict {
                Verdict::Redirected { issuer, flow: redirected } => {
                    debug!(from = ?action.name(), to = ?redirected.first().name(), "redirecting");
                    for spliced in redirected.actions().iter().rev() {
                        queue.push_front((spliced.clone(), Some(issuer)));
                    }
                    continue;
                }
                Verdict::Postponed(deps) => {
                    let satisfied = {
                        let history = self.history.lock().await;
                        history.satisfies_any(deps.names())
                    };
                    if !satisfied {
                        if deps.is_empty() {
                            warn!(
                                key = ?action.name(),
                                "postponed on an empty dependency group; will never resume on its own"
                            );
                        }
                        // Park the remainder of the dispatch, this action
                        // first.
                        let mut rest = ActionFlow::new(action.clone());
                        for (pending, _) in queue.drain(..) {
                            rest = rest.then(pending);
                        }
                        debug!(key = ?action.name(), deps = ?deps.names(), "parking flow");
                        self.parked.lock().await.park(action.name(), deps, rest);
                        return Ok(Outcome::Parked);
                    }
                    // Dependency already in history: the rewrite is
                    // consumed and the action goes straight to fan-out.
                }
                Verdict::Proceed => {}
            }

            if let Err(error) = self.fan_out(&services, &action).await {
                pipeline::failure_pass(&middlewares, &action, &error).await;
                return Err(error);
            }

            pipeline::post_pass(&middlewares, &action).await;
            self.history.lock().await.record(action.name());
            self.resume_parked().await;
        }

        Ok(Outcome::Completed)
    }

    /// Send the action to every service in the snapshot concurrently and
    /// run the merged side effects.
    async fn fan_out(&self, services: &[Arc<dyn Service<A>>], action: &A) -> Result<(), DispatchError> {
        if services.is_empty() {
            debug!(name = ?action.name(), "no services registered; nothing to fan out");
            return Ok(());
        }

        let mut fanout = JoinSet::new();
        for service in services {
            let service = service.clone();
            let action = action.clone();
            fanout.spawn(async move { service.process(&action).await });
        }
        let mut results = Vec::new();
        while let Some(joined) = fanout.join_next().await {
            match joined {
                Ok(result) => {
                    if result.has_side_effects() {
                        results.push(result);
                    }
                }
                Err(e) => {
                    return Err(DispatchError::side_effect(
                        &action.name(),
                        format!("service task failed: {e}"),
                    ));
                }
            }
        }

        ServiceResult::merge(results)
            .run()
            .await
            .map_err(|reason| DispatchError::side_effect(&action.name(), reason))
    }

    /// Re-submit every parked flow whose dependency set now intersects
    /// history. Resumed flows go back through the normal send path as
    /// fresh detached dispatches and may park again on a further
    /// dependency.
    fn resume_parked<'a>(self: &'a Arc<Self>) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let resumable = {
                let history = self.history.lock().await;
                self.parked.lock().await.resolve(&history)
            };
            for flow in resumable {
                debug!(key = ?flow.first().name(), "resuming parked flow");
                let _ = self.submit(flow).await;
            }
        })
    }
}
