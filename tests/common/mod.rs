//! Shared fixtures for the integration tests: an account-flavored action
//! set, a recording service, and reusable middleware.
#![allow(dead_code)]

use actionflow::{
    side_effect, Action, ActionGroup, DispatchError, Middleware, Rewrite, Service, ServiceResult,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountAction {
    Login { email: String, password: String },
    Logout,
    ResetPassword,
    FetchAccount,
    RegisterNewDevice { id: String },
    CloseAccount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountName {
    Login,
    Logout,
    ResetPassword,
    FetchAccount,
    RegisterNewDevice,
    CloseAccount,
}

impl Action for AccountAction {
    type Name = AccountName;

    fn name(&self) -> AccountName {
        match self {
            AccountAction::Login { .. } => AccountName::Login,
            AccountAction::Logout => AccountName::Logout,
            AccountAction::ResetPassword => AccountName::ResetPassword,
            AccountAction::FetchAccount => AccountName::FetchAccount,
            AccountAction::RegisterNewDevice { .. } => AccountName::RegisterNewDevice,
            AccountAction::CloseAccount => AccountName::CloseAccount,
        }
    }
}

pub fn login() -> AccountAction {
    AccountAction::Login {
        email: "user@example.com".into(),
        password: "secret".into(),
    }
}

pub fn register_device(id: &str) -> AccountAction {
    AccountAction::RegisterNewDevice { id: id.into() }
}

/// Records every action it processes, in order. Each processed action
/// produces one side effect that bumps `effects_done` when it lands;
/// effects can be delayed, or made to fail for one action name.
pub struct RecordingService {
    seen: Arc<Mutex<Vec<AccountAction>>>,
    pub effects_done: Arc<AtomicUsize>,
    effect_delay: Option<Duration>,
    fail_on: Option<AccountName>,
}

impl RecordingService {
    pub fn new() -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
            effects_done: Arc::new(AtomicUsize::new(0)),
            effect_delay: None,
            fail_on: None,
        }
    }

    pub fn with_effect_delay(mut self, delay: Duration) -> Self {
        self.effect_delay = Some(delay);
        self
    }

    pub fn failing_on(mut self, name: AccountName) -> Self {
        self.fail_on = Some(name);
        self
    }

    pub fn seen(&self) -> Vec<AccountAction> {
        self.seen.lock().unwrap().clone()
    }

    pub fn seen_names(&self) -> Vec<AccountName> {
        self.seen.lock().unwrap().iter().map(|a| a.name()).collect()
    }
}

#[async_trait]
impl Service<AccountAction> for RecordingService {
    async fn process(&self, action: &AccountAction) -> ServiceResult {
        self.seen.lock().unwrap().push(action.clone());
        let mut result = ServiceResult::none();
        if self.fail_on == Some(action.name()) {
            result.push(side_effect(async { Err("access denied".to_string()) }));
            return result;
        }
        let done = self.effects_done.clone();
        let delay = self.effect_delay;
        result.push(side_effect(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            done.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        result
    }
}

/// Poll `cond` every few milliseconds until it holds or `timeout_ms`
/// elapses; returns whether the condition was met.
pub async fn wait_until(mut cond: impl FnMut() -> bool, timeout_ms: u64) -> bool {
    let deadline = std::time::Instant::now() + Duration::from_millis(timeout_ms);
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    cond()
}

/// Postpones device registration until the account has been fetched.
pub struct DependencyMiddleware;

#[async_trait]
impl Middleware<AccountAction> for DependencyMiddleware {
    async fn pre(&self, action: &AccountAction) -> Result<Rewrite<AccountAction>, String> {
        match action {
            AccountAction::RegisterNewDevice { .. } => Ok(Rewrite::Postpone(ActionGroup::new(
                AccountName::FetchAccount,
            ))),
            _ => Ok(Rewrite::Pass),
        }
    }
}

/// Writes every hook invocation into a shared log so tests can assert
/// exact hook ordering across middleware.
pub struct TaggedMiddleware {
    pub tag: &'static str,
    pub log: Arc<Mutex<Vec<String>>>,
}

impl TaggedMiddleware {
    pub fn new(tag: &'static str, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self { tag, log }
    }
}

#[async_trait]
impl Middleware<AccountAction> for TaggedMiddleware {
    async fn pre(&self, action: &AccountAction) -> Result<Rewrite<AccountAction>, String> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:pre:{:?}", self.tag, action.name()));
        Ok(Rewrite::Pass)
    }

    async fn post(&self, action: &AccountAction) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:post:{:?}", self.tag, action.name()));
    }

    async fn failure(&self, action: &AccountAction, error: &DispatchError) {
        self.log.lock().unwrap().push(format!(
            "{}:failure:{:?}:{}",
            self.tag,
            action.name(),
            error.reason()
        ));
    }
}
