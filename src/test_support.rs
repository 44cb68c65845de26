use std::collections::{HashSet, VecDeque};
use std::ffi::{OsStr, OsString};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::backend::{BackendError, BackendResult, DemoBackend, DemoToken};
use crate::http::{HttpError, HttpRequest, HttpResponse, Transport};
use crate::role::Role;

pub static ENV_LOCK: Mutex<()> = Mutex::new(());

/// RAII guard for temporarily setting/removing an environment variable in tests.
///
/// Pair usage with `ENV_LOCK`; the process environment is shared by every test.
pub struct ScopedEnvVar {
    key: String,
    old: Option<OsString>,
}

impl ScopedEnvVar {
    pub fn set(key: &str, value: impl AsRef<OsStr>) -> Self {
        let old = std::env::var_os(key);
        std::env::set_var(key, value);
        Self {
            key: key.to_string(),
            old,
        }
    }

    pub fn remove(key: &str) -> Self {
        let old = std::env::var_os(key);
        std::env::remove_var(key);
        Self {
            key: key.to_string(),
            old,
        }
    }
}

impl Drop for ScopedEnvVar {
    fn drop(&mut self) {
        match &self.old {
            Some(v) => std::env::set_var(&self.key, v),
            None => std::env::remove_var(&self.key),
        }
    }
}

/// Scripted demo backend: issues `tok-<role>` unless the role is set to fail.
#[derive(Default)]
pub struct FakeBackend {
    failing: HashSet<Role>,
    reset_fails: AtomicBool,
    token_requests: Mutex<Vec<Role>>,
    resets: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_role(mut self, role: Role) -> Self {
        self.failing.insert(role);
        self
    }

    pub fn set_reset_fails(&self, fails: bool) {
        self.reset_fails.store(fails, Ordering::SeqCst);
    }

    pub fn token_requests(&self) -> Vec<Role> {
        self.token_requests.lock().unwrap().clone()
    }

    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DemoBackend for FakeBackend {
    async fn fetch_demo_token(&self, role: Role) -> BackendResult<DemoToken> {
        self.token_requests.lock().unwrap().push(role);
        if self.failing.contains(&role) {
            return Err(BackendError::Status {
                status: 503,
                body: "demo unavailable".to_string(),
            });
        }
        Ok(DemoToken {
            access_token: format!("tok-{}", role),
            role,
            outlet_id: Some("outlet-demo".to_string()),
            display_name: Some(format!("Demo {}", role)),
            employee_id: None,
            session_id: Some("session-1".to_string()),
        })
    }

    async fn reset_demo_data(&self) -> BackendResult<()> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        if self.reset_fails.load(Ordering::SeqCst) {
            return Err(BackendError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

/// Transport that records requests and answers from a queue, falling back
/// to a fixed JSON 200.
pub struct StubTransport {
    fallback: Value,
    queued: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::ok(json!({}))
    }

    pub fn ok(fallback: Value) -> Self {
        Self {
            fallback,
            queued: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push_response(&self, response: HttpResponse) {
        self.queued.lock().unwrap().push_back(response);
    }

    pub fn push_json(&self, body: Value) {
        self.push_response(HttpResponse::json(200, &body));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.requests.lock().unwrap().push(request);
        let queued = self.queued.lock().unwrap().pop_front();
        Ok(queued.unwrap_or_else(|| HttpResponse::json(200, &self.fallback)))
    }
}
