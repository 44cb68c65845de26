//! The demo state machine.
//!
//! One `Orchestrator` owns the demo state and is its only writer. Every
//! operation commits inside one critical section of a std mutex that is
//! never held across an await; navigation, toasts and events go out after
//! the lock is released. Subscribers read through a `watch` snapshot and a
//! `broadcast` event stream.
//!
//! Auto-advance is debounced: a completion match records a
//! [`PendingAdvance`] ticket and a spawned task fires it after the delay,
//! but only if the step index and epoch are unchanged. Every manual
//! operation bumps the epoch, which cancels the ticket.

mod state;

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, watch};

use crate::backend::DemoBackend;
use crate::flow::FlowDefinition;
use crate::guard::{BlockReason, RequestGuard};
use crate::http::{HttpClient, HttpError};
use crate::interceptor::{build_demo_stack, ResponseSink};
use crate::navigator::Navigator;
use crate::notify::{Notifier, ToastLevel};
use crate::policy::PolicyTables;
use crate::role::Role;
use crate::screens::{Route, ScreenResolver};
use crate::vault::CredentialVault;

pub use state::{DemoEvent, DemoSnapshot, DemoState, PendingAdvance, StepTrigger, ORDER_ID_SLOT};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(600);
const EVENT_CAPACITY: usize = 64;

/// Collaborators the orchestrator drives but does not own the policy of.
#[derive(Clone)]
pub struct DemoServices {
    pub backend: Arc<dyn DemoBackend>,
    pub vault: CredentialVault,
    pub http: HttpClient,
    pub navigator: Arc<dyn Navigator>,
    pub notifier: Arc<dyn Notifier>,
}

struct Inner {
    flow: FlowDefinition,
    guard: Arc<RequestGuard>,
    screens: ScreenResolver,
    services: DemoServices,
    debounce: Duration,
    state: Mutex<DemoState>,
    snapshots: watch::Sender<DemoSnapshot>,
    events: broadcast::Sender<DemoEvent>,
}

/// Side effects of a committed step change, applied after unlocking.
struct Transition {
    index: usize,
    step_id: String,
    from: Role,
    to: Role,
    route: Option<Route>,
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(tables: PolicyTables, services: DemoServices, debounce: Duration) -> Self {
        let state = DemoState::default();
        let snapshot = state.snapshot(&tables.flow, services.vault.available_roles());
        let (snapshots, _) = watch::channel(snapshot);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                flow: tables.flow,
                guard: Arc::new(tables.guard),
                screens: tables.screens,
                services,
                debounce,
                state: Mutex::new(state),
                snapshots,
                events,
            }),
        }
    }

    pub fn flow(&self) -> &FlowDefinition {
        &self.inner.flow
    }

    pub fn guard(&self) -> &RequestGuard {
        &self.inner.guard
    }

    pub fn screens(&self) -> &ScreenResolver {
        &self.inner.screens
    }

    pub fn http(&self) -> &HttpClient {
        &self.inner.services.http
    }

    pub fn vault(&self) -> &CredentialVault {
        &self.inner.services.vault
    }

    pub fn subscribe(&self) -> watch::Receiver<DemoSnapshot> {
        self.inner.snapshots.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DemoEvent> {
        self.inner.events.subscribe()
    }

    pub fn snapshot(&self) -> DemoSnapshot {
        self.inner.snapshots.borrow().clone()
    }

    pub fn state(&self) -> DemoState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, DemoState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, state: &DemoState) {
        let snapshot = state.snapshot(&self.inner.flow, self.inner.services.vault.available_roles());
        self.inner.snapshots.send_replace(snapshot);
    }

    fn emit(&self, event: DemoEvent) {
        let _ = self.inner.events.send(event);
    }

    fn navigate(&self, route: Option<Route>) {
        if let Some(route) = route {
            self.inner.services.navigator.navigate(&route);
        }
    }

    /// Fetch every credential and, once all are present, activate the entry
    /// role and install the interceptor. Returns whether the demo is
    /// initialized afterwards.
    pub async fn initialize(&self) -> bool {
        let initialized = self.lock().initialized;
        if initialized {
            return true;
        }

        let services = &self.inner.services;
        let report = services.vault.fetch_all(services.backend.as_ref()).await;
        if !report.is_complete() {
            tracing::warn!(
                failed = ?report.failed.iter().map(|(role, _)| *role).collect::<Vec<_>>(),
                "demo initialization incomplete"
            );
            let state = self.lock();
            self.publish(&state);
            return false;
        }

        let available_roles = {
            let mut state = self.lock();
            if state.initialized {
                return true;
            }
            if let Err(err) = services.vault.inject_role(state.active_role) {
                tracing::warn!(role = %state.active_role, error = %err, "failed to inject entry credential");
            }
            state.initialized = true;
            if !state.interceptor_installed {
                state.interceptor_installed = self.install_interceptor();
            }
            self.publish(&state);
            services.vault.available_roles()
        };

        tracing::info!(roles = ?available_roles, "demo initialized");
        self.emit(DemoEvent::Initialized { available_roles });
        true
    }

    fn install_interceptor(&self) -> bool {
        let sink: Arc<dyn ResponseSink> = Arc::new(OrchestratorSink(Arc::downgrade(&self.inner)));
        let stack = build_demo_stack(
            Arc::clone(&self.inner.guard),
            Arc::clone(&self.inner.services.notifier),
            sink,
        );
        match self.inner.services.http.install(stack) {
            Ok(()) => true,
            Err(HttpError::AlreadyInstalled) => {
                tracing::warn!("http client already carries another stack; demo guard not installed");
                false
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install interceptor");
                false
            }
        }
    }

    /// Make `role` active. Refused without a credential, or while a running
    /// flow pins a different role. Re-selecting the active role changes nothing.
    pub fn switch_role(&self, role: Role) -> bool {
        let vault = &self.inner.services.vault;
        let Some(credential) = vault.get(role) else {
            tracing::debug!(%role, "switch refused: no credential");
            return false;
        };

        let from = {
            let mut state = self.lock();
            if state.initialized && state.active_role == role {
                tracing::debug!(%role, "role already active");
                return true;
            }
            if state.flow_started {
                if let Some(step) = self.inner.flow.step(state.current_step_index) {
                    if step.role != role {
                        tracing::warn!(%role, step = %step.id, "switch refused: flow step pins {}", step.role);
                        return false;
                    }
                }
            }
            if let Err(err) = vault.inject(&credential) {
                tracing::warn!(%role, error = %err, "switch refused: credential injection failed");
                return false;
            }
            let from = state.active_role;
            state.active_role = role;
            state.bump_epoch();
            self.publish(&state);
            from
        };

        tracing::info!(%from, to = %role, "role switched");
        self.navigate(self.inner.screens.home_for(role));
        if from != role {
            self.emit(DemoEvent::RoleSwitched { from, to: role });
        }
        true
    }

    /// Begin the guided flow at step 0. No-op while a flow is running.
    pub fn start_flow(&self) -> bool {
        let transition = {
            let mut state = self.lock();
            if state.flow_started {
                return false;
            }
            state.flow_started = true;
            state.captured.clear();
            state.bump_epoch();
            let transition = self.apply_transition(&mut state, 0);
            self.publish(&state);
            transition
        };

        self.emit(DemoEvent::FlowStarted);
        self.finish_transition(transition, StepTrigger::Manual);
        true
    }

    pub fn advance_flow(&self) -> bool {
        let transition = {
            let mut state = self.lock();
            let next = state.current_step_index + 1;
            if next >= self.inner.flow.len() {
                return false;
            }
            state.bump_epoch();
            let transition = self.apply_transition(&mut state, next);
            self.publish(&state);
            transition
        };

        self.finish_transition(transition, StepTrigger::Manual);
        true
    }

    /// Jump to `index`. Out-of-range indices change nothing.
    pub fn go_to_step(&self, index: usize) -> bool {
        if index >= self.inner.flow.len() {
            return false;
        }
        let transition = {
            let mut state = self.lock();
            state.bump_epoch();
            let transition = self.apply_transition(&mut state, index);
            self.publish(&state);
            transition
        };

        self.finish_transition(transition, StepTrigger::Manual);
        true
    }

    /// Commit `index` and its role. Caller holds the lock and has checked
    /// the bounds.
    fn apply_transition(&self, state: &mut DemoState, index: usize) -> Option<Transition> {
        let step = self.inner.flow.step(index)?;
        let from = state.active_role;
        let vault = &self.inner.services.vault;

        if step.role != from {
            match vault.get(step.role) {
                Some(credential) => match vault.inject(&credential) {
                    Ok(_) => state.active_role = step.role,
                    Err(err) => {
                        tracing::warn!(role = %step.role, error = %err, "credential injection failed; keeping current role")
                    }
                },
                None => tracing::warn!(
                    role = %step.role,
                    step = %step.id,
                    "no credential for step role; keeping current role"
                ),
            }
        }
        state.current_step_index = index;

        let role_changed = state.active_role != from;
        let route = self.inner.screens.resolve(&step.capability).or_else(|| {
            if role_changed {
                self.inner.screens.home_for(state.active_role)
            } else {
                None
            }
        });

        Some(Transition {
            index,
            step_id: step.id.clone(),
            from,
            to: state.active_role,
            route,
        })
    }

    fn finish_transition(&self, transition: Option<Transition>, trigger: StepTrigger) {
        let Some(transition) = transition else {
            return;
        };
        tracing::info!(
            index = transition.index,
            step = %transition.step_id,
            ?trigger,
            "step changed"
        );
        if transition.from != transition.to {
            self.emit(DemoEvent::RoleSwitched {
                from: transition.from,
                to: transition.to,
            });
        }
        self.navigate(transition.route);
        self.emit(DemoEvent::StepChanged {
            index: transition.index,
            step_id: transition.step_id,
            trigger,
        });
    }

    /// Restore the entry state. The backend reset is best-effort; local
    /// state is reset whether it succeeds or not.
    pub async fn reset_demo(&self) {
        {
            let mut state = self.lock();
            state.bump_epoch();
            self.publish(&state);
        }

        if let Err(err) = self.inner.services.backend.reset_demo_data().await {
            tracing::warn!(error = %err, "demo data reset failed");
            self.inner
                .services
                .notifier
                .toast(ToastLevel::Error, "Could not reset demo data");
        }

        let from = {
            let mut state = self.lock();
            state.clear_progress();
            let from = state.active_role;
            state.active_role = Role::Staff;
            let vault = &self.inner.services.vault;
            if vault.has(Role::Staff) {
                if let Err(err) = vault.inject_role(Role::Staff) {
                    tracing::warn!(error = %err, "failed to re-inject staff credential");
                }
            }
            self.publish(&state);
            from
        };

        tracing::info!("demo reset");
        self.navigate(Some(self.inner.screens.entry_route().clone()));
        if from != Role::Staff {
            self.emit(DemoEvent::RoleSwitched {
                from,
                to: Role::Staff,
            });
        }
        self.emit(DemoEvent::DemoReset);
    }

    /// Tear everything down: interceptor, stored credentials and state.
    pub fn exit_demo(&self) {
        let owns_stack = self.lock().interceptor_installed;
        if owns_stack {
            self.inner.services.http.uninstall();
        }
        if let Err(err) = self.inner.services.vault.clear() {
            tracing::warn!(error = %err, "failed to clear demo credentials");
        }
        {
            let mut state = self.lock();
            let epoch = state.epoch;
            *state = DemoState::default();
            state.epoch = epoch;
            state.bump_epoch();
            self.publish(&state);
        }
        tracing::info!("demo exited");
        self.emit(DemoEvent::DemoExited);
    }

    /// Match a successful API response against the current step's
    /// completion rule and schedule the advance on a match.
    pub fn notify_api_response(&self, method: &str, url: &str, body: &Value) {
        let (ticket, step_id, captured) = {
            let mut state = self.lock();
            if !state.flow_started {
                return;
            }
            let index = state.current_step_index;
            let Some(step) = self.inner.flow.step(index) else {
                return;
            };
            let Some(completion) = &step.completion else {
                return;
            };
            if !completion.accepts(method, body) {
                return;
            }
            if state.pending.is_some_and(|pending| pending.step_index == index) {
                tracing::debug!(step = %step.id, "advance already pending");
                return;
            }

            let captured = step.capture_from(body);
            state.captured.extend(captured.clone());
            let ticket = PendingAdvance {
                step_index: index,
                epoch: state.epoch,
            };
            state.pending = Some(ticket);
            self.publish(&state);
            (ticket, step.id.clone(), captured)
        };

        tracing::info!(step = %step_id, %method, %url, "step completed by api response");
        self.emit(DemoEvent::StepCompleted { step_id, captured });
        self.schedule(ticket);
    }

    fn schedule(&self, ticket: PendingAdvance) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime; dropping scheduled advance");
            let mut state = self.lock();
            if state.pending == Some(ticket) {
                state.pending = None;
                self.publish(&state);
            }
            return;
        };

        let this = self.clone();
        let delay = self.inner.debounce;
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            this.fire_pending(ticket);
        });
    }

    fn fire_pending(&self, ticket: PendingAdvance) {
        let transition = {
            let mut state = self.lock();
            if state.pending != Some(ticket) {
                tracing::debug!(step_index = ticket.step_index, "scheduled advance cancelled");
                return;
            }
            state.pending = None;
            let next = ticket.step_index + 1;
            let live = state.flow_started
                && state.current_step_index == ticket.step_index
                && state.epoch == ticket.epoch;
            if !live || next >= self.inner.flow.len() {
                self.publish(&state);
                return;
            }
            let transition = self.apply_transition(&mut state, next);
            self.publish(&state);
            transition
        };

        self.finish_transition(transition, StepTrigger::Auto);
    }

    fn record_blocked(&self, method: &str, path: &str, reason: &BlockReason) {
        self.emit(DemoEvent::RequestBlocked {
            method: method.to_string(),
            path: path.to_string(),
            reason: reason.to_string(),
        });
    }
}

/// Interceptor-side handle. Weak so the installed stack does not keep the
/// orchestrator alive.
struct OrchestratorSink(Weak<Inner>);

impl OrchestratorSink {
    fn orchestrator(&self) -> Option<Orchestrator> {
        self.0.upgrade().map(|inner| Orchestrator { inner })
    }
}

impl ResponseSink for OrchestratorSink {
    fn flow_active(&self) -> bool {
        self.orchestrator()
            .is_some_and(|orchestrator| orchestrator.lock().flow_started)
    }

    fn on_api_response(&self, method: &str, url: &str, body: Value) {
        if let Some(orchestrator) = self.orchestrator() {
            orchestrator.notify_api_response(method, url, &body);
        }
    }

    fn on_request_blocked(&self, method: &str, path: &str, reason: &BlockReason) {
        if let Some(orchestrator) = self.orchestrator() {
            orchestrator.record_blocked(method, path, reason);
        }
    }
}
