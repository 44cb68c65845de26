use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::flow::FlowDefinition;
use crate::role::Role;

pub const ORDER_ID_SLOT: &str = "orderId";

/// A scheduled auto-advance, valid only while the step index and epoch
/// it was taken at are still current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAdvance {
    pub step_index: usize,
    pub epoch: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemoState {
    pub initialized: bool,
    pub active_role: Role,
    pub current_step_index: usize,
    pub flow_started: bool,
    pub captured: BTreeMap<String, String>,
    pub epoch: u64,
    pub pending: Option<PendingAdvance>,
    pub interceptor_installed: bool,
}

impl DemoState {
    pub fn order_id(&self) -> Option<&str> {
        self.captured.get(ORDER_ID_SLOT).map(String::as_str)
    }

    /// Invalidate any scheduled auto-advance.
    pub(crate) fn bump_epoch(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        self.pending = None;
    }

    pub(crate) fn clear_progress(&mut self) {
        self.flow_started = false;
        self.current_step_index = 0;
        self.captured.clear();
        self.bump_epoch();
    }

    pub fn snapshot(&self, flow: &FlowDefinition, available_roles: Vec<Role>) -> DemoSnapshot {
        let total_steps = flow.len();
        let progress_percent = if self.flow_started && total_steps > 0 {
            (((self.current_step_index + 1) * 100) / total_steps).min(100) as u32
        } else {
            0
        };
        DemoSnapshot {
            initialized: self.initialized,
            active_role: self.active_role,
            current_step_index: self.current_step_index,
            current_step_id: flow
                .step(self.current_step_index)
                .map(|step| step.id.clone()),
            total_steps,
            progress_percent,
            flow_started: self.flow_started,
            captured: self.captured.clone(),
            pending_advance: self.pending,
            interceptor_installed: self.interceptor_installed,
            available_roles,
        }
    }
}

/// Read-only projection published to subscribers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoSnapshot {
    pub initialized: bool,
    pub active_role: Role,
    pub current_step_index: usize,
    pub current_step_id: Option<String>,
    pub total_steps: usize,
    pub progress_percent: u32,
    pub flow_started: bool,
    pub captured: BTreeMap<String, String>,
    pub pending_advance: Option<PendingAdvance>,
    pub interceptor_installed: bool,
    pub available_roles: Vec<Role>,
}

impl DemoSnapshot {
    pub fn order_id(&self) -> Option<&str> {
        self.captured.get(ORDER_ID_SLOT).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepTrigger {
    Manual,
    Auto,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DemoEvent {
    Initialized {
        available_roles: Vec<Role>,
    },
    RoleSwitched {
        from: Role,
        to: Role,
    },
    FlowStarted,
    StepChanged {
        index: usize,
        step_id: String,
        trigger: StepTrigger,
    },
    StepCompleted {
        step_id: String,
        captured: BTreeMap<String, String>,
    },
    DemoReset,
    DemoExited,
    RequestBlocked {
        method: String,
        path: String,
        reason: String,
    },
}
