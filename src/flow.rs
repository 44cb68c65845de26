use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::policy::{PolicyError, PolicyErrorCode, PolicyResult};
use crate::predicate::{extract_string, Predicate};
use crate::role::Role;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    /// HTTP methods whose responses may complete the step; empty means any.
    #[serde(default)]
    pub methods: Vec<String>,
    pub predicate: Predicate,
}

impl Completion {
    pub fn accepts(&self, method: &str, body: &Value) -> bool {
        let method_ok = self.methods.is_empty()
            || self
                .methods
                .iter()
                .any(|candidate| candidate.trim().eq_ignore_ascii_case(method.trim()));
        method_ok && self.predicate.matches(body)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowStep {
    pub id: String,
    pub role: Role,
    pub capability: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub target_action: String,
    #[serde(default)]
    pub completion: Option<Completion>,
    /// Captured-value slot name -> response field path.
    #[serde(default)]
    pub captures: BTreeMap<String, String>,
}

impl FlowStep {
    pub fn capture_from(&self, body: &Value) -> BTreeMap<String, String> {
        self.captures
            .iter()
            .filter_map(|(slot, path)| extract_string(body, path).map(|value| (slot.clone(), value)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowDefinition {
    steps: Vec<FlowStep>,
}

impl FlowDefinition {
    pub fn new(steps: Vec<FlowStep>) -> PolicyResult<Self> {
        if steps.is_empty() {
            return Err(PolicyError::new(
                PolicyErrorCode::InvalidFlow,
                "flow definition must contain at least one step",
            ));
        }

        let mut seen = HashSet::new();
        for step in &steps {
            let id = step.id.trim();
            if id.is_empty() {
                return Err(PolicyError::new(
                    PolicyErrorCode::InvalidFlow,
                    "flow step id cannot be empty",
                ));
            }
            if !seen.insert(id.to_string()) {
                return Err(PolicyError::new(
                    PolicyErrorCode::InvalidFlow,
                    format!("duplicate flow step id '{}'", id),
                ));
            }
            if step.capability.trim().is_empty() {
                return Err(PolicyError::new(
                    PolicyErrorCode::InvalidFlow,
                    format!("flow step '{}' has no capability", id),
                ));
            }
            if step.captures.iter().any(|(slot, path)| slot.trim().is_empty() || path.trim().is_empty()) {
                return Err(PolicyError::new(
                    PolicyErrorCode::InvalidFlow,
                    format!("flow step '{}' has a blank capture slot or path", id),
                ));
            }
            if let Some(completion) = &step.completion {
                if completion.predicate.fields().iter().any(|f| f.trim().is_empty()) {
                    return Err(PolicyError::new(
                        PolicyErrorCode::InvalidFlow,
                        format!("flow step '{}' predicate references a blank field", id),
                    ));
                }
            }
        }

        Ok(Self { steps })
    }

    pub fn from_json_str(raw: &str) -> PolicyResult<Self> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum FlowJson {
            Wrapped { steps: Vec<FlowStep> },
            Flat(Vec<FlowStep>),
        }

        let parsed = serde_json::from_str::<FlowJson>(raw).map_err(|err| {
            PolicyError::new(
                PolicyErrorCode::InvalidJson,
                format!("invalid flow JSON: {}", err),
            )
        })?;

        match parsed {
            FlowJson::Wrapped { steps } | FlowJson::Flat(steps) => Self::new(steps),
        }
    }

    pub fn steps(&self) -> &[FlowStep] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&FlowStep> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn position(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.id == step_id)
    }
}
