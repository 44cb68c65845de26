use std::path::Path;

use include_dir::{include_dir, Dir};
use serde::{Deserialize, Serialize};

use crate::flow::FlowDefinition;
use crate::guard::RequestGuard;
use crate::screens::ScreenResolver;

static POLICY_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/policy");

pub const FLOW_TABLE: &str = "flow.json";
pub const GUARD_TABLE: &str = "guard.json";
pub const SCREENS_TABLE: &str = "screens.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyErrorCode {
    MissingTable,
    InvalidJson,
    InvalidFlow,
    InvalidGuardRule,
    InvalidScreen,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyError {
    pub error: PolicyErrorCode,
    pub message: String,
}

impl PolicyError {
    pub(crate) fn new(error: PolicyErrorCode, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.error, self.message)
    }
}

impl std::error::Error for PolicyError {}

pub type PolicyResult<T> = Result<T, PolicyError>;

/// The three static tables that script a demo. Changing the demo means
/// editing these, not the engine.
#[derive(Debug, Clone)]
pub struct PolicyTables {
    pub flow: FlowDefinition,
    pub guard: RequestGuard,
    pub screens: ScreenResolver,
}

impl PolicyTables {
    pub fn builtin() -> PolicyResult<Self> {
        Self::from_reader(builtin_table)
    }

    /// Load tables from `dir`, falling back to the built-in copy for any
    /// table the directory does not provide.
    pub fn from_dir(dir: &Path) -> PolicyResult<Self> {
        Self::from_reader(|name| {
            let path = dir.join(name);
            if !path.exists() {
                return builtin_table(name);
            }
            std::fs::read_to_string(&path).map_err(|err| {
                PolicyError::new(
                    PolicyErrorCode::MissingTable,
                    format!("failed reading policy table '{}': {}", path.display(), err),
                )
            })
        })
    }

    pub fn load(policy_dir: Option<&Path>) -> PolicyResult<Self> {
        match policy_dir {
            Some(dir) => Self::from_dir(dir),
            None => Self::builtin(),
        }
    }

    fn from_reader(read: impl Fn(&str) -> PolicyResult<String>) -> PolicyResult<Self> {
        let flow = FlowDefinition::from_json_str(&read(FLOW_TABLE)?)?;
        let guard = RequestGuard::from_json_str(&read(GUARD_TABLE)?)?;
        let screens = ScreenResolver::from_json_str(&read(SCREENS_TABLE)?)?;

        for step in flow.steps() {
            if screens.resolve(&step.capability).is_none() {
                tracing::debug!(
                    step = %step.id,
                    capability = %step.capability,
                    "flow step capability has no screen; step will not navigate"
                );
            }
        }

        Ok(Self {
            flow,
            guard,
            screens,
        })
    }
}

fn builtin_table(name: &str) -> PolicyResult<String> {
    let file = POLICY_DIR.get_file(name).ok_or_else(|| {
        PolicyError::new(
            PolicyErrorCode::MissingTable,
            format!("built-in policy table '{}' is missing", name),
        )
    })?;
    file.contents_utf8().map(str::to_string).ok_or_else(|| {
        PolicyError::new(
            PolicyErrorCode::InvalidJson,
            format!("invalid utf-8 in built-in policy table '{}'", name),
        )
    })
}
