use std::collections::HashSet;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::policy::{PolicyError, PolicyErrorCode, PolicyResult};

/// Why the guard rejected a call. Shown once to the user as a toast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockReason(pub String);

impl BlockReason {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardRule {
    pub method: String,
    /// Path glob: `*` stays within one segment, `**` crosses segments.
    pub url_pattern: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardTable {
    #[serde(default)]
    pub rules: Vec<GuardRule>,
    #[serde(default)]
    pub disabled_actions: Vec<String>,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    method: String,
    pattern: Regex,
    message: String,
}

#[derive(Debug, Clone, Default)]
pub struct RequestGuard {
    rules: Vec<CompiledRule>,
    disabled_actions: HashSet<String>,
}

impl RequestGuard {
    pub fn new(table: GuardTable) -> PolicyResult<Self> {
        let mut rules = Vec::with_capacity(table.rules.len());
        for rule in table.rules {
            let method = rule.method.trim().to_ascii_uppercase();
            if method.is_empty() {
                return Err(PolicyError::new(
                    PolicyErrorCode::InvalidGuardRule,
                    "guard rule method cannot be empty",
                ));
            }
            if rule.message.trim().is_empty() {
                return Err(PolicyError::new(
                    PolicyErrorCode::InvalidGuardRule,
                    format!("guard rule for '{}' needs a message", rule.url_pattern),
                ));
            }
            rules.push(CompiledRule {
                method,
                pattern: compile_path_glob(&rule.url_pattern)?,
                message: rule.message.trim().to_string(),
            });
        }

        let disabled_actions = table
            .disabled_actions
            .into_iter()
            .map(|action| action.trim().to_string())
            .filter(|action| !action.is_empty())
            .collect();

        Ok(Self {
            rules,
            disabled_actions,
        })
    }

    pub fn from_json_str(raw: &str) -> PolicyResult<Self> {
        let table = serde_json::from_str::<GuardTable>(raw).map_err(|err| {
            PolicyError::new(
                PolicyErrorCode::InvalidJson,
                format!("invalid guard JSON: {}", err),
            )
        })?;
        Self::new(table)
    }

    /// Pure and deterministic: first matching rule wins.
    pub fn evaluate(&self, method: &str, url: &str) -> Option<BlockReason> {
        let method = method.trim().to_ascii_uppercase();
        let path = request_path(url);
        self.rules
            .iter()
            .find(|rule| rule.method == method && rule.pattern.is_match(&path))
            .map(|rule| BlockReason(rule.message.clone()))
    }

    pub fn is_action_disabled(&self, action: &str) -> bool {
        self.disabled_actions.contains(action.trim())
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

fn compile_path_glob(glob: &str) -> PolicyResult<Regex> {
    let glob = glob.trim();
    if !glob.starts_with('/') {
        return Err(PolicyError::new(
            PolicyErrorCode::InvalidGuardRule,
            format!("guard urlPattern '{}' must start with '/'", glob),
        ));
    }

    // Rules apply under any base path the API is mounted at.
    let mut expr = String::from("^(?:/.*)?");
    let mut chars = glob.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '*' {
            if chars.peek() == Some(&'*') {
                chars.next();
                expr.push_str(".*");
            } else {
                expr.push_str("[^/]*");
            }
        } else {
            expr.push_str(&regex::escape(&ch.to_string()));
        }
    }
    expr.push('$');

    Regex::new(&expr).map_err(|err| {
        PolicyError::new(
            PolicyErrorCode::InvalidGuardRule,
            format!("guard urlPattern '{}' does not compile: {}", glob, err),
        )
    })
}

/// The path the guard matches against: absolute URLs are parsed, relative
/// ones lose their query and fragment.
pub fn request_path(url: &str) -> String {
    let trimmed = url.trim();
    if let Ok(parsed) = reqwest::Url::parse(trimmed) {
        return parsed.path().to_string();
    }
    let end = trimmed
        .find(|c: char| c == '?' || c == '#')
        .unwrap_or(trimmed.len());
    let path = &trimmed[..end];
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
