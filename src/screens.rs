use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::policy::{PolicyError, PolicyErrorCode, PolicyResult};
use crate::role::Role;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Route(String);

impl Route {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoScreen {
    pub id: String,
    pub role: Role,
    pub capabilities: Vec<String>,
    pub route: Route,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScreensTable {
    entry_route: Route,
    #[serde(default)]
    role_homes: BTreeMap<Role, Route>,
    #[serde(default)]
    screens: Vec<DemoScreen>,
}

#[derive(Debug, Clone)]
pub struct ScreenResolver {
    entry_route: Route,
    role_homes: BTreeMap<Role, Route>,
    screens: Vec<DemoScreen>,
}

impl ScreenResolver {
    pub fn new(
        entry_route: Route,
        role_homes: BTreeMap<Role, Route>,
        screens: Vec<DemoScreen>,
    ) -> PolicyResult<Self> {
        let routes = std::iter::once(&entry_route)
            .chain(role_homes.values())
            .chain(screens.iter().map(|s| &s.route));
        for route in routes {
            if !route.as_str().starts_with('/') {
                return Err(PolicyError::new(
                    PolicyErrorCode::InvalidScreen,
                    format!("route '{}' must start with '/'", route),
                ));
            }
        }
        if let Some(screen) = screens.iter().find(|s| s.id.trim().is_empty()) {
            return Err(PolicyError::new(
                PolicyErrorCode::InvalidScreen,
                format!("screen for route '{}' has no id", screen.route),
            ));
        }

        Ok(Self {
            entry_route,
            role_homes,
            screens,
        })
    }

    pub fn from_json_str(raw: &str) -> PolicyResult<Self> {
        let table = serde_json::from_str::<ScreensTable>(raw).map_err(|err| {
            PolicyError::new(
                PolicyErrorCode::InvalidJson,
                format!("invalid screens JSON: {}", err),
            )
        })?;
        Self::new(table.entry_route, table.role_homes, table.screens)
    }

    pub fn screen_for(&self, capability: &str) -> Option<&DemoScreen> {
        let capability = capability.trim();
        if capability.is_empty() {
            return None;
        }
        self.screens
            .iter()
            .find(|screen| screen.capabilities.iter().any(|c| c == capability))
    }

    /// `None` means the step has no navigation side effect.
    pub fn resolve(&self, capability: &str) -> Option<Route> {
        self.screen_for(capability).map(|screen| screen.route.clone())
    }

    pub fn home_for(&self, role: Role) -> Option<Route> {
        self.role_homes.get(&role).cloned()
    }

    pub fn entry_route(&self) -> &Route {
        &self.entry_route
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> ScreenResolver {
        ScreenResolver::from_json_str(
            r#"{
                "entryRoute": "/demo",
                "roleHomes": {"staff": "/demo/staff/orders"},
                "screens": [
                    {"id": "staff-orders", "role": "staff", "capabilities": ["view-orders", "create-order"], "route": "/demo/staff"},
                    {"id": "admin-dashboard", "role": "admin", "capabilities": ["view-analytics"], "route": "/demo/admin"}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn resolves_capabilities_to_routes() {
        let screens = resolver();
        assert_eq!(
            screens.resolve("create-order").map(|r| r.to_string()),
            Some("/demo/staff".to_string())
        );
        assert_eq!(
            screens.screen_for("view-analytics").map(|s| s.role),
            Some(Role::Admin)
        );
        assert_eq!(screens.resolve("export-data"), None);
        assert_eq!(screens.resolve("  "), None);
    }

    #[test]
    fn missing_role_home_is_none() {
        let screens = resolver();
        assert_eq!(
            screens.home_for(Role::Staff),
            Some(Route::new("/demo/staff/orders"))
        );
        assert_eq!(screens.home_for(Role::Customer), None);
    }

    #[test]
    fn relative_routes_are_rejected() {
        let err = ScreenResolver::from_json_str(r#"{"entryRoute": "demo"}"#).unwrap_err();
        assert_eq!(err.error, PolicyErrorCode::InvalidScreen);
    }
}
