use std::sync::Mutex;

use crate::screens::Route;

pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &Route);
}

/// Records every navigation; the last entry is the current screen.
#[derive(Debug, Default)]
pub struct HistoryNavigator {
    history: Mutex<Vec<Route>>,
}

impl HistoryNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<Route> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn current(&self) -> Option<Route> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .last()
            .cloned()
    }
}

impl Navigator for HistoryNavigator {
    fn navigate(&self, route: &Route) {
        tracing::info!(route = %route, "navigate");
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(route.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_is_last_navigation() {
        let navigator = HistoryNavigator::new();
        assert_eq!(navigator.current(), None);
        navigator.navigate(&Route::new("/demo/staff"));
        navigator.navigate(&Route::new("/demo/admin"));
        assert_eq!(navigator.current(), Some(Route::new("/demo/admin")));
        assert_eq!(navigator.history().len(), 2);
    }
}
