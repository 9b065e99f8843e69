//! In-memory navigable location for headless desktop hosts.

use std::sync::Mutex;

use bridge_traits::error::{BridgeError, Result};
use bridge_traits::navigation::NavigationHost;

/// Navigation host that keeps the location in memory.
///
/// Used by headless hosts and tests. Every replacement is recorded so callers
/// can assert on the write sequence.
#[derive(Debug, Default)]
pub struct InMemoryNavigation {
    state: Mutex<NavigationState>,
}

#[derive(Debug, Default)]
struct NavigationState {
    current: String,
    history: Vec<String>,
}

impl InMemoryNavigation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing location, e.g. a deep link.
    pub fn with_location(query: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(NavigationState {
                current: query.into(),
                history: Vec::new(),
            }),
        }
    }

    /// All locations written through [`NavigationHost::replace_location`], oldest first.
    pub fn history(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|state| state.history.clone())
            .unwrap_or_default()
    }
}

impl NavigationHost for InMemoryNavigation {
    fn current_location(&self) -> Result<String> {
        let state = self
            .state
            .lock()
            .map_err(|_| BridgeError::OperationFailed("navigation state poisoned".into()))?;
        Ok(state.current.clone())
    }

    fn replace_location(&self, query: &str) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| BridgeError::OperationFailed("navigation state poisoned".into()))?;
        state.current = query.to_string();
        state.history.push(query.to_string());
        Ok(())
    }
}
