//! Navigable Location Abstraction
//!
//! The host owns the user-visible location (a browser URL, a deep link, a
//! window title bar). The core reads it once at session start and replaces it
//! whenever browse state changes. Back/forward navigation flows the other way
//! and is reported to the core by the host.

use crate::error::Result;

/// Access to the host's navigable location.
///
/// Locations are exchanged as `application/x-www-form-urlencoded` query
/// strings without the leading `?`.
pub trait NavigationHost: Send + Sync {
    /// Query string currently shown by the host.
    fn current_location(&self) -> Result<String>;

    /// Replace the current location without adding a history entry.
    fn replace_location(&self, query: &str) -> Result<()>;
}
