//! # Core Browse
//!
//! Client-side browse state: the canonical [`FilterState`], its navigable
//! location codec, input debouncing, multi-selection, and the
//! [`PaginatedQueryCoordinator`] that keeps the visible result set in step
//! with the latest request.
//!
//! ## Modules
//!
//! - `filter`: filter criteria and normalization
//! - `location`: [`FilterStateCodec`] and [`BrowseLocation`]
//! - `debounce`: [`Debouncer`] state machine and async [`DebounceGate`]
//! - `selection`: [`SelectionModel`] with click/range/toggle gestures
//! - `observe`: [`Observable`] values with drop-to-unsubscribe observers
//! - `search`: search endpoint contract and [`HttpSearchBackend`]
//! - `coordinator`: lineage-guarded query execution
//!
//! ## Example
//!
//! ```rust
//! use core_browse::{BrowseLocation, FilterState, FilterStateCodec, SortKey};
//!
//! let filter = FilterState::new().with_query("vampire").with_sort(SortKey::NameAsc);
//! let location = BrowseLocation::new(filter.clone()).with_page(2);
//!
//! let encoded = FilterStateCodec::encode(&location);
//! assert_eq!(encoded, "q=vampire&sort=name_asc&page=2");
//! assert_eq!(FilterStateCodec::decode(&encoded).filter, filter);
//! ```

pub mod coordinator;
pub mod debounce;
pub mod error;
pub mod filter;
pub mod location;
pub mod observe;
pub mod pagination;
pub mod search;
pub mod selection;

pub use coordinator::{PaginatedQueryCoordinator, QueryOutcome, QuerySnapshot};
pub use debounce::{DebounceGate, Debouncer};
pub use error::{BrowseError, Result};
pub use filter::{CapabilityFlags, FavoriteFilter, FilterState, SortKey, TagMatchMode};
pub use location::{BrowseLocation, FilterStateCodec};
pub use observe::{Observable, Subscription};
pub use pagination::PageRequest;
pub use search::{
    CatalogItem, HttpSearchBackend, ItemPatch, Provenance, QueryResult, SearchBackend,
    SearchParams,
};
pub use selection::{Modifiers, SelectionModel};
