//! # Filter State
//!
//! The canonical, normalized record of every browse criterion. A
//! `FilterState` is always fully normalized: every constructor and `with_*`
//! method runs [`FilterState::normalized`], so two states that mean the same
//! search compare equal and encode to the same location.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BrowseError;

/// How included tags combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMatchMode {
    /// An item matches when it carries any included tag
    #[default]
    Any,
    /// An item matches only when it carries every included tag
    All,
}

impl TagMatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagMatchMode::Any => "any",
            TagMatchMode::All => "all",
        }
    }
}

impl FromStr for TagMatchMode {
    type Err = BrowseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "any" => Ok(TagMatchMode::Any),
            "all" => Ok(TagMatchMode::All),
            other => Err(BrowseError::InvalidInput {
                field: "tagMatchMode".to_string(),
                message: format!("unknown mode '{}'", other),
            }),
        }
    }
}

/// Result ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    DateDesc,
    DateAsc,
    NameAsc,
    NameDesc,
    TokensDesc,
    TokensAsc,
    Relevance,
    Random,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::DateDesc => "date_desc",
            SortKey::DateAsc => "date_asc",
            SortKey::NameAsc => "name_asc",
            SortKey::NameDesc => "name_desc",
            SortKey::TokensDesc => "tokens_desc",
            SortKey::TokensAsc => "tokens_asc",
            SortKey::Relevance => "relevance",
            SortKey::Random => "random",
        }
    }
}

impl FromStr for SortKey {
    type Err = BrowseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "date_desc" => Ok(SortKey::DateDesc),
            "date_asc" => Ok(SortKey::DateAsc),
            "name_asc" => Ok(SortKey::NameAsc),
            "name_desc" => Ok(SortKey::NameDesc),
            "tokens_desc" => Ok(SortKey::TokensDesc),
            "tokens_asc" => Ok(SortKey::TokensAsc),
            "relevance" => Ok(SortKey::Relevance),
            "random" => Ok(SortKey::Random),
            other => Err(BrowseError::InvalidInput {
                field: "sort".to_string(),
                message: format!("unknown sort key '{}'", other),
            }),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Favorite/visibility filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FavoriteFilter {
    #[default]
    All,
    Fav,
    NotFav,
}

impl FavoriteFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            FavoriteFilter::All => "all",
            FavoriteFilter::Fav => "fav",
            FavoriteFilter::NotFav => "not_fav",
        }
    }
}

impl FromStr for FavoriteFilter {
    type Err = BrowseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(FavoriteFilter::All),
            "fav" => Ok(FavoriteFilter::Fav),
            "not_fav" => Ok(FavoriteFilter::NotFav),
            other => Err(BrowseError::InvalidInput {
                field: "favorite".to_string(),
                message: format!("unknown favorite filter '{}'", other),
            }),
        }
    }
}

/// Boolean capability filters. `false` means "don't care".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CapabilityFlags {
    pub has_gallery: bool,
    pub has_lorebook: bool,
    pub in_external_tool: bool,
    pub followed_only: bool,
}

impl CapabilityFlags {
    pub fn any(&self) -> bool {
        self.has_gallery || self.has_lorebook || self.in_external_tool || self.followed_only
    }
}

/// Canonical browse criteria.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FilterState {
    /// Free-text query
    pub query: String,
    /// Tags an item must carry (combined per `tag_match`)
    pub include_tags: Vec<String>,
    /// Tags an item must not carry
    pub exclude_tags: Vec<String>,
    pub tag_match: TagMatchMode,
    pub sort: SortKey,
    pub favorite: FavoriteFilter,
    /// Restrict to one sync source; `None` means every source
    pub source: Option<String>,
    /// Minimum token count; 0 disables the threshold
    pub min_tokens: u32,
    pub flags: CapabilityFlags,
    /// Raw power-user filter expression, passed through to the backend
    pub expression: String,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the canonical form of this state.
    ///
    /// - query and expression are trimmed
    /// - tag entries are split on commas, trimmed, emptied entries dropped
    ///   and duplicates removed keeping the first occurrence
    /// - a source of `all` (any case) or blank becomes `None`
    pub fn normalized(mut self) -> Self {
        self.query = self.query.trim().to_string();
        self.expression = self.expression.trim().to_string();
        self.include_tags = normalize_tags(&self.include_tags);
        self.exclude_tags = normalize_tags(&self.exclude_tags);
        self.source = normalize_source(self.source.as_deref());
        self
    }

    /// `true` when every field is at its default value.
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self.normalized()
    }

    pub fn with_include_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_tags = tags.into_iter().map(Into::into).collect();
        self.normalized()
    }

    pub fn with_exclude_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_tags = tags.into_iter().map(Into::into).collect();
        self.normalized()
    }

    pub fn with_tag_match(mut self, mode: TagMatchMode) -> Self {
        self.tag_match = mode;
        self
    }

    pub fn with_sort(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_favorite(mut self, favorite: FavoriteFilter) -> Self {
        self.favorite = favorite;
        self
    }

    pub fn with_source(mut self, source: Option<impl Into<String>>) -> Self {
        self.source = source.map(Into::into);
        self.normalized()
    }

    pub fn with_min_tokens(mut self, min_tokens: u32) -> Self {
        self.min_tokens = min_tokens;
        self
    }

    pub fn with_flags(mut self, flags: CapabilityFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = expression.into();
        self.normalized()
    }
}

/// Splits, trims and de-duplicates tag entries, preserving first-seen order.
pub fn normalize_tags<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for entry in raw {
        for tag in entry.as_ref().split(',') {
            let tag = tag.trim();
            if !tag.is_empty() && !out.iter().any(|existing| existing == tag) {
                out.push(tag.to_string());
            }
        }
    }
    out
}

fn normalize_source(raw: Option<&str>) -> Option<String> {
    let source = raw?.trim();
    if source.is_empty() || source.eq_ignore_ascii_case("all") {
        None
    } else {
        Some(source.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_default() {
        assert!(FilterState::new().is_default());
        assert!(!FilterState::new().with_query("elf").is_default());
    }

    #[test]
    fn test_query_and_expression_are_trimmed() {
        let state = FilterState::new()
            .with_query("  vampire  ")
            .with_expression("\ttokens > 1000 \n");

        assert_eq!(state.query, "vampire");
        assert_eq!(state.expression, "tokens > 1000");
    }

    #[test]
    fn test_tags_are_split_trimmed_and_deduplicated() {
        let state = FilterState::new().with_include_tags(["fantasy, elf", " elf ", "", "sci-fi,,"]);
        assert_eq!(state.include_tags, vec!["fantasy", "elf", "sci-fi"]);
    }

    #[test]
    fn test_tag_dedup_is_case_sensitive() {
        assert_eq!(normalize_tags(&["Elf,elf"]), vec!["Elf", "elf"]);
    }

    #[test]
    fn test_source_all_means_none() {
        assert_eq!(FilterState::new().with_source(Some("all")).source, None);
        assert_eq!(FilterState::new().with_source(Some("ALL")).source, None);
        assert_eq!(FilterState::new().with_source(Some("  ")).source, None);
        assert_eq!(
            FilterState::new().with_source(Some(" chub ")).source,
            Some("chub".to_string())
        );
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let state = FilterState {
            query: " a ".into(),
            include_tags: vec!["x, y".into(), "x".into()],
            source: Some("All".into()),
            ..FilterState::default()
        }
        .normalized();

        assert_eq!(state.clone().normalized(), state);
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("tokens_desc".parse::<SortKey>().unwrap(), SortKey::TokensDesc);
        assert_eq!("ALL".parse::<TagMatchMode>().unwrap(), TagMatchMode::All);
        assert_eq!("not_fav".parse::<FavoriteFilter>().unwrap(), FavoriteFilter::NotFav);
        assert!("newest".parse::<SortKey>().is_err());
    }

    #[test]
    fn test_enum_round_trip_through_str() {
        for sort in [
            SortKey::DateDesc,
            SortKey::DateAsc,
            SortKey::NameAsc,
            SortKey::NameDesc,
            SortKey::TokensDesc,
            SortKey::TokensAsc,
            SortKey::Relevance,
            SortKey::Random,
        ] {
            assert_eq!(sort.as_str().parse::<SortKey>().unwrap(), sort);
        }
    }

    #[test]
    fn test_capability_flags_any() {
        assert!(!CapabilityFlags::default().any());
        assert!(CapabilityFlags {
            followed_only: true,
            ..CapabilityFlags::default()
        }
        .any());
    }
}
