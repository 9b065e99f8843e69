//! # Navigable Location
//!
//! Bidirectional mapping between [`FilterState`] (plus navigation position)
//! and a form-urlencoded query string. Encoding is canonical: parameters
//! appear in a fixed order and default-valued fields are omitted, so equal
//! states always produce identical strings. Decoding never fails; malformed
//! or unknown parameters fall back to defaults.

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::filter::{normalize_tags, CapabilityFlags, FilterState, TagMatchMode};

pub const PARAM_QUERY: &str = "q";
pub const PARAM_EXCLUDE: &str = "exclude";
pub const PARAM_TAG_MATCH: &str = "tagMatchMode";
pub const PARAM_SORT: &str = "sort";
pub const PARAM_FAVORITE: &str = "favorite";
pub const PARAM_SOURCE: &str = "source";
pub const PARAM_MIN_TOKENS: &str = "minTokens";
pub const PARAM_HAS_GALLERY: &str = "hasGallery";
pub const PARAM_HAS_LOREBOOK: &str = "hasLorebook";
pub const PARAM_IN_EXTERNAL_TOOL: &str = "inExternalTool";
pub const PARAM_FOLLOWED_ONLY: &str = "followedOnly";
pub const PARAM_INCLUDE_TAGS: &str = "includeTags";
pub const PARAM_ADVANCED_FILTER: &str = "advancedFilter";
pub const PARAM_PAGE: &str = "page";
pub const PARAM_ITEM: &str = "item";

/// Filter criteria plus navigation position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseLocation {
    pub filter: FilterState,
    /// 1-based page number
    pub page: u32,
    /// Item whose detail view is open
    pub item: Option<String>,
}

impl Default for BrowseLocation {
    fn default() -> Self {
        Self {
            filter: FilterState::default(),
            page: 1,
            item: None,
        }
    }
}

impl BrowseLocation {
    pub fn new(filter: FilterState) -> Self {
        Self {
            filter: filter.normalized(),
            ..Self::default()
        }
    }

    /// Replaces the filter. Any actual change resets the page to 1.
    pub fn with_filter(mut self, filter: FilterState) -> Self {
        let filter = filter.normalized();
        if filter != self.filter {
            self.filter = filter;
            self.page = 1;
        }
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn with_item(mut self, item: Option<impl Into<String>>) -> Self {
        self.item = item.map(Into::into).filter(|id: &String| !id.trim().is_empty());
        self
    }
}

/// Stateless codec between [`BrowseLocation`] and its query-string form.
pub struct FilterStateCodec;

impl FilterStateCodec {
    /// Encodes a location. The leading `?` is never emitted; an all-default
    /// location encodes to the empty string.
    pub fn encode(location: &BrowseLocation) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        let filter = &location.filter;

        if !filter.query.is_empty() {
            serializer.append_pair(PARAM_QUERY, &filter.query);
        }
        if !filter.exclude_tags.is_empty() {
            serializer.append_pair(PARAM_EXCLUDE, &filter.exclude_tags.join(","));
        }
        if filter.tag_match != TagMatchMode::default() {
            serializer.append_pair(PARAM_TAG_MATCH, filter.tag_match.as_str());
        }
        if filter.sort != Default::default() {
            serializer.append_pair(PARAM_SORT, filter.sort.as_str());
        }
        if filter.favorite != Default::default() {
            serializer.append_pair(PARAM_FAVORITE, filter.favorite.as_str());
        }
        if let Some(source) = &filter.source {
            serializer.append_pair(PARAM_SOURCE, source);
        }
        if filter.min_tokens > 0 {
            serializer.append_pair(PARAM_MIN_TOKENS, &filter.min_tokens.to_string());
        }

        let flags = &filter.flags;
        for (name, set) in [
            (PARAM_HAS_GALLERY, flags.has_gallery),
            (PARAM_HAS_LOREBOOK, flags.has_lorebook),
            (PARAM_IN_EXTERNAL_TOOL, flags.in_external_tool),
            (PARAM_FOLLOWED_ONLY, flags.followed_only),
        ] {
            if set {
                serializer.append_pair(name, "true");
            }
        }

        if !filter.include_tags.is_empty() {
            serializer.append_pair(PARAM_INCLUDE_TAGS, &filter.include_tags.join(","));
        }
        if !filter.expression.is_empty() {
            serializer.append_pair(PARAM_ADVANCED_FILTER, &filter.expression);
        }
        if location.page > 1 {
            serializer.append_pair(PARAM_PAGE, &location.page.to_string());
        }
        if let Some(item) = &location.item {
            serializer.append_pair(PARAM_ITEM, item);
        }

        serializer.finish()
    }

    /// Decodes a query string, with or without its leading `?`.
    pub fn decode(location: &str) -> BrowseLocation {
        let raw = location.trim();
        let raw = raw.strip_prefix('?').unwrap_or(raw);

        let mut filter = FilterState::default();
        let mut flags = CapabilityFlags::default();
        let mut page = 1;
        let mut item = None;

        // Later duplicates overwrite earlier ones.
        for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
            match key.as_ref() {
                PARAM_QUERY => filter.query = value.into_owned(),
                PARAM_EXCLUDE => filter.exclude_tags = normalize_tags(&[value.as_ref()]),
                PARAM_INCLUDE_TAGS => filter.include_tags = normalize_tags(&[value.as_ref()]),
                PARAM_TAG_MATCH => filter.tag_match = value.parse().unwrap_or_default(),
                PARAM_SORT => filter.sort = value.parse().unwrap_or_default(),
                PARAM_FAVORITE => filter.favorite = value.parse().unwrap_or_default(),
                PARAM_SOURCE => filter.source = Some(value.into_owned()),
                PARAM_MIN_TOKENS => filter.min_tokens = value.trim().parse().unwrap_or(0),
                PARAM_HAS_GALLERY => flags.has_gallery = parse_flag(&value),
                PARAM_HAS_LOREBOOK => flags.has_lorebook = parse_flag(&value),
                PARAM_IN_EXTERNAL_TOOL => flags.in_external_tool = parse_flag(&value),
                PARAM_FOLLOWED_ONLY => flags.followed_only = parse_flag(&value),
                PARAM_ADVANCED_FILTER => filter.expression = value.into_owned(),
                PARAM_PAGE => page = parse_page(&value),
                PARAM_ITEM => {
                    let id = value.trim();
                    item = (!id.is_empty()).then(|| id.to_string());
                }
                _ => {}
            }
        }

        filter.flags = flags;

        BrowseLocation {
            filter: filter.normalized(),
            page,
            item,
        }
    }

    pub fn encode_filter(filter: &FilterState) -> String {
        Self::encode(&BrowseLocation::new(filter.clone()))
    }

    pub fn decode_filter(location: &str) -> FilterState {
        Self::decode(location).filter
    }
}

fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

fn parse_page(value: &str) -> u32 {
    match value.trim().parse::<u32>() {
        Ok(page) if page >= 1 => page,
        _ => 1,
    }
}
