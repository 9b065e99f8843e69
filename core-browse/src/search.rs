//! # Search Contract
//!
//! Request/response types of the catalog search endpoint and the
//! [`SearchBackend`] seam the coordinator queries through.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest};
use core_runtime::logging::redact_if_sensitive;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument};
use url::Url;

use crate::error::{BrowseError, Result};
use crate::filter::FilterState;
use crate::pagination::{total_pages, PageRequest};

/// Path of the search endpoint, relative to the base URL.
pub const SEARCH_PATH: &str = "/api/search";

/// Everything the backend needs to answer one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub filter: FilterState,
    pub page: PageRequest,
    /// Ask the backend to report lexical/semantic provenance
    pub with_provenance: bool,
}

impl SearchParams {
    pub fn new(filter: FilterState, page: PageRequest) -> Self {
        Self {
            filter,
            page,
            with_provenance: false,
        }
    }

    pub fn with_provenance(mut self, enabled: bool) -> Self {
        self.with_provenance = enabled;
        self
    }

    /// Query parameters in the backend's naming.
    ///
    /// Paging and sort are always sent; every other field only when set.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let filter = &self.filter;
        let mut pairs = vec![
            ("page", self.page.page.to_string()),
            ("limit", self.page.limit().to_string()),
            ("sort", filter.sort.as_str().to_string()),
        ];

        if !filter.query.is_empty() {
            pairs.push(("search", filter.query.clone()));
        }
        if !filter.include_tags.is_empty() {
            pairs.push(("tags", filter.include_tags.join(",")));
            pairs.push(("tagMatchMode", filter.tag_match.as_str().to_string()));
        }
        if !filter.exclude_tags.is_empty() {
            pairs.push(("excludeTags", filter.exclude_tags.join(",")));
        }
        if !filter.expression.is_empty() {
            pairs.push(("filter", filter.expression.clone()));
        }
        if filter.favorite != Default::default() {
            pairs.push(("favorite", filter.favorite.as_str().to_string()));
        }
        if let Some(source) = &filter.source {
            pairs.push(("source", source.clone()));
        }
        if filter.min_tokens > 0 {
            pairs.push(("minTokens", filter.min_tokens.to_string()));
        }

        let flags = &filter.flags;
        for (name, set) in [
            ("hasGallery", flags.has_gallery),
            ("hasLorebook", flags.has_lorebook),
            ("inExternalTool", flags.in_external_tool),
            ("followedOnly", flags.followed_only),
        ] {
            if set {
                pairs.push((name, "true".to_string()));
            }
        }

        if self.with_provenance {
            pairs.push(("withProvenance", "true".to_string()));
        }

        pairs
    }
}

/// One catalog entry. Fields the core does not model are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub token_count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub favorite: bool,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CatalogItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tags: Vec::new(),
            token_count: 0,
            favorite: false,
            source: None,
            extra: Map::new(),
        }
    }
}

/// Share of results contributed by each retrieval strategy.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(default)]
    pub lexical: f64,
    #[serde(default)]
    pub semantic: f64,
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub items: Vec<CatalogItem>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub provenance: Option<Provenance>,
}

impl QueryResult {
    pub fn ids(&self) -> Vec<String> {
        self.items.iter().map(|item| item.id.clone()).collect()
    }

    pub fn item(&self, id: &str) -> Option<&CatalogItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Narrow, keyed field update pushed by an action handler.
///
/// `None` leaves a field alone.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ItemPatch {
    pub id: String,
    pub name: Option<String>,
    pub tags: Option<Vec<String>>,
    pub favorite: Option<bool>,
    pub token_count: Option<u64>,
}

impl ItemPatch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn favorite(mut self, favorite: bool) -> Self {
        self.favorite = Some(favorite);
        self
    }

    pub fn token_count(mut self, token_count: u64) -> Self {
        self.token_count = Some(token_count);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.tags.is_none()
            && self.favorite.is_none()
            && self.token_count.is_none()
    }

    /// Writes the set fields into `item`. Returns `false` for another id.
    pub fn apply_to(&self, item: &mut CatalogItem) -> bool {
        if item.id != self.id {
            return false;
        }
        if let Some(name) = &self.name {
            item.name = name.clone();
        }
        if let Some(tags) = &self.tags {
            item.tags = tags.clone();
        }
        if let Some(favorite) = self.favorite {
            item.favorite = favorite;
        }
        if let Some(token_count) = self.token_count {
            item.token_count = token_count;
        }
        true
    }

    /// Applies to whichever item of `result` carries the same id.
    pub fn apply_to_result(&self, result: &mut QueryResult) -> bool {
        result
            .items
            .iter_mut()
            .find(|item| item.id == self.id)
            .map(|item| self.apply_to(item))
            .unwrap_or(false)
    }

    /// Folds a later patch for the same item into this one, field by field.
    pub fn merge(&mut self, newer: &ItemPatch) {
        if newer.name.is_some() {
            self.name = newer.name.clone();
        }
        if newer.tags.is_some() {
            self.tags = newer.tags.clone();
        }
        if newer.favorite.is_some() {
            self.favorite = newer.favorite;
        }
        if newer.token_count.is_some() {
            self.token_count = newer.token_count;
        }
    }
}

/// Search contract implemented over HTTP in production and by fakes in tests.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, params: &SearchParams) -> Result<QueryResult>;
}

/// [`SearchBackend`] over the host's [`HttpClient`].
pub struct HttpSearchBackend {
    http: Arc<dyn HttpClient>,
    base_url: String,
}

impl HttpSearchBackend {
    pub fn new(http: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn search_url(&self, params: &SearchParams) -> Result<String> {
        let endpoint = format!("{}{}", self.base_url, SEARCH_PATH);
        let url = Url::parse_with_params(&endpoint, params.to_query_pairs()).map_err(|e| {
            BrowseError::InvalidInput {
                field: "base_url".to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(url.into())
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    #[instrument(skip(self, params), fields(page = params.page.page))]
    async fn search(&self, params: &SearchParams) -> Result<QueryResult> {
        let url = self.search_url(params)?;
        debug!(
            search = %redact_if_sensitive("search", &params.filter.query),
            "Issuing catalog search"
        );

        let response = self
            .http
            .execute(HttpRequest::get(url))
            .await?
            .error_for_status()?;

        let mut result: QueryResult = response
            .json()
            .map_err(|e| BrowseError::InvalidResponse(e.to_string()))?;

        if result.total_pages == 0 && result.total > 0 {
            result.total_pages = total_pages(result.total, params.page.page_size);
        }

        debug!(
            total = result.total,
            items = result.items.len(),
            "Catalog search returned"
        );
        Ok(result)
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{CapabilityFlags, FavoriteFilter, SortKey, TagMatchMode};
    use bridge_traits::error::BridgeError;
    use bridge_traits::http::{HttpResponse, HttpStreamResponse};
    use bytes::Bytes;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        pub Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
            async fn execute_stream(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpStreamResponse>;
        }
    }

    fn json_response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn pairs(params: &SearchParams) -> HashMap<&'static str, String> {
        params.to_query_pairs().into_iter().collect()
    }

    #[test]
    fn test_default_params_only_send_paging_and_sort() {
        let params = SearchParams::new(FilterState::default(), PageRequest::new(1, 48));
        let pairs = pairs(&params);

        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs["page"], "1");
        assert_eq!(pairs["limit"], "48");
        assert_eq!(pairs["sort"], "date_desc");
    }

    #[test]
    fn test_structured_fields_map_to_dedicated_params() {
        let filter = FilterState::new()
            .with_query("vampire")
            .with_include_tags(["gothic"])
            .with_exclude_tags(["modern", "sci-fi"])
            .with_tag_match(TagMatchMode::All)
            .with_sort(SortKey::Relevance)
            .with_favorite(FavoriteFilter::NotFav)
            .with_source(Some("chub"))
            .with_min_tokens(200)
            .with_flags(CapabilityFlags {
                has_lorebook: true,
                followed_only: true,
                ..CapabilityFlags::default()
            })
            .with_expression("  tokens > 1000  ");
        let params = SearchParams::new(filter, PageRequest::new(3, 24)).with_provenance(true);
        let pairs = pairs(&params);

        assert_eq!(pairs["search"], "vampire");
        assert_eq!(pairs["tags"], "gothic");
        assert_eq!(pairs["tagMatchMode"], "all");
        assert_eq!(pairs["excludeTags"], "modern,sci-fi");
        assert_eq!(pairs["sort"], "relevance");
        assert_eq!(pairs["favorite"], "not_fav");
        assert_eq!(pairs["source"], "chub");
        assert_eq!(pairs["minTokens"], "200");
        assert_eq!(pairs["hasLorebook"], "true");
        assert_eq!(pairs["followedOnly"], "true");
        assert_eq!(pairs["filter"], "tokens > 1000");
        assert_eq!(pairs["withProvenance"], "true");
        assert!(!pairs.contains_key("hasGallery"));
        assert!(!pairs.contains_key("inExternalTool"));
    }

    #[test]
    fn test_item_accepts_numeric_id_and_keeps_unknown_fields() {
        let item: CatalogItem = serde_json::from_str(
            r#"{"id": 42, "name": "Mira", "tokenCount": null, "creator": "anon"}"#,
        )
        .unwrap();

        assert_eq!(item.id, "42");
        assert_eq!(item.name, "Mira");
        assert_eq!(item.token_count, 0);
        assert_eq!(item.extra["creator"], "anon");
    }

    #[test]
    fn test_patch_applies_only_set_fields() {
        let mut item = CatalogItem::new("1", "Old");
        item.tags = vec!["a".into()];

        let patch = ItemPatch::new("1").name("New").favorite(true);
        assert!(patch.apply_to(&mut item));
        assert_eq!(item.name, "New");
        assert!(item.favorite);
        assert_eq!(item.tags, vec!["a"]);

        assert!(!ItemPatch::new("2").name("x").apply_to(&mut item));
    }

    #[test]
    fn test_patch_merge_is_last_write_wins_per_field() {
        let mut patch = ItemPatch::new("1").name("A").favorite(true);
        patch.merge(&ItemPatch::new("1").name("B").token_count(10));

        assert_eq!(patch.name.as_deref(), Some("B"));
        assert_eq!(patch.favorite, Some(true));
        assert_eq!(patch.token_count, Some(10));
    }

    #[core_async::test]
    async fn test_http_backend_parses_response() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|request| {
                request.url.starts_with("http://localhost:5000/api/search?")
                    && request.url.contains("search=elf+queen")
                    && request.url.contains("page=2")
            })
            .times(1)
            .returning(|_| {
                Ok(json_response(
                    200,
                    r#"{"items":[{"id":"a","name":"Elf Queen","tags":["fantasy"],"tokenCount":900,"favorite":false,"source":"chub"}],"total":97,"provenance":{"lexical":0.25,"semantic":0.75}}"#,
                ))
            });

        let backend = HttpSearchBackend::new(Arc::new(http), "http://localhost:5000/");
        let params = SearchParams::new(
            FilterState::new().with_query("elf queen"),
            PageRequest::new(2, 48),
        );

        let result = backend.search(&params).await.unwrap();
        assert_eq!(result.ids(), vec!["a"]);
        assert_eq!(result.total, 97);
        assert_eq!(result.total_pages, 3);
        assert_eq!(
            result.provenance,
            Some(Provenance {
                lexical: 0.25,
                semantic: 0.75
            })
        );
    }

    #[core_async::test]
    async fn test_http_backend_surfaces_server_error() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .returning(|_| Ok(json_response(503, "index rebuilding")));

        let backend = HttpSearchBackend::new(Arc::new(http), "http://localhost:5000");
        let err = backend
            .search(&SearchParams::new(FilterState::default(), PageRequest::default()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BrowseError::Bridge(BridgeError::Http { status: 503, .. })
        ));
        assert!(!err.is_cancellation());
    }

    #[core_async::test]
    async fn test_http_backend_rejects_malformed_body() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .returning(|_| Ok(json_response(200, r#"{"results": []}"#)));

        let backend = HttpSearchBackend::new(Arc::new(http), "http://localhost:5000");
        let err = backend
            .search(&SearchParams::new(FilterState::default(), PageRequest::default()))
            .await
            .unwrap_err();

        assert!(matches!(err, BrowseError::InvalidResponse(_)));
    }
}
