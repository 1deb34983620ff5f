//! The generic resource-store pattern.
//!
//! One [`ResourceStore`] instance owns the cached list, pagination, and
//! mutation methods for a single domain (categories, tags, albums). The
//! domains differ only in their entity/form types and base path, declared
//! through [`ResourceDomain`]; everything else - cache-hit logic, param
//! merging, optimistic patches, the uniform failure shape - lives here
//! once.
//!
//! # Concurrency
//!
//! Cache mutations are synchronous under a `parking_lot` lock and never
//! span an await point. Overlapping fetches are not cancelled; instead
//! every list/search dispatch takes a monotonically increasing generation
//! number and a completion whose generation is stale (a newer fetch was
//! issued meanwhile) leaves the cache untouched.

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use vellum_core::envelope::{ApiEnvelope, Failure, ListData, Pagination};
use vellum_core::pipeline::ApiClient;
use vellum_core::validate::{Issues, Validate, ValidationError, validate_request, validate_response};

/// Sort direction accepted by list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Publication status shared by the content domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    Active,
    Inactive,
}

/// Query parameters for list endpoints.
///
/// Fields left `None` are filled from the store's current params, so
/// callers only spell out what changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortOrder>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
}

impl ListParams {
    /// The params every store starts from: newest first by id.
    pub fn initial() -> Self {
        Self {
            sort: Some(SortOrder::Desc),
            order_by: Some("id".to_string()),
            ..Self::default()
        }
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    /// Overlay `other` onto `self`; explicit fields win.
    fn merge_from(&mut self, other: &ListParams) {
        if other.page.is_some() {
            self.page = other.page;
        }
        if other.page_size.is_some() {
            self.page_size = other.page_size;
        }
        if other.keyword.is_some() {
            self.keyword = other.keyword.clone();
        }
        if other.sort.is_some() {
            self.sort = other.sort;
        }
        if other.order_by.is_some() {
            self.order_by = other.order_by.clone();
        }
    }

    /// Fill paging defaults and clamp both to at least 1.
    fn clamped(&self) -> Self {
        let mut params = self.clone();
        params.page = Some(params.page.unwrap_or(1).max(1));
        params.page_size = Some(params.page_size.unwrap_or(10).max(1));
        params
    }

    /// The first-page params a refreshing search resets to.
    fn first_page() -> Self {
        Self::default().page(1).page_size(10)
    }
}

impl Validate for ListParams {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Issues::new();
        if let Some(page) = self.page {
            issues.ensure(page >= 1, "page must be at least 1");
        }
        if let Some(page_size) = self.page_size {
            issues.ensure(page_size >= 1, "pageSize must be at least 1");
            issues.ensure(page_size <= 1000, "pageSize must be at most 1000");
        }
        if let Some(keyword) = &self.keyword {
            issues.ensure(keyword.chars().count() <= 50, "keyword must be at most 50 characters");
        }
        if let Some(order_by) = &self.order_by {
            issues.ensure(
                !order_by.is_empty()
                    && order_by
                        .chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'),
                "orderBy must be a snake_case field name",
            );
        }
        issues.finish()
    }
}

/// An id/name pair as returned by the unpaginated listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: u64,
    pub name: String,
}

impl Validate for EntityRef {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Issues::new();
        issues.ensure(self.id >= 1, "id must be positive");
        issues.ensure(!self.name.is_empty(), "name must not be empty");
        issues.finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RefListData {
    list: Vec<EntityRef>,
}

impl Validate for RefListData {
    fn validate(&self) -> Result<(), ValidationError> {
        for item in &self.list {
            item.validate()?;
        }
        Ok(())
    }
}

/// A cached record addressable by id.
pub trait Entity {
    fn id(&self) -> u64;
    fn name(&self) -> &str;
}

/// Static description of one resource domain.
///
/// Implementations are zero-sized markers; see the category, tag, and
/// album modules.
pub trait ResourceDomain: Send + Sync + 'static {
    type Entity: Entity + Validate + Clone + Serialize + DeserializeOwned + Send + Sync + 'static;
    type CreateForm: Validate + Serialize + Send + Sync;
    type UpdateForm: Validate + Serialize + Send + Sync;
    type SearchForm: Validate + Serialize + Clone + Send + Sync;

    /// Path the endpoint set hangs off, e.g. `/category`.
    const BASE_PATH: &'static str;

    /// Human label for log lines.
    const LABEL: &'static str;

    /// The id of the entity an update form addresses.
    fn update_id(form: &Self::UpdateForm) -> u64;

    /// Merge an update form's fields into a cached entity.
    fn apply_update(entity: &mut Self::Entity, form: &Self::UpdateForm);
}

struct StoreState<D: ResourceDomain> {
    items: Vec<D::Entity>,
    pagination: Pagination,
    current_params: ListParams,
    search_query: Option<D::SearchForm>,
    is_loading: bool,
    last_error: Option<Failure>,
    page_reloaded: bool,
}

impl<D: ResourceDomain> StoreState<D> {
    fn initial() -> Self {
        Self {
            items: Vec::new(),
            pagination: Pagination::default(),
            current_params: ListParams::initial(),
            search_query: None,
            is_loading: false,
            last_error: None,
            page_reloaded: false,
        }
    }
}

/// Cache plus mutation methods for one domain.
pub struct ResourceStore<D: ResourceDomain> {
    api: Arc<ApiClient>,
    state: RwLock<StoreState<D>>,
    fetch_generation: AtomicU64,
}

impl<D: ResourceDomain> ResourceStore<D> {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            state: RwLock::new(StoreState::initial()),
            fetch_generation: AtomicU64::new(0),
        }
    }

    /* ---------- snapshot reads ---------- */

    pub fn items(&self) -> Vec<D::Entity> {
        self.state.read().items.clone()
    }

    pub fn pagination(&self) -> Pagination {
        self.state.read().pagination.clone()
    }

    pub fn current_params(&self) -> ListParams {
        self.state.read().current_params.clone()
    }

    pub fn search_query(&self) -> Option<D::SearchForm> {
        self.state.read().search_query.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.read().is_loading
    }

    pub fn last_error(&self) -> Option<Failure> {
        self.state.read().last_error.clone()
    }

    pub fn total(&self) -> u64 {
        self.state.read().pagination.total
    }

    pub fn total_pages(&self) -> u32 {
        self.state.read().pagination.total_pages
    }

    pub fn has_next_page(&self) -> bool {
        self.state.read().pagination.has_next
    }

    pub fn has_prev_page(&self) -> bool {
        self.state.read().pagination.has_prev
    }

    /// Cached entity by id, without a network round trip.
    pub fn get_by_id(&self, id: u64) -> Option<D::Entity> {
        self.state.read().items.iter().find(|e| e.id() == id).cloned()
    }

    /// Cached entities whose name contains the needle.
    pub fn find_by_name(&self, needle: &str) -> Vec<D::Entity> {
        self.state
            .read()
            .items
            .iter()
            .filter(|e| e.name().contains(needle))
            .cloned()
            .collect()
    }

    /// Force the next fetch to bypass the cache (e.g. after a hard
    /// navigation).
    pub fn set_page_reloaded(&self, reloaded: bool) {
        self.state.write().page_reloaded = reloaded;
    }

    /// Restore every field to its initial snapshot. Idempotent.
    pub fn reset_state(&self) {
        *self.state.write() = StoreState::initial();
    }

    /* ---------- list / search ---------- */

    /// Fetch a page of entities.
    ///
    /// With a warm cache and neither `refresh` nor the reload flag set,
    /// returns the cached snapshot without a network call. Otherwise the
    /// params are merged over the store's current ones (explicit fields
    /// win), the page replaces (`refresh`) or extends the cache, and the
    /// pagination is replaced wholesale.
    pub async fn list(&self, params: ListParams, refresh: bool) -> Result<ListData<D::Entity>, Failure> {
        {
            let state = self.state.read();
            if !refresh && !state.page_reloaded && !state.items.is_empty() {
                tracing::debug!(domain = D::LABEL, "serving list from cache");
                return Ok(ListData {
                    list: state.items.clone(),
                    pagination: state.pagination.clone(),
                });
            }
        }

        self.begin();
        let result = self.fetch_list(params, refresh).await;
        self.finish(&result);
        result
    }

    /// Search with a cached form; always replaces the cache wholesale.
    pub async fn search(&self, form: D::SearchForm, refresh: bool) -> Result<ListData<D::Entity>, Failure> {
        self.begin();
        let result = self.fetch_search(form, refresh).await;
        self.finish(&result);
        result
    }

    /// Unpaginated id/name listing of the whole domain.
    pub async fn get_all(&self) -> Result<Vec<EntityRef>, Failure> {
        self.begin();
        let result = self.fetch_all().await;
        self.finish(&result);
        result
    }

    async fn fetch_list(&self, params: ListParams, refresh: bool) -> Result<ListData<D::Entity>, Failure> {
        let query = {
            let mut state = self.state.write();
            state.current_params.merge_from(&params);
            state.current_params = state.current_params.clamped();
            build_query(state.search_query.as_ref(), &state.current_params)?
        };
        validate_request(&self.current_params()).map_err(Failure::from)?;

        self.run_page_request(D::BASE_PATH, query, refresh).await
    }

    async fn fetch_search(&self, form: D::SearchForm, refresh: bool) -> Result<ListData<D::Entity>, Failure> {
        validate_request(&form).map_err(Failure::from)?;
        let query = {
            let mut state = self.state.write();
            state.search_query = Some(form.clone());
            let page_params = if refresh {
                ListParams::first_page()
            } else {
                state.current_params.clamped()
            };
            state.current_params.merge_from(&page_params);
            // The form's fields win over the paging base.
            build_query(Some(&page_params), &form)?
        };

        // Search results always replace the cache; appending would mix
        // result sets.
        let path = format!("{}/search", D::BASE_PATH);
        self.run_page_request(&path, query, true).await
    }

    async fn fetch_all(&self) -> Result<Vec<EntityRef>, Failure> {
        let envelope: ApiEnvelope<RefListData> =
            self.api.get(D::BASE_PATH, None).await.map_err(Failure::from)?;
        validate_response(&envelope).map_err(Failure::from)?;
        let data = self.business_data(envelope)?;
        Ok(data.list)
    }

    /// Dispatch a list/search query and apply the page unless a newer
    /// fetch was issued while this one was in flight.
    async fn run_page_request(
        &self,
        path: &str,
        query: serde_json::Value,
        replace: bool,
    ) -> Result<ListData<D::Entity>, Failure> {
        let generation = self.fetch_generation.fetch_add(1, Ordering::AcqRel) + 1;

        let envelope: ApiEnvelope<ListData<D::Entity>> = self
            .api
            .get(path, Some(query))
            .await
            .map_err(Failure::from)?;
        validate_response(&envelope).map_err(Failure::from)?;
        let data = self.business_data(envelope)?;

        if self.fetch_generation.load(Ordering::Acquire) != generation {
            tracing::debug!(domain = D::LABEL, "discarding stale page response");
            return Ok(data);
        }

        let mut state = self.state.write();
        if replace {
            state.items = data.list.clone();
        } else {
            state.items.extend(data.list.iter().cloned());
        }
        state.pagination = data.pagination.clone();
        state.page_reloaded = false;
        Ok(data)
    }

    /* ---------- mutations ---------- */

    /// Create an entity; the result is prepended to the cache, which is
    /// trimmed to the page size so the visible page stays consistent
    /// without a refetch.
    pub async fn create(&self, form: D::CreateForm) -> Result<D::Entity, Failure> {
        self.begin();
        let result = self.do_create(form).await;
        self.finish(&result);
        result
    }

    async fn do_create(&self, form: D::CreateForm) -> Result<D::Entity, Failure> {
        validate_request(&form).map_err(Failure::from)?;
        let body = to_body(&form)?;

        let envelope: ApiEnvelope<D::Entity> = self
            .api
            .post(D::BASE_PATH, Some(body))
            .await
            .map_err(Failure::from)?;
        validate_response(&envelope).map_err(Failure::from)?;
        let entity = self.business_data(envelope)?;

        let mut state = self.state.write();
        state.items.insert(0, entity.clone());
        let page_size = state.pagination.page_size.max(1) as usize;
        if state.items.len() > page_size {
            state.items.truncate(page_size);
        }
        Ok(entity)
    }

    /// Update an entity; the returned fields are merged into the cached
    /// item by id.
    pub async fn update(&self, form: D::UpdateForm) -> Result<D::Entity, Failure> {
        self.begin();
        let result = self.do_update(form).await;
        self.finish(&result);
        result
    }

    async fn do_update(&self, form: D::UpdateForm) -> Result<D::Entity, Failure> {
        validate_request(&form).map_err(Failure::from)?;
        let id = D::update_id(&form);
        ensure_positive_id(id)?;
        let body = to_body(&form)?;

        let envelope: ApiEnvelope<D::Entity> = self
            .api
            .put(&format!("{}/{id}", D::BASE_PATH), Some(body))
            .await
            .map_err(Failure::from)?;
        validate_response(&envelope).map_err(Failure::from)?;
        let entity = self.business_data(envelope)?;

        let mut state = self.state.write();
        if let Some(cached) = state.items.iter_mut().find(|e| e.id() == id) {
            D::apply_update(cached, &form);
        }
        Ok(entity)
    }

    /// Flip an entity's status; the cached item is patched in place with
    /// the server's version. With `refresh`, the current page is re-listed
    /// afterwards.
    pub async fn toggle_status(&self, id: u64, refresh: bool) -> Result<D::Entity, Failure> {
        self.begin();
        let result = self.do_toggle(id).await;
        self.finish(&result);

        if result.is_ok() && refresh {
            self.relist().await;
        }
        result
    }

    async fn do_toggle(&self, id: u64) -> Result<D::Entity, Failure> {
        ensure_positive_id(id)?;

        let envelope: ApiEnvelope<D::Entity> = self
            .api
            .patch(&format!("{}/{id}/status", D::BASE_PATH), None)
            .await
            .map_err(Failure::from)?;
        validate_response(&envelope).map_err(Failure::from)?;
        let entity = self.business_data(envelope)?;

        let mut state = self.state.write();
        if let Some(cached) = state.items.iter_mut().find(|e| e.id() == id) {
            *cached = entity.clone();
        }
        Ok(entity)
    }

    /// Delete one entity; the cached item is removed and the total
    /// decremented. With `refresh`, the current page is re-listed.
    pub async fn delete(&self, id: u64, refresh: bool) -> Result<(), Failure> {
        self.begin();
        let result = self.do_delete(id).await;
        self.finish(&result);

        if result.is_ok() && refresh {
            self.relist().await;
        }
        result
    }

    async fn do_delete(&self, id: u64) -> Result<(), Failure> {
        ensure_positive_id(id)?;

        let envelope: ApiEnvelope<()> = self
            .api
            .delete(&format!("{}/{id}", D::BASE_PATH), None)
            .await
            .map_err(Failure::from)?;
        validate_response(&envelope).map_err(Failure::from)?;
        self.business_ok(envelope)?;

        let mut state = self.state.write();
        state.items.retain(|e| e.id() != id);
        state.pagination.total = state.pagination.total.saturating_sub(1);
        Ok(())
    }

    /// Delete several entities in one call; cached items are removed and
    /// the total decremented by the count deleted.
    pub async fn bulk_delete(&self, ids: &[u64], refresh: bool) -> Result<(), Failure> {
        self.begin();
        let result = self.do_bulk_delete(ids).await;
        self.finish(&result);

        if result.is_ok() && refresh {
            self.relist().await;
        }
        result
    }

    async fn do_bulk_delete(&self, ids: &[u64]) -> Result<(), Failure> {
        if ids.is_empty() || ids.iter().any(|id| *id == 0) {
            tracing::warn!(domain = D::LABEL, "bulk delete called with invalid id list");
            return Err(Failure::new(400, "malformed request parameters"));
        }

        let query: Vec<String> = ids.iter().map(|id| format!("ids={id}")).collect();
        let path = format!("{}/bulk?{}", D::BASE_PATH, query.join("&"));

        let envelope: ApiEnvelope<()> = self.api.delete(&path, None).await.map_err(Failure::from)?;
        validate_response(&envelope).map_err(Failure::from)?;
        self.business_ok(envelope)?;

        let mut state = self.state.write();
        state.items.retain(|e| !ids.contains(&e.id()));
        state.pagination.total = state.pagination.total.saturating_sub(ids.len() as u64);
        Ok(())
    }

    /* ---------- shared plumbing ---------- */

    fn begin(&self) {
        let mut state = self.state.write();
        state.is_loading = true;
        state.last_error = None;
    }

    fn finish<T>(&self, result: &Result<T, Failure>) {
        let mut state = self.state.write();
        state.is_loading = false;
        if let Err(failure) = result {
            state.last_error = Some(failure.clone());
        }
    }

    /// Re-list the current page after a mutation; its own failures only
    /// warn, they never mask the mutation's success.
    async fn relist(&self) {
        let params = self.current_params();
        if let Err(failure) = self.list(params, true).await {
            tracing::warn!(domain = D::LABEL, %failure, "post-mutation refresh failed");
        }
    }

    /// Unwrap a success payload, folding business failures into the
    /// uniform shape and logging them by severity class.
    fn business_data<T>(&self, envelope: ApiEnvelope<T>) -> Result<T, Failure> {
        match envelope.into_result() {
            Ok(Some(data)) => Ok(data),
            Ok(None) => Err(Failure::missing_data()),
            Err(failure) => Err(self.noted(failure)),
        }
    }

    /// Same as [`business_data`](Self::business_data) for payload-free
    /// endpoints.
    fn business_ok(&self, envelope: ApiEnvelope<()>) -> Result<(), Failure> {
        match envelope.into_result() {
            Ok(_) => Ok(()),
            Err(failure) => Err(self.noted(failure)),
        }
    }

    fn noted(&self, failure: Failure) -> Failure {
        match failure.code / 100 {
            4 => tracing::warn!(domain = D::LABEL, %failure, "client-side business error"),
            5 => tracing::error!(domain = D::LABEL, %failure, "server-side business error"),
            _ => tracing::warn!(domain = D::LABEL, %failure, "business error"),
        }
        failure
    }
}

impl<D: ResourceDomain> std::fmt::Debug for ResourceStore<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("ResourceStore")
            .field("domain", &D::LABEL)
            .field("items", &state.items.len())
            .field("is_loading", &state.is_loading)
            .finish()
    }
}

fn ensure_positive_id(id: u64) -> Result<(), Failure> {
    if id == 0 {
        tracing::warn!("entity id must be positive");
        return Err(Failure::new(400, "malformed request parameters"));
    }
    Ok(())
}

fn to_body<T: Serialize>(value: &T) -> Result<serde_json::Value, Failure> {
    serde_json::to_value(value).map_err(|e| {
        tracing::warn!("failed to serialize request body: {e}");
        Failure::new(400, "malformed request parameters")
    })
}

/// Serialize `base` and `overlay` and merge them into one flat query
/// object; overlay keys win.
fn build_query<B: Serialize, O: Serialize>(
    base: Option<&B>,
    overlay: &O,
) -> Result<serde_json::Value, Failure> {
    let mut map = match base {
        Some(base) => match to_body(base)? {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        },
        None => serde_json::Map::new(),
    };
    if let serde_json::Value::Object(overlay) = to_body(overlay)? {
        for (key, value) in overlay {
            map.insert(key, value);
        }
    }
    Ok(serde_json::Value::Object(map))
}
