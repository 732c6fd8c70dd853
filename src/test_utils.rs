//! Test utilities for catalog-sync
//!
//! [`FakeCatalog`] is an in-memory [`CatalogApi`] with a call log and
//! scriptable failures, so engine behaviour can be checked without a store.
//! [`TestContext`] wires it to an engine and an event stream.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::application::deferred::ConflictRetryPolicy;
use crate::application::events::{EventEmitter, EventStream};
use crate::application::hierarchy::normalize_name;
use crate::application::images::image_basename;
use crate::application::sync_engine::SyncEngine;
use crate::domain::{
    CatalogApi, CatalogError, CatalogResult, IdName, ProductPayload, RemoteCategory, RemoteMedia,
    RemoteProduct, RemoteTag, SyncEvent,
};

/// One recorded call against the fake store
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogCall {
    ListProducts,
    GetProductBySku(String),
    CreateProduct(ProductPayload),
    UpdateProduct(u64, ProductPayload),
    DeleteProduct(u64),
    ListCategories,
    CreateCategory { name: String, parent: Option<u64> },
    DeleteCategory(u64),
    ListTags,
    CreateTag(String),
    FindMedia(String),
}

#[derive(Default)]
struct FakeState {
    next_id: u64,
    products: Vec<RemoteProduct>,
    categories: Vec<RemoteCategory>,
    tags: Vec<RemoteTag>,
    media: Vec<RemoteMedia>,
    calls: Vec<CatalogCall>,
    listing_failure: Option<CatalogError>,
    create_failures: HashMap<String, VecDeque<CatalogError>>,
    image_failures: HashMap<String, CatalogError>,
    appear_on_conflict: HashMap<String, usize>,
    update_failures: HashMap<u64, CatalogError>,
    delete_failures: HashSet<u64>,
    category_failures: HashSet<String>,
}

impl FakeState {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn insert_from_payload(&mut self, payload: &ProductPayload) -> RemoteProduct {
        let id = self.allocate_id();
        let mut product = RemoteProduct::new(
            id,
            payload.sku.clone().unwrap_or_default(),
            payload.name.clone().unwrap_or_default(),
        );
        apply_payload(&mut product, payload);
        self.products.push(product.clone());
        product
    }
}

fn apply_payload(product: &mut RemoteProduct, payload: &ProductPayload) {
    if let Some(name) = &payload.name {
        product.name.clone_from(name);
    }
    if let Some(price) = &payload.regular_price {
        product.regular_price.clone_from(price);
    }
    if let Some(price) = &payload.sale_price {
        product.sale_price.clone_from(price);
    }
    if let Some(manage) = payload.manage_stock {
        product.manage_stock = manage;
    }
    if payload.stock_quantity.is_some() {
        product.stock_quantity = payload.stock_quantity;
    }
    if let Some(status) = payload.status {
        product.status = Some(status.as_str().to_string());
    }
    if let Some(categories) = &payload.categories {
        product.categories = categories
            .iter()
            .map(|c| IdName {
                id: c.id,
                name: String::new(),
            })
            .collect();
    }
    if let Some(tags) = &payload.tags {
        product.tags = tags
            .iter()
            .map(|t| IdName {
                id: t.id,
                name: String::new(),
            })
            .collect();
    }
}

/// In-memory remote catalog
#[derive(Default)]
pub struct FakeCatalog {
    state: Mutex<FakeState>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_id: 100,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- seeding -------------------------------------------------------

    pub fn seed_product(&self, product: RemoteProduct) {
        self.lock().products.push(product);
    }

    pub fn seed_category(&self, id: u64, name: &str, parent: u64) {
        self.lock().categories.push(RemoteCategory {
            id,
            name: name.to_string(),
            parent,
        });
    }

    pub fn seed_tag(&self, id: u64, name: &str) {
        self.lock().tags.push(RemoteTag {
            id,
            name: name.to_string(),
        });
    }

    pub fn add_media(&self, id: u64, source_url: &str) {
        self.lock().media.push(RemoteMedia {
            id,
            source_url: source_url.to_string(),
        });
    }

    // --- failure scripts -----------------------------------------------

    /// Every listing call fails with `error`
    pub fn fail_listing(&self, error: CatalogError) {
        self.lock().listing_failure = Some(error);
    }

    /// Next create of `sku` fails with `error`; queue several to fail repeatedly
    pub fn fail_create_for(&self, sku: &str, error: CatalogError) {
        self.lock()
            .create_failures
            .entry(sku.to_string())
            .or_default()
            .push_back(error);
    }

    /// The next `times` creates of `sku` report a processing conflict
    pub fn conflict_on_create(&self, sku: &str, times: usize) {
        for _ in 0..times {
            self.fail_create_for(sku, CatalogError::conflict(format!("{sku} zaten işleniyor")));
        }
    }

    /// A conflicting create of `sku` still lands in the store
    pub fn appear_on_conflict(&self, sku: &str) {
        self.appear_after_conflicts(sku, 0);
    }

    /// Like [`Self::appear_on_conflict`], but the first `skipped` conflicts leave nothing behind
    pub fn appear_after_conflicts(&self, sku: &str, skipped: usize) {
        self.lock().appear_on_conflict.insert(sku.to_string(), skipped);
    }

    /// Creates of `sku` carrying images fail with a media error
    pub fn fail_images_for(&self, sku: &str) {
        self.lock()
            .image_failures
            .insert(sku.to_string(), CatalogError::media("image upload forbidden"));
    }

    pub fn fail_update_for(&self, id: u64, error: CatalogError) {
        self.lock().update_failures.insert(id, error);
    }

    pub fn fail_delete_for(&self, id: u64) {
        self.lock().delete_failures.insert(id);
    }

    pub fn fail_category(&self, name: &str) {
        self.lock().category_failures.insert(normalize_name(name));
    }

    // --- inspection ----------------------------------------------------

    pub fn calls(&self) -> Vec<CatalogCall> {
        self.lock().calls.clone()
    }

    pub fn products(&self) -> Vec<RemoteProduct> {
        self.lock().products.clone()
    }

    pub fn product_by_sku(&self, sku: &str) -> Option<RemoteProduct> {
        self.lock().products.iter().find(|p| p.sku == sku).cloned()
    }

    pub fn categories(&self) -> Vec<RemoteCategory> {
        self.lock().categories.clone()
    }

    pub fn category_parent(&self, id: u64) -> Option<u64> {
        self.lock().categories.iter().find(|c| c.id == id).map(|c| c.parent)
    }

    pub fn creates(&self) -> Vec<ProductPayload> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                CatalogCall::CreateProduct(payload) => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn updates(&self) -> Vec<(u64, ProductPayload)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                CatalogCall::UpdateProduct(id, payload) => Some((*id, payload.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn last_update(&self) -> Option<(u64, ProductPayload)> {
        self.updates().pop()
    }

    fn count(&self, predicate: impl Fn(&CatalogCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn create_calls(&self) -> usize {
        self.count(|c| matches!(c, CatalogCall::CreateProduct(_)))
    }

    pub fn update_calls(&self) -> usize {
        self.count(|c| matches!(c, CatalogCall::UpdateProduct(..)))
    }

    pub fn delete_calls(&self) -> usize {
        self.count(|c| matches!(c, CatalogCall::DeleteProduct(_)))
    }

    pub fn lookup_calls(&self) -> usize {
        self.count(|c| matches!(c, CatalogCall::GetProductBySku(_)))
    }

    pub fn category_create_calls(&self) -> usize {
        self.count(|c| matches!(c, CatalogCall::CreateCategory { .. }))
    }

    pub fn tag_create_calls(&self) -> usize {
        self.count(|c| matches!(c, CatalogCall::CreateTag(_)))
    }

    pub fn media_lookup_calls(&self) -> usize {
        self.count(|c| matches!(c, CatalogCall::FindMedia(_)))
    }

    pub fn reset_calls(&self) {
        self.lock().calls.clear();
    }
}

#[async_trait]
impl CatalogApi for FakeCatalog {
    async fn list_all_products(&self) -> CatalogResult<Vec<RemoteProduct>> {
        let mut state = self.lock();
        state.calls.push(CatalogCall::ListProducts);
        if let Some(error) = &state.listing_failure {
            return Err(error.clone());
        }
        Ok(state.products.clone())
    }

    async fn get_product_by_sku(&self, sku: &str) -> CatalogResult<Option<RemoteProduct>> {
        let mut state = self.lock();
        state.calls.push(CatalogCall::GetProductBySku(sku.to_string()));
        Ok(state.products.iter().find(|p| p.sku == sku).cloned())
    }

    async fn create_product(&self, payload: &ProductPayload) -> CatalogResult<RemoteProduct> {
        let mut state = self.lock();
        state.calls.push(CatalogCall::CreateProduct(payload.clone()));
        let sku = payload.sku.clone().unwrap_or_default();

        if payload.has_images() {
            if let Some(error) = state.image_failures.get(&sku) {
                return Err(error.clone());
            }
        }

        if let Some(error) = state.create_failures.get_mut(&sku).and_then(VecDeque::pop_front) {
            let lands = error.is_conflict()
                && match state.appear_on_conflict.get_mut(&sku) {
                    Some(skipped) if *skipped > 0 => {
                        *skipped -= 1;
                        false
                    }
                    Some(_) => true,
                    None => false,
                };
            if lands && !state.products.iter().any(|p| p.sku == sku) {
                state.insert_from_payload(payload);
            }
            return Err(error);
        }

        if !sku.is_empty() && state.products.iter().any(|p| p.sku == sku) {
            return Err(CatalogError::fatal(format!("SKU {sku} is already in use")));
        }

        Ok(state.insert_from_payload(payload))
    }

    async fn update_product(&self, id: u64, payload: &ProductPayload) -> CatalogResult<RemoteProduct> {
        let mut state = self.lock();
        state.calls.push(CatalogCall::UpdateProduct(id, payload.clone()));
        if let Some(error) = state.update_failures.get(&id) {
            return Err(error.clone());
        }
        let product = state
            .products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| CatalogError::not_found(format!("product {id}")))?;
        apply_payload(product, payload);
        Ok(product.clone())
    }

    async fn delete_product(&self, id: u64) -> CatalogResult<()> {
        let mut state = self.lock();
        state.calls.push(CatalogCall::DeleteProduct(id));
        if state.delete_failures.contains(&id) {
            return Err(CatalogError::transient(format!("delete of {id} timed out")));
        }
        let before = state.products.len();
        state.products.retain(|p| p.id != id);
        if state.products.len() == before {
            return Err(CatalogError::not_found(format!("product {id}")));
        }
        Ok(())
    }

    async fn list_all_categories(&self) -> CatalogResult<Vec<RemoteCategory>> {
        let mut state = self.lock();
        state.calls.push(CatalogCall::ListCategories);
        if let Some(error) = &state.listing_failure {
            return Err(error.clone());
        }
        Ok(state.categories.clone())
    }

    async fn create_category(&self, name: &str, parent: Option<u64>) -> CatalogResult<RemoteCategory> {
        let mut state = self.lock();
        state.calls.push(CatalogCall::CreateCategory {
            name: name.to_string(),
            parent,
        });
        if state.category_failures.contains(&normalize_name(name)) {
            return Err(CatalogError::fatal(format!("category {name} rejected")));
        }
        let category = RemoteCategory {
            id: state.allocate_id(),
            name: name.to_string(),
            parent: parent.unwrap_or(0),
        };
        state.categories.push(category.clone());
        Ok(category)
    }

    async fn delete_category(&self, id: u64) -> CatalogResult<()> {
        let mut state = self.lock();
        state.calls.push(CatalogCall::DeleteCategory(id));
        let before = state.categories.len();
        state.categories.retain(|c| c.id != id);
        if state.categories.len() == before {
            return Err(CatalogError::not_found(format!("category {id}")));
        }
        Ok(())
    }

    async fn list_all_tags(&self) -> CatalogResult<Vec<RemoteTag>> {
        let mut state = self.lock();
        state.calls.push(CatalogCall::ListTags);
        if let Some(error) = &state.listing_failure {
            return Err(error.clone());
        }
        Ok(state.tags.clone())
    }

    async fn create_tag(&self, name: &str) -> CatalogResult<RemoteTag> {
        let mut state = self.lock();
        state.calls.push(CatalogCall::CreateTag(name.to_string()));
        let tag = RemoteTag {
            id: state.allocate_id(),
            name: name.to_string(),
        };
        state.tags.push(tag.clone());
        Ok(tag)
    }

    async fn find_media_by_filename(&self, basename: &str) -> CatalogResult<Option<RemoteMedia>> {
        let mut state = self.lock();
        state.calls.push(CatalogCall::FindMedia(basename.to_string()));
        Ok(state
            .media
            .iter()
            .find(|m| image_basename(&m.source_url).as_deref() == Some(basename))
            .cloned())
    }
}

/// Engine wired to a fresh [`FakeCatalog`] and an event stream
pub struct TestContext {
    pub catalog: Arc<FakeCatalog>,
    pub events: EventEmitter,
    pub stream: EventStream,
}

impl TestContext {
    pub fn new() -> Self {
        let (events, stream) = EventEmitter::channel();
        Self {
            catalog: Arc::new(FakeCatalog::new()),
            events,
            stream,
        }
    }

    /// Engine with the default retry schedule
    pub fn engine(&self) -> SyncEngine {
        SyncEngine::new(self.catalog.clone(), self.events.clone())
    }

    /// Engine with no waits, for tests that do not run on paused time
    pub fn fast_engine(&self) -> SyncEngine {
        self.engine().with_retry_policy(ConflictRetryPolicy {
            conflict_retry_delay_ms: 0,
            deferred_base_delay_ms: 0,
            deferred_max_attempts: 4,
        })
    }

    /// Every event published so far
    pub fn events(&mut self) -> Vec<SyncEvent> {
        self.stream.drain()
    }

    pub fn event_kinds(&mut self) -> Vec<&'static str> {
        self.stream.drain().iter().map(SyncEvent::kind).collect()
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
