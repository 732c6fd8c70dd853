//! Reconciliation engine
//!
//! Diffs an incoming product set against the remote catalog by SKU and
//! issues the creates, updates and deletes needed to converge. Items are
//! processed strictly one after another. The remote store's own per-SKU
//! create lock is what produces processing conflicts, and serialising the
//! writes keeps those rare; the recovery below handles the rest.
//!
//! Run phases:
//! 1. prepare input (dedup, order, limit)
//! 2. load the remote snapshot (products, categories, tags); failure here is run-fatal
//! 3. main pass, one item at a time, never aborting on a per-item failure
//! 4. deferred pass for creates parked after a conflict
//! 5. delete-missing pass

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::deferred::{ConflictRetryPolicy, DeferredCreate};
use crate::application::errors::SyncError;
use crate::application::events::EventEmitter;
use crate::application::hierarchy::{CategoryResolver, TagResolver};
use crate::application::images::ImageResolver;
use crate::application::pricing::MarginPolicy;
use crate::domain::product::dedup_by_sku;
use crate::domain::{
    CanonicalProduct, CatalogApi, CatalogError, IdRef, ProcessDirection, ProductPayload, RemoteProduct,
    SyncEvent, SyncOptions, SyncReport,
};

/// Result of a finished (or cancelled) run
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub report: SyncReport,
    pub cancelled: bool,
    /// Creates that went through the deferred pass
    pub deferred: usize,
}

/// Mutable state of one run; rebuilt from scratch every time
struct RunState {
    snapshot: Vec<RemoteProduct>,
    existing_by_sku: HashMap<String, RemoteProduct>,
    categories: CategoryResolver,
    tags: TagResolver,
    images: ImageResolver,
    deferred: Vec<DeferredCreate>,
    report: SyncReport,
}

/// Prices after the margin, computed once per item
struct PricedItem<'a> {
    product: &'a CanonicalProduct,
    regular_price: Option<String>,
    sale_price: Option<String>,
}

impl PricedItem<'_> {
    fn stock_and_price_payload(&self) -> ProductPayload {
        ProductPayload::stock_and_price(
            self.product.manage_stock,
            self.product.stock_quantity,
            self.regular_price.clone(),
            self.sale_price.clone(),
        )
    }
}

pub struct SyncEngine {
    catalog: Arc<dyn CatalogApi>,
    events: EventEmitter,
    retry: ConflictRetryPolicy,
    cancel: CancellationToken,
}

impl SyncEngine {
    pub fn new(catalog: Arc<dyn CatalogApi>, events: EventEmitter) -> Self {
        Self {
            catalog,
            events,
            retry: ConflictRetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry: ConflictRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Input as the main pass will see it, plus the full SKU set used by delete-missing
    pub fn prepare_input(
        &self,
        products: Vec<CanonicalProduct>,
        options: &SyncOptions,
    ) -> (Vec<CanonicalProduct>, HashSet<String>) {
        let valid: Vec<CanonicalProduct> = products.into_iter().filter(CanonicalProduct::is_valid).collect();
        let mut items = dedup_by_sku(valid);
        let input_skus: HashSet<String> = items.iter().map(|p| p.sku.clone()).collect();

        if options.process_direction == ProcessDirection::Desc {
            items.reverse();
        }
        self.events.emit(SyncEvent::OrderApplied {
            direction: options.process_direction.as_str().to_string(),
        });

        if let Some(limit) = options.limit {
            items.truncate(limit);
            self.events.emit(SyncEvent::LimitApplied {
                limit,
                effective: items.len(),
            });
        }

        (items, input_skus)
    }

    /// Runs all phases and returns the terminal report
    pub async fn run(&self, products: Vec<CanonicalProduct>, options: &SyncOptions) -> Result<SyncOutcome, SyncError> {
        self.events.emit(SyncEvent::Start { at: Utc::now() });
        let (items, input_skus) = self.prepare_input(products, options);
        self.events.info(format!("Total to import: {}", items.len()));
        info!("🚀 Sync started: {} products to reconcile", items.len());

        let mut state = self.load_snapshot(items.len()).await?;
        let margin = MarginPolicy::from_options(options);

        let mut cancelled = self.main_pass(&mut state, &items, options, margin).await;

        let deferred = state.deferred.len();
        if !cancelled && deferred > 0 {
            cancelled = self.deferred_pass(&mut state).await;
        }

        if options.delete_missing && !cancelled {
            cancelled = self.delete_missing_pass(&mut state, &input_skus).await;
        }

        if cancelled {
            warn!("🛑 Sync cancelled; partial report kept");
            self.events.info("Run cancelled; remaining work skipped");
        }
        info!(
            "✅ Sync finished: created={}, updated={}, deleted={}, errors={}",
            state.report.created,
            state.report.updated,
            state.report.deleted,
            state.report.errors.len()
        );

        Ok(SyncOutcome {
            report: state.report,
            cancelled,
            deferred,
        })
    }

    async fn load_snapshot(&self, total: usize) -> Result<RunState, SyncError> {
        let snapshot = self
            .catalog
            .list_all_products()
            .await
            .map_err(|e| SyncError::snapshot("products", e))?;
        let categories = self
            .catalog
            .list_all_categories()
            .await
            .map_err(|e| SyncError::snapshot("categories", e))?;
        let tags = self
            .catalog
            .list_all_tags()
            .await
            .map_err(|e| SyncError::snapshot("tags", e))?;

        debug!(
            "Snapshot loaded: {} products, {} categories, {} tags",
            snapshot.len(),
            categories.len(),
            tags.len()
        );

        let existing_by_sku = snapshot
            .iter()
            .filter(|p| !p.sku.is_empty())
            .map(|p| (p.sku.clone(), p.clone()))
            .collect();

        Ok(RunState {
            snapshot,
            existing_by_sku,
            categories: CategoryResolver::from_existing(&categories),
            tags: TagResolver::from_existing(&tags),
            images: ImageResolver::new(),
            deferred: Vec::new(),
            report: SyncReport::new(total),
        })
    }

    /// Returns true when the run was cancelled
    async fn main_pass(
        &self,
        state: &mut RunState,
        items: &[CanonicalProduct],
        options: &SyncOptions,
        margin: MarginPolicy,
    ) -> bool {
        let started = Instant::now();
        let total = items.len();
        let delay = Duration::from_millis(options.per_item_delay_ms);

        for (index, product) in items.iter().enumerate() {
            if self.cancel.is_cancelled() || !self.pause(delay).await {
                return true;
            }

            let (regular_price, sale_price) =
                margin.apply(product.regular_price.as_deref(), product.sale_price.as_deref());
            let item = PricedItem {
                product,
                regular_price,
                sale_price,
            };

            if let Err(e) = self.process_item(state, &item, options).await {
                self.record_item_failure(state, product, &e);
            }

            let processed = index + 1;
            let elapsed = started.elapsed();
            let elapsed_secs = elapsed.as_secs_f64();
            let speed = if elapsed_secs > 0.0 {
                processed as f64 / elapsed_secs
            } else {
                0.0
            };
            self.events.emit(SyncEvent::Progress {
                processed,
                total,
                elapsed_ms: elapsed.as_millis() as u64,
                speed,
            });
        }

        false
    }

    fn record_item_failure(&self, state: &mut RunState, product: &CanonicalProduct, error: &CatalogError) {
        warn!("❌ {} failed: {}", product.sku, error);
        if error.is_conflict() {
            self.events.emit(SyncEvent::SkipConflict {
                sku: product.sku.clone(),
                name: product.name.clone(),
                error: error.message().to_string(),
            });
        } else {
            self.events
                .error(Some(&product.sku), Some(&product.name), error.to_string());
        }
        state.report.record_error(Some(&product.sku), error.to_string());
    }

    async fn process_item(
        &self,
        state: &mut RunState,
        item: &PricedItem<'_>,
        options: &SyncOptions,
    ) -> Result<(), CatalogError> {
        let product = item.product;
        match state.existing_by_sku.get(&product.sku).map(|current| current.id) {
            Some(id) => self.update_existing(state, item, id, options).await,
            None if options.is_narrowed_update() || !options.do_create_new => {
                self.events.emit(SyncEvent::SkipCreate {
                    sku: product.sku.clone(),
                    name: product.name.clone(),
                });
                Ok(())
            }
            None => self.create_new(state, item, options).await,
        }
    }

    async fn update_existing(
        &self,
        state: &mut RunState,
        item: &PricedItem<'_>,
        id: u64,
        options: &SyncOptions,
    ) -> Result<(), CatalogError> {
        let product = item.product;
        if !options.do_update_existing {
            self.events.emit(SyncEvent::SkipUpdate {
                sku: product.sku.clone(),
                name: product.name.clone(),
            });
            return Ok(());
        }

        let (payload, event) = if options.update_stock_only {
            (
                ProductPayload::stock(product.manage_stock, product.stock_quantity),
                SyncEvent::UpdatedStock {
                    sku: product.sku.clone(),
                    id,
                    name: product.name.clone(),
                },
            )
        } else if options.update_stock_and_price_only {
            (
                item.stock_and_price_payload(),
                SyncEvent::UpdatedStockPrice {
                    sku: product.sku.clone(),
                    id,
                    name: product.name.clone(),
                },
            )
        } else {
            (
                self.full_update_payload(state, item, options).await,
                SyncEvent::UpdatedProduct {
                    sku: product.sku.clone(),
                    id,
                    name: product.name.clone(),
                },
            )
        };

        if payload.is_empty() {
            self.events.emit(SyncEvent::SkipUpdateNoFields {
                sku: product.sku.clone(),
                name: product.name.clone(),
            });
            return Ok(());
        }

        self.catalog.update_product(id, &payload).await?;
        state.report.record_updated(&product.sku);
        self.events.emit(event);
        Ok(())
    }

    async fn full_update_payload(
        &self,
        state: &mut RunState,
        item: &PricedItem<'_>,
        options: &SyncOptions,
    ) -> ProductPayload {
        let product = item.product;
        let mut payload = ProductPayload {
            name: Some(product.name.clone()),
            description: product.description.clone(),
            short_description: product.short_description.clone(),
            regular_price: item.regular_price.clone(),
            sale_price: item.sale_price.clone(),
            manage_stock: product.manage_stock,
            stock_quantity: product.stock_quantity,
            status: product.status,
            ..Default::default()
        };

        if options.update_images_on_update {
            payload.images = state
                .images
                .resolve(self.catalog.as_ref(), &self.events, &product.images, options.media_mode)
                .await;
            let category_ids = state
                .categories
                .ensure_chain(self.catalog.as_ref(), &self.events, &product.category_chain())
                .await;
            payload.categories = id_refs(&category_ids);
        }

        payload
    }

    async fn create_new(
        &self,
        state: &mut RunState,
        item: &PricedItem<'_>,
        options: &SyncOptions,
    ) -> Result<(), CatalogError> {
        let product = item.product;
        let category_ids = state
            .categories
            .ensure_chain(self.catalog.as_ref(), &self.events, &product.category_chain())
            .await;
        let tag_ids = state
            .tags
            .ensure_tags(self.catalog.as_ref(), &self.events, &product.tag_names())
            .await;
        let images = state
            .images
            .resolve(self.catalog.as_ref(), &self.events, &product.images, options.media_mode)
            .await;

        let payload = ProductPayload {
            name: Some(product.name.clone()),
            product_type: Some("simple".to_string()),
            status: Some(product.status.unwrap_or_default()),
            sku: Some(product.sku.clone()),
            description: product.description.clone(),
            short_description: product.short_description.clone(),
            regular_price: item.regular_price.clone(),
            sale_price: item.sale_price.clone(),
            manage_stock: Some(product.manage_stock.unwrap_or(product.stock_quantity.is_some())),
            stock_quantity: product.stock_quantity,
            images,
            categories: id_refs(&category_ids),
            tags: id_refs(&tag_ids),
        };

        let mut error = match self.catalog.create_product(&payload).await {
            Ok(created) => {
                self.finish_create(state, product, created.id);
                return Ok(());
            }
            Err(e) => e,
        };

        if error.is_media() && payload.has_images() {
            self.events.emit(SyncEvent::ImageUploadFailed {
                sku: product.sku.clone(),
                error: error.message().to_string(),
            });
            match self.catalog.create_product(&payload.without_images()).await {
                Ok(created) => {
                    self.finish_create(state, product, created.id);
                    return Ok(());
                }
                Err(e) => error = e,
            }
        }

        if error.is_conflict() {
            return self.recover_conflict(state, item, &payload, &error).await;
        }

        Err(error)
    }

    /// The store reported the SKU as already being created
    async fn recover_conflict(
        &self,
        state: &mut RunState,
        item: &PricedItem<'_>,
        payload: &ProductPayload,
        conflict: &CatalogError,
    ) -> Result<(), CatalogError> {
        let product = item.product;
        info!("⏳ Processing conflict for {}, checking remote", product.sku);

        match self.catalog.get_product_by_sku(&product.sku).await {
            Ok(Some(found)) => {
                self.finish_create(state, product, found.id);
                let follow_up = item.stock_and_price_payload();
                if !follow_up.is_empty() {
                    match self.catalog.update_product(found.id, &follow_up).await {
                        Ok(_) => self.events.emit(SyncEvent::UpdatedStockPrice {
                            sku: product.sku.clone(),
                            id: found.id,
                            name: product.name.clone(),
                        }),
                        Err(e) => {
                            warn!("⚠️ Follow-up update for {} failed: {}", product.sku, e);
                            self.events
                                .error(Some(&product.sku), Some(&product.name), e.to_string());
                            state.report.record_error(Some(&product.sku), e.to_string());
                        }
                    }
                }
                Ok(())
            }
            Ok(None) => {
                if !self.pause(self.retry.conflict_retry_delay()).await {
                    self.defer(state, item, payload, conflict);
                    return Ok(());
                }
                match self.catalog.create_product(&payload.without_images()).await {
                    Ok(created) => {
                        self.finish_create(state, product, created.id);
                        Ok(())
                    }
                    Err(e) if e.is_conflict() => {
                        self.defer(state, item, payload, conflict);
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            Err(lookup) => {
                warn!("⚠️ Lookup of {} after conflict failed: {}", product.sku, lookup);
                self.defer(state, item, payload, conflict);
                Ok(())
            }
        }
    }

    fn defer(&self, state: &mut RunState, item: &PricedItem<'_>, payload: &ProductPayload, conflict: &CatalogError) {
        let product = item.product;
        self.events.emit(SyncEvent::SkipConflict {
            sku: product.sku.clone(),
            name: product.name.clone(),
            error: conflict.message().to_string(),
        });
        state.deferred.push(DeferredCreate {
            sku: product.sku.clone(),
            name: product.name.clone(),
            payload: payload.clone(),
            regular_price: item.regular_price.clone(),
            sale_price: item.sale_price.clone(),
            stock_quantity: product.stock_quantity,
            manage_stock: product.manage_stock,
        });
    }

    fn finish_create(&self, state: &mut RunState, product: &CanonicalProduct, id: u64) {
        state
            .existing_by_sku
            .insert(product.sku.clone(), RemoteProduct::new(id, &product.sku, &product.name));
        state.report.record_created(&product.sku);
        self.events.emit(SyncEvent::CreatedProduct {
            sku: product.sku.clone(),
            id,
            name: product.name.clone(),
        });
    }

    /// Returns true when the run was cancelled
    async fn deferred_pass(&self, state: &mut RunState) -> bool {
        let queued = std::mem::take(&mut state.deferred);
        let max_attempts = self.retry.deferred_max_attempts;
        info!("🔁 Deferred pass: {} creates, up to {} attempts each", queued.len(), max_attempts);

        for item in &queued {
            let mut settled = false;

            for attempt in 1..=max_attempts {
                let wait_ms = self.retry.deferred_delay_ms(attempt);
                if self.cancel.is_cancelled() || !self.pause(Duration::from_millis(wait_ms)).await {
                    return true;
                }

                match self.catalog.get_product_by_sku(&item.sku).await {
                    Ok(Some(found)) => {
                        self.settle_found_deferred(state, item, found.id).await;
                        settled = true;
                        break;
                    }
                    Ok(None) => {}
                    Err(e) => debug!("Deferred lookup of {} failed: {}", item.sku, e),
                }

                match self.catalog.create_product(&item.payload.without_images()).await {
                    Ok(created) => {
                        state
                            .existing_by_sku
                            .insert(item.sku.clone(), RemoteProduct::new(created.id, &item.sku, &item.name));
                        state.report.record_created(&item.sku);
                        self.events.emit(SyncEvent::CreatedProductDeferred {
                            sku: item.sku.clone(),
                            id: created.id,
                            name: item.name.clone(),
                        });
                        settled = true;
                        break;
                    }
                    Err(e) if e.is_conflict() => {
                        self.events.emit(SyncEvent::RetryConflictDeferred {
                            sku: item.sku.clone(),
                            name: item.name.clone(),
                            attempt,
                            wait_ms,
                        });
                    }
                    Err(e) => {
                        self.events.emit(SyncEvent::SkipConflictDeferred {
                            sku: item.sku.clone(),
                            name: item.name.clone(),
                            error: e.to_string(),
                        });
                        state.report.record_error(Some(&item.sku), e.to_string());
                        settled = true;
                        break;
                    }
                }
            }

            if !settled {
                warn!("🏳️ Giving up on {} after {} deferred attempts", item.sku, max_attempts);
                self.events.emit(SyncEvent::GiveupDeferred {
                    sku: item.sku.clone(),
                    name: item.name.clone(),
                    attempts: max_attempts,
                });
                state.report.record_error(
                    Some(&item.sku),
                    format!("create still conflicting after {max_attempts} deferred attempts"),
                );
            }
        }

        false
    }

    /// The parked create landed after all: stock and price refresh only, nothing counted
    async fn settle_found_deferred(&self, state: &mut RunState, item: &DeferredCreate, id: u64) {
        match self.catalog.update_product(id, &item.stock_and_price_payload()).await {
            Ok(_) => self.events.emit(SyncEvent::UpdatedStockPriceDeferred {
                sku: item.sku.clone(),
                id,
                name: item.name.clone(),
            }),
            Err(e) => {
                self.events.error(Some(&item.sku), Some(&item.name), e.to_string());
                state.report.record_error(Some(&item.sku), e.to_string());
            }
        }
        state
            .existing_by_sku
            .insert(item.sku.clone(), RemoteProduct::new(id, &item.sku, &item.name));
    }

    /// Returns true when the run was cancelled
    async fn delete_missing_pass(&self, state: &mut RunState, input_skus: &HashSet<String>) -> bool {
        let doomed: Vec<RemoteProduct> = state
            .snapshot
            .iter()
            .filter(|p| !p.sku.is_empty() && !input_skus.contains(&p.sku))
            .cloned()
            .collect();
        info!("🗑️ Delete-missing pass: {} remote products absent from input", doomed.len());

        for remote in doomed {
            if self.cancel.is_cancelled() {
                return true;
            }
            match self.catalog.delete_product(remote.id).await {
                Ok(()) => {
                    state.existing_by_sku.remove(&remote.sku);
                    state.report.record_deleted(&remote.sku);
                    self.events.emit(SyncEvent::DeletedMissing {
                        id: remote.id,
                        sku: remote.sku,
                        name: remote.name,
                    });
                }
                Err(e) => {
                    warn!("⚠️ Delete of {} failed: {}", remote.sku, e);
                    self.events.error(Some(&remote.sku), Some(&remote.name), e.to_string());
                    state.report.record_error(Some(&remote.sku), e.to_string());
                }
            }
        }

        false
    }

    /// Sleeps unless cancelled first; false means cancelled
    async fn pause(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.cancel.is_cancelled();
        }
        tokio::select! {
            () = tokio::time::sleep(duration) => true,
            () = self.cancel.cancelled() => false,
        }
    }
}

fn id_refs(ids: &[u64]) -> Option<Vec<IdRef>> {
    (!ids.is_empty()).then(|| ids.iter().map(|id| IdRef { id: *id }).collect())
}
