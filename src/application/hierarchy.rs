//! Category and tag resolution
//!
//! Both resolvers are seeded once per run from a full listing of the remote
//! taxonomy and grow as the run creates new entries, so a later product with
//! the same chain never triggers another create. A failed create skips that
//! link and keeps going.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::application::events::EventEmitter;
use crate::domain::{CatalogApi, RemoteCategory, RemoteTag, SyncEvent};

/// Trimmed, lower-cased lookup form of a taxonomy name
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Category ids keyed by `(parent id, normalized name)`; parent 0 is the root
#[derive(Debug, Default)]
pub struct CategoryResolver {
    cache: HashMap<(u64, String), u64>,
}

impl CategoryResolver {
    pub fn from_existing(categories: &[RemoteCategory]) -> Self {
        let mut cache = HashMap::with_capacity(categories.len());
        for category in categories {
            cache
                .entry((category.parent, normalize_name(&category.name)))
                .or_insert(category.id);
        }
        Self { cache }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Walks `names` root first, creating missing links
    ///
    /// Returns the ids that resolved, in chain order.
    pub async fn ensure_chain(
        &mut self,
        catalog: &dyn CatalogApi,
        events: &EventEmitter,
        names: &[String],
    ) -> Vec<u64> {
        let mut ids = Vec::with_capacity(names.len());
        let mut parent = 0u64;

        for raw in names {
            let name = raw.trim();
            if name.is_empty() {
                continue;
            }
            let key = (parent, normalize_name(name));
            if let Some(id) = self.cache.get(&key) {
                parent = *id;
                ids.push(*id);
                continue;
            }

            let parent_arg = (parent != 0).then_some(parent);
            match catalog.create_category(name, parent_arg).await {
                Ok(category) => {
                    debug!("📂 Created category '{}' under {} -> {}", name, parent, category.id);
                    self.cache.insert(key, category.id);
                    events.emit(SyncEvent::CategoryCreated {
                        name: name.to_string(),
                        parent,
                        id: category.id,
                    });
                    parent = category.id;
                    ids.push(category.id);
                }
                Err(e) => {
                    warn!("⚠️ Category '{}' could not be created: {}", name, e);
                    events.error(None, Some(name), format!("category create failed: {e}"));
                }
            }
        }

        ids
    }
}

/// Tag ids keyed by normalized name
#[derive(Debug, Default)]
pub struct TagResolver {
    cache: HashMap<String, u64>,
}

impl TagResolver {
    pub fn from_existing(tags: &[RemoteTag]) -> Self {
        let mut cache = HashMap::with_capacity(tags.len());
        for tag in tags {
            cache.entry(normalize_name(&tag.name)).or_insert(tag.id);
        }
        Self { cache }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Resolves already-sanitized tag names, creating missing ones
    pub async fn ensure_tags(
        &mut self,
        catalog: &dyn CatalogApi,
        events: &EventEmitter,
        names: &[String],
    ) -> Vec<u64> {
        let mut ids: Vec<u64> = Vec::with_capacity(names.len());

        for raw in names {
            let name = raw.trim();
            if name.is_empty() {
                continue;
            }
            let key = normalize_name(name);
            let id = if let Some(id) = self.cache.get(&key) {
                *id
            } else {
                match catalog.create_tag(name).await {
                    Ok(tag) => {
                        debug!("🏷️ Created tag '{}' -> {}", name, tag.id);
                        self.cache.insert(key, tag.id);
                        events.emit(SyncEvent::TagCreated {
                            name: name.to_string(),
                            id: tag.id,
                        });
                        tag.id
                    }
                    Err(e) => {
                        warn!("⚠️ Tag '{}' could not be created: {}", name, e);
                        events.error(None, Some(name), format!("tag create failed: {e}"));
                        continue;
                    }
                }
            };
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeCatalog;

    fn chain(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    #[tokio::test]
    async fn test_chain_creates_then_reuses() {
        let catalog = FakeCatalog::new();
        let events = EventEmitter::detached();
        let mut resolver = CategoryResolver::default();

        let first = resolver
            .ensure_chain(&catalog, &events, &chain(&["Acme", "X1"]))
            .await;
        let second = resolver
            .ensure_chain(&catalog, &events, &chain(&["acme ", "x1"]))
            .await;

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_eq!(catalog.category_create_calls(), 2);
    }

    #[tokio::test]
    async fn test_same_name_under_different_parents_is_distinct() {
        let catalog = FakeCatalog::new();
        let events = EventEmitter::detached();
        let mut resolver = CategoryResolver::default();

        let a = resolver.ensure_chain(&catalog, &events, &chain(&["Acme", "Parts"])).await;
        let b = resolver.ensure_chain(&catalog, &events, &chain(&["Beta", "Parts"])).await;

        assert_ne!(a[1], b[1]);
        assert_eq!(resolver.len(), 4);
    }

    #[tokio::test]
    async fn test_seeded_cache_avoids_creates() {
        let catalog = FakeCatalog::new();
        let events = EventEmitter::detached();
        let existing = vec![
            RemoteCategory { id: 10, name: "Acme".into(), parent: 0 },
            RemoteCategory { id: 11, name: "X1".into(), parent: 10 },
        ];
        let mut resolver = CategoryResolver::from_existing(&existing);

        let ids = resolver.ensure_chain(&catalog, &events, &chain(&["ACME", "x1"])).await;

        assert_eq!(ids, vec![10, 11]);
        assert_eq!(catalog.category_create_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_link_is_skipped() {
        let catalog = FakeCatalog::new();
        catalog.fail_category("Broken");
        let (events, mut stream) = EventEmitter::channel();
        let mut resolver = CategoryResolver::default();

        let ids = resolver
            .ensure_chain(&catalog, &events, &chain(&["Acme", "Broken", "Leaf"]))
            .await;

        assert_eq!(ids.len(), 2);
        let leaf_parent = catalog.category_parent(ids[1]);
        assert_eq!(leaf_parent, Some(ids[0]));
        assert!(stream.drain().iter().any(|e| e.kind() == "error"));
    }

    #[tokio::test]
    async fn test_empty_chain_resolves_to_nothing() {
        let catalog = FakeCatalog::new();
        let events = EventEmitter::detached();
        let mut resolver = CategoryResolver::default();
        let ids = resolver.ensure_chain(&catalog, &events, &chain(&["", "  "])).await;
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_tags_are_cached_case_insensitively() {
        let catalog = FakeCatalog::new();
        let events = EventEmitter::detached();
        let mut resolver = TagResolver::from_existing(&[RemoteTag { id: 3, name: "OEM".into() }]);

        let ids = resolver
            .ensure_tags(&catalog, &events, &chain(&["oem", "Acme"]))
            .await;
        let again = resolver.ensure_tags(&catalog, &events, &chain(&["ACME"])).await;

        assert_eq!(ids[0], 3);
        assert_eq!(again, vec![ids[1]]);
        assert_eq!(catalog.tag_create_calls(), 1);
    }
}
