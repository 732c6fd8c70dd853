//! Full runs: source file -> engine -> report store -> NDJSON stream

use std::sync::Arc;

use catalog_sync_lib::application::{EventEmitter, SyncService};
use catalog_sync_lib::domain::{RawSyncOptions, RemoteProduct, SyncOptions};
use catalog_sync_lib::infrastructure::{NdjsonSink, NewSystemOrigin, NewSystemSource, ReportStore, XmlFeedSource};
use catalog_sync_lib::test_utils::FakeCatalog;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<products>
  <product>
    <sku>BP-100</sku>
    <name>Brake Pad Front</name>
    <price>250</price>
    <stock>12</stock>
    <status>publish</status>
    <images>https://cdn.example/img/bp-100.jpg</images>
    <categories><category>Brakes</category><category>Pads</category></categories>
  </product>
  <product>
    <sku>OF-7</sku>
    <name>Oil Filter</name>
    <price>80</price>
    <stock>3</stock>
    <categories><category>Filters</category></categories>
  </product>
  <product>
    <name>Orphan without sku</name>
  </product>
</products>"#;

fn service(dir: &TempDir, catalog: Arc<FakeCatalog>) -> SyncService {
    SyncService::new(catalog, ReportStore::new(dir.path().join("reports"), 10).unwrap())
}

async fn ndjson(stream: catalog_sync_lib::application::EventStream) -> Vec<Value> {
    let mut buffer = Vec::new();
    NdjsonSink::new(&mut buffer).run(stream).await;
    String::from_utf8(buffer)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn xml_feed_sync_creates_deletes_and_persists_report() {
    let dir = TempDir::new().unwrap();
    let feed = dir.path().join("feed.xml");
    std::fs::write(&feed, FEED).unwrap();

    let catalog = Arc::new(FakeCatalog::new());
    catalog.seed_product(RemoteProduct::new(9, "GONE-1", "Discontinued"));
    catalog.add_media(55, "https://shop.example/wp-content/uploads/bp-100.jpg");

    let service = service(&dir, catalog.clone());
    let options = RawSyncOptions {
        delete_missing: Some(true),
        ..Default::default()
    }
    .migrate();
    let (events, stream) = EventEmitter::channel();

    let summary = service
        .start(&XmlFeedSource::new(&feed), &options, events, CancellationToken::new())
        .await
        .unwrap();

    assert!(!summary.cancelled);
    assert_eq!(summary.report.total, 2);
    assert_eq!(summary.report.created_skus, vec!["BP-100", "OF-7"]);
    assert_eq!(summary.report.deleted_skus, vec!["GONE-1"]);
    assert!(summary.report.errors.is_empty());

    // existing media is linked by id instead of re-uploaded
    let creates = catalog.creates();
    assert_eq!(
        serde_json::to_value(&creates[0].images).unwrap(),
        json!([{ "id": 55 }])
    );

    let store = service.reports();
    assert_eq!(store.latest().await.unwrap(), summary.report);
    let history = store.list().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(
        summary.report_file.unwrap().file_name().unwrap().to_string_lossy(),
        history[0]
    );

    let lines = ndjson(stream).await;
    let kinds: Vec<&str> = lines.iter().filter_map(|l| l["type"].as_str()).collect();
    assert_eq!(kinds.first(), Some(&"info"));
    assert!(kinds.contains(&"start"));
    assert!(kinds.contains(&"found_existing_media"));
    assert!(kinds.contains(&"deleted_missing"));
    assert_eq!(kinds.last(), Some(&"done"));
    assert_eq!(kinds.iter().filter(|k| **k == "done" || **k == "fatal").count(), 1);

    let done = lines.last().unwrap();
    assert_eq!(done["created"], 2);
    assert_eq!(done["deleted"], 1);
    assert_eq!(done["total"], 2);
}

#[tokio::test]
async fn new_system_snapshot_sync_builds_hierarchy_and_tags() {
    let dir = TempDir::new().unwrap();
    let snapshot = dir.path().join("new-system.json");
    let payload = json!({
        "items": [
            {
                "KOD": "K-1",
                "OEM": "04465-02220",
                "STOK_ADI": "Fren Balatası",
                "FIYAT": "1.250,00",
                "MARKA": "Toyota",
                "MODEL": "Corolla",
                "ALT_GRUP": "Balata",
                "BAKIYE": "4",
                "GORSELLER": ["/img/k-1.jpg"]
            },
            {
                "KOD": "K-2",
                "STOK_ADI": "Yağ Filtresi",
                "FIYAT": 99,
                "MARKA": "Toyota",
                "MODEL": "Corolla",
                "ALT_GRUP": "Filtre"
            },
            { "KOD": "", "STOK_ADI": "invalid" }
        ]
    });
    std::fs::write(&snapshot, payload.to_string()).unwrap();

    let catalog = Arc::new(FakeCatalog::new());
    let service = service(&dir, catalog.clone());
    let source = NewSystemSource::new(NewSystemOrigin::File(snapshot))
        .with_image_base_url(Some("https://media.example/".to_string()));
    let (events, stream) = EventEmitter::channel();

    let summary = service
        .start(&source, &SyncOptions::default(), events, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.report.created, 2);

    let k1 = catalog.product_by_sku("K-1").unwrap();
    assert_eq!(k1.name, "04465-02220 - Fren Balatası");
    assert_eq!(k1.regular_price, "1250");
    assert_eq!(k1.stock_quantity, Some(4));
    assert!(k1.manage_stock);

    let k2 = catalog.product_by_sku("K-2").unwrap();
    assert_eq!(k2.name, "Yağ Filtresi");
    assert!(!k2.manage_stock);

    // Toyota > Corolla shared, then one leaf each
    let names: Vec<String> = catalog.categories().into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["Toyota", "Corolla", "Balata", "Filtre"]);
    assert_eq!(catalog.tag_create_calls(), 3);

    let first_create = &catalog.creates()[0];
    assert_eq!(
        serde_json::to_value(&first_create.images).unwrap(),
        json!([{ "src": "https://media.example/img/k-1.jpg" }])
    );

    let lines = ndjson(stream).await;
    assert!(
        lines
            .iter()
            .any(|l| l["type"] == "info" && l["message"] == "Records: 3, valid: 2, invalid: 1")
    );
    assert_eq!(lines.last().unwrap()["type"], "done");
}

#[tokio::test]
async fn cancelled_run_still_persists_partial_report() {
    let dir = TempDir::new().unwrap();
    let feed = dir.path().join("feed.xml");
    std::fs::write(&feed, FEED).unwrap();

    let catalog = Arc::new(FakeCatalog::new());
    let service = service(&dir, catalog.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = service
        .start(
            &XmlFeedSource::new(&feed),
            &SyncOptions::default(),
            EventEmitter::detached(),
            cancel,
        )
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.report.created, 0);
    assert_eq!(catalog.create_calls(), 0);
    assert_eq!(service.reports().latest().await.unwrap(), summary.report);
}

#[tokio::test]
async fn unreachable_store_ends_with_one_fatal_event() {
    let dir = TempDir::new().unwrap();
    let feed = dir.path().join("feed.xml");
    std::fs::write(&feed, FEED).unwrap();

    let catalog = Arc::new(FakeCatalog::new());
    catalog.fail_listing(catalog_sync_lib::domain::CatalogError::transient("connection refused"));
    let service = service(&dir, catalog);
    let (events, stream) = EventEmitter::channel();

    let result = service
        .start(&XmlFeedSource::new(&feed), &SyncOptions::default(), events, CancellationToken::new())
        .await;

    assert!(result.is_err());
    let lines = ndjson(stream).await;
    let terminal: Vec<&Value> = lines
        .iter()
        .filter(|l| l["type"] == "fatal" || l["type"] == "done")
        .collect();
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0]["type"], "fatal");
    assert!(service.reports().list().await.unwrap().is_empty());
}
