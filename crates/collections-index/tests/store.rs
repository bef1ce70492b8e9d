//! End-to-end scenarios against a real (temp-file) SQLite backend, exercising
//! the invariants in §3 and the read/write contracts in §4.E/§4.F.

use chrono::{DateTime, Utc};
use collections_core::{
    Collection, CollectionIdentifier, CollectionSource, CollectionSourceType, Package,
    PackageIdentity, PackageRepository, Product, Target, Version,
};
use collections_index::{DbLocation, IndexStore, TargetMatchType};
use url::Url;

fn timestamp(seconds_after_epoch: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(seconds_after_epoch, 0).unwrap()
}

fn version(v: &str, package_name: &str, targets: &[&str], products: &[&str]) -> Version {
    Version {
        version: v.to_string(),
        package_name: package_name.to_string(),
        tools_version: "5.9".to_string(),
        verified_platforms: None,
        verified_swift_versions: None,
        license: None,
        targets: targets
            .iter()
            .map(|name| Target {
                name: name.to_string(),
                module_name: None,
            })
            .collect(),
        products: products
            .iter()
            .map(|name| Product {
                name: name.to_string(),
                product_type: "library".to_string(),
                target_names: targets.iter().map(|t| t.to_string()).collect(),
            })
            .collect(),
    }
}

fn package(repository_url: &str, summary: &str, versions: Vec<Version>) -> Package {
    Package {
        repository: PackageRepository {
            url: Url::parse(repository_url).unwrap(),
        },
        summary: Some(summary.to_string()),
        readme_url: None,
        keywords: Some(vec!["networking".to_string()]),
        versions,
    }
}

fn collection(source_url: &str, packages: Vec<Package>, last_processed_at: i64) -> Collection {
    let url = Url::parse(source_url).unwrap();
    Collection {
        identifier: CollectionIdentifier::json(url.clone()),
        source: CollectionSource {
            source_type: CollectionSourceType::Json,
            url,
        },
        name: "test collection".to_string(),
        description: None,
        keywords: None,
        packages,
        created_at: timestamp(0),
        last_processed_at: timestamp(last_processed_at),
    }
}

async fn open_store() -> IndexStore {
    IndexStore::new(DbLocation::Memory)
}

#[tokio::test]
async fn put_then_get_round_trips() {
    let store = open_store().await;
    let c = collection(
        "https://example.org/collections/a.json",
        vec![package(
            "https://github.com/acme/net",
            "A networking library",
            vec![version("1.0.0", "Net", &["Net"], &["Net"])],
        )],
        100,
    );

    store.put(&c).await.unwrap();
    let fetched = store.get(&c.identifier).await.unwrap();
    assert_eq!(fetched, c);
}

#[tokio::test]
async fn get_reports_not_found_for_unknown_identifier() {
    let store = open_store().await;
    let missing = CollectionIdentifier::json(Url::parse("https://example.org/missing.json").unwrap());
    let err = store.get(&missing).await.unwrap_err();
    assert!(matches!(err, collections_index::IndexError::NotFound(_)));
}

#[tokio::test]
async fn list_with_ids_preserves_request_order() {
    let store = open_store().await;
    let a = collection("https://example.org/a.json", vec![], 1);
    let b = collection("https://example.org/b.json", vec![], 2);
    store.put(&a).await.unwrap();
    store.put(&b).await.unwrap();

    let ids = vec![b.identifier.clone(), a.identifier.clone()];
    let listed = store.list(Some(&ids)).await.unwrap();

    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].identifier, b.identifier);
    assert_eq!(listed[1].identifier, a.identifier);
}

#[tokio::test]
async fn remove_cascades_to_fts_and_cache() {
    let store = open_store().await;
    let c = collection(
        "https://example.org/a.json",
        vec![package(
            "https://github.com/acme/net",
            "networking toolkit",
            vec![version("1.0.0", "Net", &["Net"], &["Net"])],
        )],
        1,
    );
    store.put(&c).await.unwrap();
    store.remove(&c.identifier).await.unwrap();

    let err = store.get(&c.identifier).await.unwrap_err();
    assert!(matches!(err, collections_index::IndexError::NotFound(_)));

    let hits = store
        .search_packages(None, "networking")
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn put_twice_replaces_rather_than_duplicates() {
    let store = open_store().await;
    let first = collection(
        "https://example.org/a.json",
        vec![package(
            "https://github.com/acme/net",
            "networking toolkit",
            vec![version("1.0.0", "Net", &["Net"], &["Net"])],
        )],
        1,
    );
    store.put(&first).await.unwrap();

    let mut second = first.clone();
    second.packages = vec![package(
        "https://github.com/acme/storage",
        "storage toolkit",
        vec![version("1.0.0", "Storage", &["Storage"], &["Storage"])],
    )];
    second.last_processed_at = timestamp(2);
    store.put(&second).await.unwrap();

    let networking_hits = store.search_packages(None, "networking").await.unwrap();
    assert!(networking_hits.is_empty(), "stale FTS rows should have been replaced");

    let storage_hits = store.search_packages(None, "storage").await.unwrap();
    assert_eq!(storage_hits.len(), 1);
}

#[tokio::test]
async fn search_targets_is_case_insensitive_and_supports_prefix() {
    let store = open_store().await;
    let c = collection(
        "https://example.org/a.json",
        vec![package(
            "https://github.com/acme/net",
            "a library",
            vec![version("1.0.0", "Net", &["NetworkCore"], &["NetworkCore"])],
        )],
        1,
    );
    store.put(&c).await.unwrap();

    let exact = store
        .search_targets(None, "NETWORKCORE", TargetMatchType::ExactMatch)
        .await
        .unwrap();
    assert_eq!(exact.len(), 1);
    assert_eq!(exact[0].target, "networkcore");

    let prefix = store
        .search_targets(None, "network", TargetMatchType::Prefix)
        .await
        .unwrap();
    assert_eq!(prefix.len(), 1);
}

#[tokio::test]
async fn find_package_prefers_latest_processed_collection() {
    let store = open_store().await;
    let older = collection(
        "https://example.org/older.json",
        vec![package(
            "https://github.com/acme/net",
            "old summary",
            vec![version("1.0.0", "Net", &["Net"], &["Net"])],
        )],
        1,
    );
    let newer = collection(
        "https://example.org/newer.json",
        vec![package(
            "https://github.com/acme/net",
            "new summary",
            vec![version("2.0.0", "Net", &["Net"], &["Net"])],
        )],
        2,
    );
    store.put(&older).await.unwrap();
    store.put(&newer).await.unwrap();

    let identity = PackageIdentity::from_repository_url(&Url::parse("https://github.com/acme/net").unwrap());
    let hit = store.find_package(&identity, None).await.unwrap();

    assert_eq!(hit.package.summary.as_deref(), Some("new summary"));
    assert_eq!(hit.collections.len(), 2);
    assert_eq!(hit.collections[0].identifier, newer.identifier);
}

#[tokio::test]
async fn close_is_idempotent_and_allows_reopen() {
    let store = open_store().await;
    let c = collection("https://example.org/a.json", vec![], 1);
    store.put(&c).await.unwrap();

    store.close().await.unwrap();
    store.close().await.unwrap();

    // A fresh operation after close re-opens the handle. The in-memory
    // database is private to the closed connection, so this is expected to
    // start from empty rather than see `c` again.
    let listed = store.list(None).await.unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn get_after_cache_reset_still_reconstructs_from_the_db() {
    let store = open_store().await;
    let c = collection(
        "https://example.org/a.json",
        vec![package(
            "https://github.com/acme/net",
            "a networking library",
            vec![version("1.0.0", "Net", &["Net"], &["Net"])],
        )],
        1,
    );
    store.put(&c).await.unwrap();

    store.reset_cache();

    let fetched = store.get(&c.identifier).await.unwrap();
    assert_eq!(fetched, c);
}

#[tokio::test]
async fn search_packages_does_not_duplicate_collections_for_multi_version_packages() {
    let store = open_store().await;
    let c = collection(
        "https://example.org/a.json",
        vec![package(
            "https://github.com/acme/crypto",
            "cryptography primitives",
            vec![
                version("1.0.0", "Crypto", &["Crypto"], &["Crypto"]),
                version("2.0.0", "Crypto", &["Crypto"], &["Crypto"]),
                version("3.0.0", "Crypto", &["Crypto"], &["Crypto"]),
            ],
        )],
        1,
    );
    store.put(&c).await.unwrap();

    let hits = store.search_packages(None, "cryptography").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].collections.len(), 1);
    assert_eq!(hits[0].collections[0].identifier, c.identifier);
}

#[tokio::test]
async fn fallback_scan_finds_substring_matches_with_search_indices_forced_off() {
    let store = IndexStore::new_with_search_indices_forced_off(DbLocation::Memory);
    let c = collection(
        "https://example.org/a.json",
        vec![package(
            "https://github.com/acme/crypto",
            "cryptography primitives",
            vec![version("1.0.0", "Crypto", &["Crypto"], &["Crypto"])],
        )],
        1,
    );
    store.put(&c).await.unwrap();

    let hits = store.search_packages(None, "crypto").await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(
        hits[0].package.repository.url.as_str(),
        "https://github.com/acme/crypto"
    );
}
