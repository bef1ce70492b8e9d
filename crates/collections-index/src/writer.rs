//! Transactional update of the primary table, both FTS tables, and the trie
//! (§4.E).

use std::collections::HashSet;

use collections_core::{identifier_base64, Collection, CollectionIdentifier};
use rusqlite::params;
use tokio::sync::Mutex as AsyncMutex;

use crate::cache::Cache;
use crate::db::Gateway;
use crate::error::Result;
use crate::lifecycle::Lifecycle;
use crate::trie::TargetTrie;

/// Serializes the primary-table write together with the transactional FTS/trie
/// update inside `put`/`remove` — the SQL engine admits only one transaction
/// per connection, so the FTS section needs this lock regardless; but two
/// concurrent `put`s for the *same* id must also have the *same* call win
/// both the primary table and FTS (§5), which requires serializing the
/// primary-table write together with the FTS/trie section, not just the
/// latter on its own.
pub struct Writer {
    write_lock: AsyncMutex<()>,
}

impl Writer {
    pub fn new() -> Self {
        Self {
            write_lock: AsyncMutex::new(()),
        }
    }

    pub async fn put(
        &self,
        gateway: &Gateway,
        lifecycle: &Lifecycle,
        cache: &Cache,
        trie: &TargetTrie,
        collection: &Collection,
    ) -> Result<()> {
        lifecycle.ensure_connected(gateway).await?;

        let key = collection.identifier.database_key();
        let value = collections_core::encode_collection(collection)?;

        let _guard = self.write_lock.lock().await;

        {
            let key = key.clone();
            gateway
                .with_connection(move |conn| {
                    conn.execute(
                        "INSERT OR REPLACE INTO package_collections (key, value) VALUES (?1, ?2)",
                        params![key, value],
                    )?;
                    Ok(())
                })
                .await?;
        }

        if gateway.use_search_indices() {
            let id_b64 = identifier_base64(&collection.identifier)?;
            let rows = build_fts_rows(&id_b64, collection);

            {
                let id_b64 = id_b64.clone();
                let rows = rows.clone();
                gateway
                    .with_transaction(move |tx| {
                        tx.execute(
                            "DELETE FROM fts_packages WHERE collection_id_blob_base64 = ?1",
                            params![id_b64],
                        )?;
                        tx.execute(
                            "DELETE FROM fts_targets WHERE collection_id_blob_base64 = ?1",
                            params![id_b64],
                        )?;

                        for row in &rows.packages {
                            tx.execute(
                                "INSERT INTO fts_packages (
                                    collection_id_blob_base64, id, version, name,
                                    repository_url, summary, keywords, products, targets
                                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                                params![
                                    id_b64,
                                    row.id,
                                    row.version,
                                    row.name,
                                    row.repository_url,
                                    row.summary,
                                    row.keywords,
                                    row.products,
                                    row.targets,
                                ],
                            )?;
                        }

                        for row in &rows.targets {
                            tx.execute(
                                "INSERT INTO fts_targets (
                                    collection_id_blob_base64, package_repository_url, name
                                ) VALUES (?1, ?2, ?3)",
                                params![id_b64, row.package_repository_url, row.name],
                            )?;
                        }

                        Ok(())
                    })
                    .await?;
            }

            trie.remove(|(cid, _)| *cid == id_b64);
            for row in &rows.targets {
                trie.insert(
                    &row.name.to_lowercase(),
                    (id_b64.clone(), row.package_identity.clone()),
                );
            }
        }

        cache.put(key, collection.clone());
        Ok(())
    }

    pub async fn remove(
        &self,
        gateway: &Gateway,
        lifecycle: &Lifecycle,
        cache: &Cache,
        trie: &TargetTrie,
        identifier: &CollectionIdentifier,
    ) -> Result<()> {
        lifecycle.ensure_connected(gateway).await?;

        let key = identifier.database_key();
        let _guard = self.write_lock.lock().await;

        {
            let key = key.clone();
            gateway
                .with_connection(move |conn| {
                    conn.execute(
                        "DELETE FROM package_collections WHERE key = ?1",
                        params![key],
                    )?;
                    Ok(())
                })
                .await?;
        }

        if gateway.use_search_indices() {
            let id_b64 = identifier_base64(identifier)?;

            {
                let id_b64 = id_b64.clone();
                gateway
                    .with_transaction(move |tx| {
                        tx.execute(
                            "DELETE FROM fts_packages WHERE collection_id_blob_base64 = ?1",
                            params![id_b64],
                        )?;
                        tx.execute(
                            "DELETE FROM fts_targets WHERE collection_id_blob_base64 = ?1",
                            params![id_b64],
                        )?;
                        Ok(())
                    })
                    .await?;
            }

            trie.remove(|(cid, _)| *cid == id_b64);
        }

        cache.delete(&key);
        Ok(())
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
struct PackageFtsRow {
    id: String,
    version: String,
    name: String,
    repository_url: String,
    summary: String,
    keywords: String,
    products: String,
    targets: String,
}

#[derive(Clone)]
struct TargetFtsRow {
    package_repository_url: String,
    name: String,
    package_identity: collections_core::PackageIdentity,
}

#[derive(Clone, Default)]
struct FtsRows {
    packages: Vec<PackageFtsRow>,
    targets: Vec<TargetFtsRow>,
}

fn build_fts_rows(_id_b64: &str, collection: &Collection) -> FtsRows {
    let mut rows = FtsRows::default();

    for package in &collection.packages {
        let identity = package.identity();
        let repository_url = package.repository.url.to_string();
        let keywords = package.keywords_iter().collect::<Vec<_>>().join(" ");

        for version in &package.versions {
            let products = version
                .products
                .iter()
                .map(|p| p.name.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            let targets = version
                .targets
                .iter()
                .map(|t| t.name.as_str())
                .collect::<Vec<_>>()
                .join(" ");

            rows.packages.push(PackageFtsRow {
                id: identity.as_str().to_string(),
                version: version.version.clone(),
                name: version.package_name.clone(),
                repository_url: repository_url.clone(),
                summary: package.summary.clone().unwrap_or_default(),
                keywords: keywords.clone(),
                products,
                targets,
            });
        }

        let mut seen = HashSet::new();
        for name in package.target_names() {
            if seen.insert(name.to_string()) {
                rows.targets.push(TargetFtsRow {
                    package_repository_url: repository_url.clone(),
                    name: name.to_string(),
                    package_identity: identity.clone(),
                });
            }
        }
    }

    rows
}
