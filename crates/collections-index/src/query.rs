//! Cache-first reads, FTS-path/fallback-scan search, and the `list`
//! chunking/parallel-decode rule (§4.F).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use collections_core::{
    identifier_base64, sort_versions_descending, Collection, CollectionIdentifier, Package,
    PackageIdentity, PackageRepository, Version,
};
use rayon::prelude::*;
use rusqlite::params;

use crate::cache::Cache;
use crate::db::Gateway;
use crate::diagnostics::DiagnosticsSink;
use crate::error::{IndexError, Result};
use crate::lifecycle::Lifecycle;
use crate::trie::TargetTrie;

const LIST_CHUNK_SIZE: usize = 100;
const PARALLEL_DECODE_THRESHOLD: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMatchType {
    ExactMatch,
    Prefix,
}

#[derive(Debug, Clone)]
pub struct PackageSearchHit {
    pub package: Package,
    pub collections: Vec<Collection>,
}

#[derive(Debug, Clone)]
pub struct TargetPackageHit {
    pub repository: PackageRepository,
    pub summary: Option<String>,
    pub versions: Vec<Version>,
    pub collections: Vec<Collection>,
}

#[derive(Debug, Clone)]
pub struct TargetSearchHit {
    pub target: String,
    pub packages: Vec<TargetPackageHit>,
}

/// The read side: `get`, `list`, `searchPackages`, `findPackage`,
/// `searchTargets`, each consulting the cache first and falling back to the
/// DB Gateway (and, for search, either the FTS tables/trie or a linear scan).
pub struct Query {
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl Query {
    pub fn new(diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        Self { diagnostics }
    }

    pub async fn get(
        &self,
        gateway: &Gateway,
        lifecycle: &Lifecycle,
        cache: &Cache,
        identifier: &CollectionIdentifier,
    ) -> Result<Collection> {
        let key = identifier.database_key();
        if let Some(cached) = cache.get(&key) {
            return Ok(cached);
        }

        lifecycle.ensure_connected(gateway).await?;

        let lookup_key = key.clone();
        let value = gateway
            .with_connection(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT value FROM package_collections WHERE key = ?1 LIMIT 1")?;
                let mut rows = stmt.query(params![lookup_key])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row.get::<_, Vec<u8>>(0)?)),
                    None => Ok(None),
                }
            })
            .await?;

        match value {
            Some(bytes) => {
                collections_core::decode_collection(&bytes).map_err(|_| IndexError::Corrupt(key))
            }
            None => Err(IndexError::NotFound(key)),
        }
    }

    pub async fn list(
        &self,
        gateway: &Gateway,
        lifecycle: &Lifecycle,
        cache: &Cache,
        ids: Option<&[CollectionIdentifier]>,
    ) -> Result<Vec<Collection>> {
        let keys = ids.map(|ids| {
            ids.iter()
                .map(CollectionIdentifier::database_key)
                .collect::<Vec<_>>()
        });

        if let Some(keys) = &keys {
            if cache.contains_all(keys) {
                return Ok(cache.get_many(keys));
            }
        }

        lifecycle.ensure_connected(gateway).await?;

        let blobs: Vec<Vec<u8>> = match &keys {
            Some(keys) => {
                let mut all = Vec::new();
                for chunk in keys.chunks(LIST_CHUNK_SIZE) {
                    let chunk = chunk.to_vec();
                    let rows = gateway
                        .with_connection(move |conn| {
                            let placeholders =
                                std::iter::repeat("?").take(chunk.len()).collect::<Vec<_>>().join(",");
                            let sql = format!(
                                "SELECT value FROM package_collections WHERE key IN ({placeholders})"
                            );
                            let mut stmt = conn.prepare(&sql)?;
                            let bound: Vec<&dyn rusqlite::ToSql> =
                                chunk.iter().map(|k| k as &dyn rusqlite::ToSql).collect();
                            let mut rows = stmt.query(bound.as_slice())?;
                            let mut out = Vec::new();
                            while let Some(row) = rows.next()? {
                                out.push(row.get::<_, Vec<u8>>(0)?);
                            }
                            Ok(out)
                        })
                        .await?;
                    all.extend(rows);
                }
                all
            }
            None => {
                gateway
                    .with_connection(|conn| {
                        let mut stmt = conn.prepare("SELECT value FROM package_collections")?;
                        let mut rows = stmt.query([])?;
                        let mut out = Vec::new();
                        while let Some(row) = rows.next()? {
                            out.push(row.get::<_, Vec<u8>>(0)?);
                        }
                        Ok(out)
                    })
                    .await?
            }
        };

        let blob_count = blobs.len();
        let mut decoded: Vec<Collection> = if blob_count < PARALLEL_DECODE_THRESHOLD {
            blobs
                .iter()
                .filter_map(|b| collections_core::decode_collection(b).ok())
                .collect()
        } else {
            blobs
                .par_iter()
                .filter_map(|b| collections_core::decode_collection(b).ok())
                .collect()
        };

        if decoded.len() < blob_count {
            self.diagnostics
                .warn("some stored collections could not be deserialized");
        }

        if let Some(keys) = &keys {
            let order: HashMap<&str, usize> =
                keys.iter().enumerate().map(|(i, k)| (k.as_str(), i)).collect();
            decoded.sort_by_key(|c| {
                order
                    .get(c.identifier.database_key().as_str())
                    .copied()
                    .unwrap_or(usize::MAX)
            });
        }

        Ok(decoded)
    }

    pub async fn search_packages(
        &self,
        gateway: &Gateway,
        lifecycle: &Lifecycle,
        cache: &Cache,
        ids: Option<&[CollectionIdentifier]>,
        query: &str,
    ) -> Result<Vec<PackageSearchHit>> {
        let candidates = self.list(gateway, lifecycle, cache, ids).await?;
        let mut grouped: HashMap<PackageIdentity, PackageSearchHit> = HashMap::new();

        if gateway.use_search_indices() {
            let match_query = query.to_string();
            let hits: Vec<(String, String)> = gateway
                .with_connection(move |conn| {
                    let mut stmt = conn.prepare(
                        "SELECT collection_id_blob_base64, repository_url FROM fts_packages \
                         WHERE fts_packages MATCH ?1",
                    )?;
                    let mut rows = stmt.query(params![match_query])?;
                    let mut out = Vec::new();
                    while let Some(row) = rows.next()? {
                        out.push((row.get(0)?, row.get(1)?));
                    }
                    Ok(out)
                })
                .await?;

            // `fts_packages` carries one row per (collection, package, version), so a
            // package with several versions matching `query` surfaces the same
            // (collection, package) pair once per version row. Dedup on that pair
            // before grouping so a collection is only pushed once per package.
            let mut seen: HashSet<(String, PackageIdentity)> = HashSet::new();
            for (id_b64, repository_url) in hits {
                let identity = PackageIdentity(repository_url);
                if !seen.insert((id_b64.clone(), identity.clone())) {
                    continue;
                }
                for candidate in &candidates {
                    if identifier_base64(&candidate.identifier)? != id_b64 {
                        continue;
                    }
                    if let Some(package) =
                        candidate.packages.iter().find(|p| p.identity() == identity)
                    {
                        grouped
                            .entry(identity.clone())
                            .or_insert_with(|| PackageSearchHit {
                                package: package.clone(),
                                collections: Vec::new(),
                            })
                            .collections
                            .push(candidate.clone());
                    }
                }
            }
        } else {
            let query = query.to_lowercase();
            for candidate in &candidates {
                for package in &candidate.packages {
                    if package_matches_substring(package, &query) {
                        grouped
                            .entry(package.identity())
                            .or_insert_with(|| PackageSearchHit {
                                package: package.clone(),
                                collections: Vec::new(),
                            })
                            .collections
                            .push(candidate.clone());
                    }
                }
            }
        }

        Ok(grouped.into_values().collect())
    }

    pub async fn find_package(
        &self,
        gateway: &Gateway,
        lifecycle: &Lifecycle,
        cache: &Cache,
        identity: &PackageIdentity,
        ids: Option<&[CollectionIdentifier]>,
    ) -> Result<PackageSearchHit> {
        let candidates = self.list(gateway, lifecycle, cache, ids).await?;
        let mut matches: Vec<&Collection> = Vec::new();

        if gateway.use_search_indices() {
            let id_str = identity.as_str().to_string();
            let hit_ids: Vec<String> = gateway
                .with_connection(move |conn| {
                    let mut stmt = conn
                        .prepare("SELECT collection_id_blob_base64 FROM fts_packages WHERE id = ?1")?;
                    let mut rows = stmt.query(params![id_str])?;
                    let mut out = Vec::new();
                    while let Some(row) = rows.next()? {
                        out.push(row.get::<_, String>(0)?);
                    }
                    Ok(out)
                })
                .await?;

            for candidate in &candidates {
                if hit_ids.contains(&identifier_base64(&candidate.identifier)?) {
                    matches.push(candidate);
                }
            }
        } else {
            for candidate in &candidates {
                if candidate.packages.iter().any(|p| p.identity() == *identity) {
                    matches.push(candidate);
                }
            }
        }

        matches.sort_by(|a, b| b.last_processed_at.cmp(&a.last_processed_at));

        let first = matches
            .first()
            .copied()
            .ok_or_else(|| IndexError::PackageNotFound(identity.as_str().to_string()))?;
        let package = first
            .packages
            .iter()
            .find(|p| p.identity() == *identity)
            .expect("a matched collection must contain the identity")
            .clone();

        Ok(PackageSearchHit {
            package,
            collections: matches.into_iter().cloned().collect(),
        })
    }

    pub async fn search_targets(
        &self,
        gateway: &Gateway,
        lifecycle: &Lifecycle,
        cache: &Cache,
        trie: &TargetTrie,
        trie_ready: bool,
        ids: Option<&[CollectionIdentifier]>,
        query: &str,
        match_type: TargetMatchType,
    ) -> Result<Vec<TargetSearchHit>> {
        let query_lower = query.to_lowercase();
        let candidates = self.list(gateway, lifecycle, cache, ids).await?;

        let mut candidates_by_b64: HashMap<String, &Collection> = HashMap::new();
        for candidate in &candidates {
            candidates_by_b64.insert(identifier_base64(&candidate.identifier)?, candidate);
        }

        let mut raw: HashMap<String, Vec<(String, String)>> = HashMap::new();

        if gateway.use_search_indices() && trie_ready {
            let found = match match_type {
                TargetMatchType::ExactMatch => trie.find(&query_lower).map(|values| {
                    let mut map = HashMap::new();
                    map.insert(query_lower.clone(), values);
                    map
                }),
                TargetMatchType::Prefix => trie.find_with_prefix(&query_lower),
            };
            if let Ok(map) = found {
                for (word, values) in map {
                    let entry = raw.entry(word).or_default();
                    for (id_b64, identity) in values {
                        entry.push((id_b64, identity.as_str().to_string()));
                    }
                }
            }
        } else if gateway.use_search_indices() {
            let like_pattern = match match_type {
                TargetMatchType::ExactMatch => query_lower.clone(),
                TargetMatchType::Prefix => format!("{query_lower}%"),
            };
            let rows: Vec<(String, String, String)> = gateway
                .with_connection(move |conn| {
                    let mut stmt = conn.prepare(
                        "SELECT collection_id_blob_base64, package_repository_url, name \
                         FROM fts_targets WHERE name LIKE ?1",
                    )?;
                    let mut rows = stmt.query(params![like_pattern])?;
                    let mut out = Vec::new();
                    while let Some(row) = rows.next()? {
                        out.push((row.get(0)?, row.get(1)?, row.get(2)?));
                    }
                    Ok(out)
                })
                .await?;
            for (id_b64, repository_url, name) in rows {
                raw.entry(name.to_lowercase())
                    .or_default()
                    .push((id_b64, repository_url));
            }
        } else {
            for candidate in &candidates {
                let id_b64 = identifier_base64(&candidate.identifier)?;
                for package in &candidate.packages {
                    let repository_url = package.repository.url.to_string();
                    for version in &package.versions {
                        for target in &version.targets {
                            let name_lower = target.name.to_lowercase();
                            let is_match = match match_type {
                                TargetMatchType::ExactMatch => name_lower == query_lower,
                                TargetMatchType::Prefix => name_lower.starts_with(&query_lower),
                            };
                            if is_match {
                                raw.entry(target.name.clone())
                                    .or_default()
                                    .push((id_b64.clone(), repository_url.clone()));
                            }
                        }
                    }
                }
            }
        }

        let mut hits = Vec::new();
        for (target_name, pairs) in raw {
            let mut by_package: HashMap<PackageIdentity, TargetPackageHit> = HashMap::new();
            for (id_b64, repository_url) in pairs {
                let Some(candidate) = candidates_by_b64.get(&id_b64).copied() else {
                    continue;
                };
                let identity = PackageIdentity(repository_url);
                let Some(package) = candidate.packages.iter().find(|p| p.identity() == identity)
                else {
                    continue;
                };

                by_package
                    .entry(identity)
                    .or_insert_with(|| {
                        let mut versions = package.versions.clone();
                        sort_versions_descending(&mut versions);
                        TargetPackageHit {
                            repository: package.repository.clone(),
                            summary: package.summary.clone(),
                            versions,
                            collections: Vec::new(),
                        }
                    })
                    .collections
                    .push(candidate.clone());
            }

            if !by_package.is_empty() {
                hits.push(TargetSearchHit {
                    target: target_name,
                    packages: by_package.into_values().collect(),
                });
            }
        }

        Ok(hits)
    }
}

/// Fallback-scan predicate (§4.F `searchPackages`, non-FTS path): all
/// haystack fields are lower-cased and compared with a substring `contains`.
fn package_matches_substring(package: &Package, query_lower: &str) -> bool {
    if package
        .repository
        .url
        .as_str()
        .to_lowercase()
        .contains(query_lower)
    {
        return true;
    }
    if let Some(summary) = &package.summary {
        if summary.to_lowercase().contains(query_lower) {
            return true;
        }
    }
    if package
        .keywords_iter()
        .any(|k| k.to_lowercase().contains(query_lower))
    {
        return true;
    }
    for version in &package.versions {
        if version.package_name.to_lowercase().contains(query_lower) {
            return true;
        }
        if version
            .products
            .iter()
            .any(|p| p.name.to_lowercase().contains(query_lower))
        {
            return true;
        }
        if version
            .targets
            .iter()
            .any(|t| t.name.to_lowercase().contains(query_lower))
        {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(url: &str, summary: &str) -> Package {
        Package {
            repository: PackageRepository {
                url: url::Url::parse(url).unwrap(),
            },
            summary: Some(summary.to_string()),
            readme_url: None,
            keywords: None,
            versions: vec![],
        }
    }

    #[test]
    fn substring_match_checks_summary_case_insensitively() {
        let pkg = package("https://example.org/acme/widget", "A Networking Library");
        assert!(package_matches_substring(&pkg, "networking"));
        assert!(!package_matches_substring(&pkg, "unrelated"));
    }

    #[test]
    fn substring_match_checks_repository_url() {
        let pkg = package("https://example.org/acme/widget", "");
        assert!(package_matches_substring(&pkg, "acme"));
    }
}
