//! Durable, concurrent, cache-backed storage and search engine for package
//! collections.
//!
//! [`IndexStore`] is the public surface: `put`, `remove`, `get`, `list`,
//! `search_packages`, `find_package`, `search_targets`, `close` (§6). It
//! wires together the DB Gateway, Lifecycle, Cache, Trie, Index Writer and
//! Query Engine described by the component table in §2.

pub mod backoff;
pub mod cache;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod lifecycle;
pub mod query;
pub mod trie;
pub mod writer;

use std::sync::Arc;

use collections_core::{Collection, CollectionIdentifier, PackageIdentity};

pub use backoff::Backoff;
pub use cache::Cache;
pub use db::{DbLocation, Gateway};
pub use diagnostics::{DiagnosticsSink, TracingDiagnostics};
pub use error::{IndexError, Result};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use query::{PackageSearchHit, TargetMatchType, TargetPackageHit, TargetSearchHit};
pub use trie::{TargetTrie, TargetTrieValue, Trie};
pub use writer::Writer;

use query::Query;

/// The handle callers hold. Cheap to clone the `Arc` fields individually, but
/// the store itself is meant to be constructed once per database and shared
/// behind an `Arc<IndexStore>`.
pub struct IndexStore {
    gateway: Arc<Gateway>,
    lifecycle: Arc<Lifecycle>,
    cache: Arc<Cache>,
    trie: Arc<TargetTrie>,
    writer: Writer,
    query: Query,
}

impl IndexStore {
    pub fn new(location: DbLocation) -> Self {
        Self::with_diagnostics(location, Arc::new(TracingDiagnostics))
    }

    pub fn with_diagnostics(location: DbLocation, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        Self::from_gateway(Gateway::new(location), diagnostics)
    }

    /// Test seam for §8 scenario 4: opens a store whose Gateway pins
    /// `useSearchIndices` to `false` even though FTS4 bootstrap succeeds, so
    /// the fallback-scan search paths can be exercised deterministically.
    pub fn new_with_search_indices_forced_off(location: DbLocation) -> Self {
        Self::from_gateway(
            Gateway::new_with_search_indices_forced_off(location),
            Arc::new(TracingDiagnostics),
        )
    }

    fn from_gateway(gateway: Gateway, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        Self {
            gateway: Arc::new(gateway),
            lifecycle: Arc::new(Lifecycle::new()),
            cache: Arc::new(Cache::new()),
            trie: Arc::new(TargetTrie::new()),
            writer: Writer::new(),
            query: Query::new(diagnostics),
        }
    }

    /// Opens the handle if needed and (idempotently) schedules trie warm-up.
    async fn ensure_ready(&self) -> Result<()> {
        self.lifecycle.ensure_connected(&self.gateway).await?;
        self.lifecycle
            .spawn_trie_warmup(Arc::clone(&self.gateway), Arc::clone(&self.trie));
        Ok(())
    }

    pub async fn put(&self, collection: &Collection) -> Result<()> {
        self.ensure_ready().await?;
        self.writer
            .put(
                &self.gateway,
                &self.lifecycle,
                &self.cache,
                &self.trie,
                collection,
            )
            .await
    }

    pub async fn remove(&self, identifier: &CollectionIdentifier) -> Result<()> {
        self.ensure_ready().await?;
        self.writer
            .remove(
                &self.gateway,
                &self.lifecycle,
                &self.cache,
                &self.trie,
                identifier,
            )
            .await
    }

    pub async fn get(&self, identifier: &CollectionIdentifier) -> Result<Collection> {
        self.ensure_ready().await?;
        self.query
            .get(&self.gateway, &self.lifecycle, &self.cache, identifier)
            .await
    }

    pub async fn list(&self, ids: Option<&[CollectionIdentifier]>) -> Result<Vec<Collection>> {
        self.ensure_ready().await?;
        self.query
            .list(&self.gateway, &self.lifecycle, &self.cache, ids)
            .await
    }

    pub async fn search_packages(
        &self,
        ids: Option<&[CollectionIdentifier]>,
        query: &str,
    ) -> Result<Vec<PackageSearchHit>> {
        self.ensure_ready().await?;
        self.query
            .search_packages(&self.gateway, &self.lifecycle, &self.cache, ids, query)
            .await
    }

    pub async fn find_package(
        &self,
        identity: &PackageIdentity,
        ids: Option<&[CollectionIdentifier]>,
    ) -> Result<PackageSearchHit> {
        self.ensure_ready().await?;
        self.query
            .find_package(&self.gateway, &self.lifecycle, &self.cache, identity, ids)
            .await
    }

    pub async fn search_targets(
        &self,
        ids: Option<&[CollectionIdentifier]>,
        query: &str,
        match_type: TargetMatchType,
    ) -> Result<Vec<TargetSearchHit>> {
        self.ensure_ready().await?;
        let trie_ready = self.lifecycle.trie_ready();
        self.query
            .search_targets(
                &self.gateway,
                &self.lifecycle,
                &self.cache,
                &self.trie,
                trie_ready,
                ids,
                query,
                match_type,
            )
            .await
    }

    /// Idempotent; safe to call even if the handle was never opened.
    pub async fn close(&self) -> Result<()> {
        self.lifecycle.close(&self.gateway).await
    }

    /// Clears the cache without touching the primary table, FTS tables, or
    /// trie. A test seam (§4.C): lets callers verify that reads still
    /// reconstruct the same value straight from the DB Gateway.
    pub fn reset_cache(&self) {
        self.cache.clear();
    }
}
