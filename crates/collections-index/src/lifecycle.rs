//! Idle→Connected→Disconnected state machine, shutdown flag, and
//! close-retry (§4.G).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use collections_core::PackageIdentity;
use tokio::sync::Mutex as AsyncMutex;

use crate::backoff::Backoff;
use crate::db::Gateway;
use crate::error::{IndexError, Result};
use crate::trie::TargetTrie;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Connected,
    Disconnected,
    Error,
}

/// Wraps a [`Gateway`] with the state machine, the `isShuttingDown` flag, and
/// the trie warm-up scheduling/memoization described in §4.G.
pub struct Lifecycle {
    state: AsyncMutex<LifecycleState>,
    is_shutting_down: Arc<AtomicBool>,
    trie_ready: Arc<AtomicBool>,
    warmup_started: Arc<AtomicBool>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AsyncMutex::new(LifecycleState::Idle),
            is_shutting_down: Arc::new(AtomicBool::new(false)),
            trie_ready: Arc::new(AtomicBool::new(false)),
            warmup_started: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Any operation (other than `close`) performed while `Idle` or
    /// `Disconnected` opens the handle and transitions to `Connected`.
    pub async fn ensure_connected(&self, gateway: &Gateway) -> Result<()> {
        let mut state = self.state.lock().await;
        if *state == LifecycleState::Connected && gateway.is_open().await {
            return Ok(());
        }

        match gateway.ensure_open().await {
            Ok(()) => {
                *state = LifecycleState::Connected;
                Ok(())
            }
            Err(e) => {
                *state = LifecycleState::Error;
                Err(e)
            }
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down.load(Ordering::SeqCst)
    }

    pub fn trie_ready(&self) -> bool {
        self.trie_ready.load(Ordering::SeqCst)
    }

    /// Schedules trie warm-up exactly once per instance lifetime. Subsequent
    /// calls are no-ops — `trie_ready` is the memoized "is it safe to use the
    /// trie yet" cell that queries consult afterward.
    pub fn spawn_trie_warmup(self: &Arc<Self>, gateway: Arc<Gateway>, trie: Arc<TargetTrie>) {
        if self.warmup_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let lifecycle = Arc::clone(self);
        tokio::spawn(async move {
            match lifecycle.run_trie_warmup(&gateway, &trie).await {
                Ok(true) => {
                    lifecycle.trie_ready.store(true, Ordering::SeqCst);
                    tracing::debug!("trie warm-up complete");
                }
                Ok(false) => {
                    tracing::debug!(
                        "trie warm-up skipped or aborted; target search stays on the FTS path"
                    );
                }
                Err(error) => {
                    tracing::warn!(%error, "trie warm-up failed; target search stays on the FTS path");
                }
            }
        });
    }

    async fn run_trie_warmup(&self, gateway: &Gateway, trie: &Arc<TargetTrie>) -> Result<bool> {
        gateway.ensure_open().await?;
        if !gateway.use_search_indices() {
            return Ok(false);
        }

        let is_shutting_down = self.is_shutting_down.clone();
        let rows = gateway
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT collection_id_blob_base64, package_repository_url, name FROM fts_targets",
                )?;
                let mut rows = stmt.query([])?;
                let mut collected: Vec<(String, String, String)> = Vec::new();
                while let Some(row) = rows.next()? {
                    if is_shutting_down.load(Ordering::SeqCst) {
                        break;
                    }
                    collected.push((row.get(0)?, row.get(1)?, row.get(2)?));
                }
                Ok(collected)
            })
            .await?;

        if self.is_shutting_down() {
            return Ok(false);
        }

        for (collection_id_b64, package_repository_url, name) in rows {
            trie.insert(
                &name.to_lowercase(),
                (collection_id_b64, PackageIdentity(package_repository_url)),
            );
        }

        Ok(true)
    }

    /// Attempts to close the gateway's connection, retrying with backoff up
    /// to 3 attempts on failure. Always transitions to `Disconnected` on
    /// exit, even when `CloseFailed` is surfaced. Idempotent: a second call
    /// while already `Disconnected` returns immediately without error.
    pub async fn close(&self, gateway: &Gateway) -> Result<()> {
        self.is_shutting_down.store(true, Ordering::SeqCst);

        let mut state = self.state.lock().await;
        if *state != LifecycleState::Connected {
            *state = LifecycleState::Disconnected;
            return Ok(());
        }

        let mut backoff = Backoff::default();
        let result = loop {
            match gateway.try_close_once().await {
                Ok(()) => break Ok(()),
                Err(error) => match backoff.next_delay() {
                    Ok(delay) => {
                        tracing::debug!(%error, ?delay, "close failed, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    Err(_) => {
                        break Err(IndexError::CloseFailed(error.to_string()));
                    }
                },
            }
        };

        *state = LifecycleState::Disconnected;
        result
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
