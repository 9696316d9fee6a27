//! Lazily paged cache of target rows.
//!
//! The cache walks the target in the same key order as the source stream,
//! one page at a time, and only as far as the source has progressed. Every
//! lookup removes its entry, and entries with keys below the requested key
//! are evicted too: the source is ascending, so they can never be asked
//! for again. Memory therefore stays near one page of target rows.

use crate::error::{ReconcileError, Result};
use crate::table::SourceTable;
use mirror_core::{KeyProjection, PrimaryKey, Row};
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct CacheState {
    entries: BTreeMap<PrimaryKey, Row>,
    /// Highest key loaded so far
    high_water: Option<PrimaryKey>,
    exhausted: bool,
    pages_loaded: u64,
    evicted: u64,
}

/// Page-loaded key to row cache over a target table.
///
/// The load-then-read critical section runs under one async mutex, so
/// concurrent lookups can neither load the same page twice nor miss an
/// entry that another lookup just loaded.
pub struct PagedTargetCache<'a, T: SourceTable + ?Sized> {
    target: &'a T,
    projection: KeyProjection,
    page_size: usize,
    state: Mutex<CacheState>,
}

impl<'a, T: SourceTable + ?Sized> PagedTargetCache<'a, T> {
    pub fn new(target: &'a T, projection: KeyProjection, page_size: usize) -> Self {
        Self {
            target,
            projection,
            page_size,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Remove and return the target row under `key`.
    ///
    /// Loads further pages until the highest loaded key reaches `key` or the
    /// target is exhausted. Once exhausted, no further loads happen.
    pub async fn lookup(&self, key: &PrimaryKey) -> Result<Option<Row>> {
        let mut state = self.state.lock().await;
        loop {
            if let Some(row) = state.entries.remove(key) {
                Self::evict_below(&mut state, key);
                return Ok(Some(row));
            }

            let covered = state.high_water.as_ref().is_some_and(|hw| hw >= key);
            if covered || state.exhausted {
                Self::evict_below(&mut state, key);
                return Ok(None);
            }

            self.load_page(&mut state).await?;
        }
    }

    /// Load one more page, returning the number of rows loaded.
    pub async fn load_next_page(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        if state.exhausted {
            return Ok(0);
        }
        self.load_page(&mut state).await
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_exhausted(&self) -> bool {
        self.state.lock().await.exhausted
    }

    pub async fn pages_loaded(&self) -> u64 {
        self.state.lock().await.pages_loaded
    }

    async fn load_page(&self, state: &mut CacheState) -> Result<usize> {
        let rows = self
            .target
            .fetch_page(state.high_water.as_ref(), self.page_size)
            .await?;
        let loaded = rows.len();
        state.pages_loaded += 1;
        if loaded < self.page_size {
            state.exhausted = true;
        }

        for row in rows {
            let key = self.projection.project(&row)?;
            if state.high_water.as_ref().is_some_and(|hw| &key <= hw) {
                return Err(ReconcileError::DataShape(format!(
                    "target page is not strictly ascending at key {key}"
                )));
            }
            state.high_water = Some(key.clone());
            state.entries.insert(key, row);
        }

        debug!(
            page = state.pages_loaded,
            rows = loaded,
            cached = state.entries.len(),
            exhausted = state.exhausted,
            "Loaded target page"
        );
        Ok(loaded)
    }

    fn evict_below(state: &mut CacheState, key: &PrimaryKey) {
        let keep = state.entries.split_off(key);
        let dropped = std::mem::replace(&mut state.entries, keep);
        if !dropped.is_empty() {
            state.evicted += dropped.len() as u64;
            debug!(
                count = dropped.len(),
                total = state.evicted,
                "Evicted unmatched target rows below {key}"
            );
        }
    }
}
