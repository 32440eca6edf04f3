//! Incremental synchronization of bulk rows into the knowledge store.
//!
//! Rows are classified against the hashes stored for their source:
//! - new: no stored record → insert
//! - changed: stored hash differs → upsert
//! - unchanged: same hash → skipped, nothing written
//! - deleted: stored for the source but absent from the batch → removed
//!
//! Bulk rows are written as they are; the document processor never sees them.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::error::{KbenrichError, Result};
use crate::kb::adapter::{KnowledgeBaseAdapter, WriteMode};
use crate::kb::record::SourceRow;
use crate::kb::signature::ContentSignature;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// The store has never held hashes: add the column, write every row.
    InitialLoad,
    /// Write only what changed since the last run.
    IncrementalUpdate,
    /// Ignore stored hashes, rewrite every row and drop rows gone from the source.
    FullReload,
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStrategy::InitialLoad => "initial_load",
            SyncStrategy::IncrementalUpdate => "incremental_update",
            SyncStrategy::FullReload => "full_reload",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncParams {
    pub source: Option<String>,
    pub full_reload: bool,
}

impl SyncParams {
    pub fn for_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            full_reload: false,
        }
    }

    pub fn full_reload(mut self) -> Self {
        self.full_reload = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub run_id: Uuid,
    pub strategy: SyncStrategy,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl SyncSummary {
    fn new(strategy: SyncStrategy) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            strategy,
            inserted: 0,
            updated: 0,
            unchanged: 0,
            deleted: 0,
            failed: 0,
        }
    }

    /// Number of store writes the run performed.
    pub fn writes(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

/// What to do with one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowAction {
    Insert,
    Update,
    Skip,
}

pub struct IncrementalSynchronizer {
    adapter: Arc<KnowledgeBaseAdapter>,
}

impl IncrementalSynchronizer {
    pub fn new(adapter: Arc<KnowledgeBaseAdapter>) -> Self {
        Self { adapter }
    }

    /// Bring the store in line with `rows` for one source.
    ///
    /// Fails before writing anything when the source is missing or the store
    /// cannot read records back. After that, failures are per row: logged,
    /// counted in `failed` and skipped.
    pub async fn synchronize(&self, rows: Vec<SourceRow>, params: SyncParams) -> Result<SyncSummary> {
        let source = match params.source.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => {
                return Err(KbenrichError::ConnectionPrecondition(
                    "a sync source is required".to_string(),
                ))
            }
        };
        let reader = self.adapter.reader().ok_or_else(|| {
            KbenrichError::ConnectionPrecondition(format!(
                "store '{}' cannot read records back",
                self.adapter.store().name()
            ))
        })?;
        self.adapter
            .resolve_write_method(WriteMode::Upsert)
            .map_err(|e| KbenrichError::ConnectionPrecondition(e.to_string()))?;

        let strategy = if params.full_reload {
            SyncStrategy::FullReload
        } else if !reader.has_hash_column().await? {
            SyncStrategy::InitialLoad
        } else {
            SyncStrategy::IncrementalUpdate
        };
        if strategy == SyncStrategy::InitialLoad {
            reader.ensure_hash_column().await?;
        }

        let mut summary = SyncSummary::new(strategy);
        log::info!(
            "Sync run {} started: source={} rows={} strategy={}",
            summary.run_id,
            source,
            rows.len(),
            strategy
        );

        let stored = reader.stored_hashes(&source).await?;
        let mut seen: HashSet<String> = HashSet::with_capacity(rows.len());

        for row in rows {
            let id = row.record_id(&source);
            if !seen.insert(id.clone()) {
                log::warn!("Skipping duplicate row {} in sync batch", id);
                summary.failed += 1;
                continue;
            }

            let hash = ContentSignature::of_row(&row).into_string();
            let action = match (strategy, stored.get(&id)) {
                (_, None) => RowAction::Insert,
                (SyncStrategy::IncrementalUpdate, Some(Some(previous))) if *previous == hash => RowAction::Skip,
                _ => RowAction::Update,
            };

            let mode = match (strategy, action) {
                (_, RowAction::Skip) => {
                    log::debug!("Row {} unchanged", id);
                    summary.unchanged += 1;
                    continue;
                }
                (SyncStrategy::IncrementalUpdate, RowAction::Insert) => WriteMode::Insert,
                _ => WriteMode::Upsert,
            };

            let record = row.to_record(&source, Some(hash));
            match self.adapter.write_records(vec![record], mode).await {
                Ok(_) if action == RowAction::Insert => summary.inserted += 1,
                Ok(_) => summary.updated += 1,
                Err(e) => {
                    log::warn!("Failed to write row {}: {}", id, e);
                    summary.failed += 1;
                }
            }
        }

        if strategy != SyncStrategy::InitialLoad {
            let mut gone: Vec<&String> = stored.keys().filter(|id| !seen.contains(*id)).collect();
            gone.sort();
            for id in gone {
                match self.adapter.remove(std::slice::from_ref(id)).await {
                    Ok(_) => summary.deleted += 1,
                    Err(e) => {
                        log::warn!("Failed to remove row {}: {}", id, e);
                        summary.failed += 1;
                    }
                }
            }
        }

        log::info!(
            "Sync run {} finished: inserted={} updated={} unchanged={} deleted={} failed={}",
            summary.run_id,
            summary.inserted,
            summary.updated,
            summary.unchanged,
            summary.deleted,
            summary.failed
        );
        Ok(summary)
    }
}
