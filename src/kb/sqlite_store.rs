//! SQLite-backed [`KnowledgeStore`].
//!
//! One row per record in `knowledge_records`; metadata is kept as JSON text so
//! filter fields can be read with `json_extract`. The `content_hash` column is
//! not part of the base schema: it is added the first time a synchronizer
//! needs it.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::db::{migrate, Db};
use crate::error::{KbenrichError, Result};
use crate::kb::record::StoreRecord;
use crate::kb::store::{AsyncInsert, AsyncRemove, AsyncUpsert, ContentStore, KnowledgeStore, RecordReader};

const TABLE: &str = "knowledge_records";
const HASH_COLUMN: &str = "content_hash";
/// Version recorded in `schema_migrations` when the hash column is added.
const HASH_COLUMN_VERSION: u32 = 100;

/// Record counts for the `stats` command.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub total_records: i64,
    pub documents: i64,
    pub by_business_unit: BTreeMap<String, i64>,
    pub by_document_type: BTreeMap<String, i64>,
    pub by_source: BTreeMap<String, i64>,
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Db,
}

impl SqliteStore {
    /// Open the store and apply pending migrations.
    pub async fn open(db: Db, migrations_dir: &Path) -> Result<Self> {
        let migrations_dir = migrations_dir.to_path_buf();
        db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
            .await?;
        Ok(Self { db })
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        self.db
            .with_connection(|conn| {
                let total_records: i64 =
                    conn.query_row("SELECT COUNT(*) FROM knowledge_records", [], |row| row.get(0))?;
                let documents: i64 =
                    conn.query_row("SELECT COUNT(DISTINCT doc_id) FROM knowledge_records", [], |row| row.get(0))?;

                Ok(StoreStats {
                    total_records,
                    documents,
                    by_business_unit: group_counts(
                        conn,
                        "json_extract(metadata_json, '$.business_unit')",
                    )?,
                    by_document_type: group_counts(
                        conn,
                        "json_extract(metadata_json, '$.document_type')",
                    )?,
                    by_source: group_counts(conn, "source")?,
                })
            })
            .await
    }

    async fn write(&self, records: &[StoreRecord], upsert: bool) -> Result<()> {
        let records = records.to_vec();
        self.db
            .with_connection(move |conn| {
                let with_hash = migrate::column_exists(conn, TABLE, HASH_COLUMN)?;
                let sql = write_sql(upsert, with_hash);

                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(&sql)?;
                    for record in &records {
                        let metadata_json = serde_json::to_string(&record.metadata)?;
                        if with_hash {
                            stmt.execute(params![
                                record.id,
                                record.doc_id,
                                record.source,
                                record.content,
                                metadata_json,
                                record.content_hash,
                            ])?;
                        } else {
                            stmt.execute(params![
                                record.id,
                                record.doc_id,
                                record.source,
                                record.content,
                                metadata_json,
                            ])?;
                        }
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
    }
}

fn write_sql(upsert: bool, with_hash: bool) -> String {
    let (columns, values) = if with_hash {
        ("id, doc_id, source, content, metadata_json, content_hash", "?1, ?2, ?3, ?4, ?5, ?6")
    } else {
        ("id, doc_id, source, content, metadata_json", "?1, ?2, ?3, ?4, ?5")
    };

    let mut sql = format!("INSERT INTO knowledge_records ({}) VALUES ({})", columns, values);
    if upsert {
        sql.push_str(
            " ON CONFLICT(id) DO UPDATE SET \
             doc_id = excluded.doc_id, \
             source = excluded.source, \
             content = excluded.content, \
             metadata_json = excluded.metadata_json, \
             updated_at = CURRENT_TIMESTAMP",
        );
        if with_hash {
            sql.push_str(", content_hash = excluded.content_hash");
        }
    }
    sql
}

fn group_counts(conn: &Connection, expression: &str) -> Result<BTreeMap<String, i64>> {
    let sql = format!(
        "SELECT COALESCE({expr}, '(none)'), COUNT(*) FROM knowledge_records GROUP BY 1 ORDER BY 1",
        expr = expression
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
    let mut counts = BTreeMap::new();
    for row in rows {
        let (key, count) = row?;
        counts.insert(key, count);
    }
    Ok(counts)
}

fn read_record(row: &Row<'_>, with_hash: bool) -> rusqlite::Result<(StoreRecord, String)> {
    let metadata_json: String = row.get(4)?;
    let record = StoreRecord {
        id: row.get(0)?,
        doc_id: row.get(1)?,
        source: row.get(2)?,
        content: row.get(3)?,
        metadata: serde_json::Value::Null,
        content_hash: if with_hash { row.get(5)? } else { None },
    };
    Ok((record, metadata_json))
}

impl KnowledgeStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn as_async_upsert(&self) -> Option<&dyn AsyncUpsert> {
        Some(self)
    }

    fn as_async_insert(&self) -> Option<&dyn AsyncInsert> {
        Some(self)
    }

    fn as_async_remove(&self) -> Option<&dyn AsyncRemove> {
        Some(self)
    }

    fn as_reader(&self) -> Option<&dyn RecordReader> {
        Some(self)
    }
}

#[async_trait]
impl AsyncInsert for SqliteStore {
    async fn insert(&self, records: &[StoreRecord]) -> Result<()> {
        self.write(records, false).await
    }
}

#[async_trait]
impl AsyncUpsert for SqliteStore {
    async fn upsert(&self, records: &[StoreRecord]) -> Result<()> {
        self.write(records, true).await
    }
}

#[async_trait]
impl AsyncRemove for SqliteStore {
    async fn remove(&self, ids: &[String]) -> Result<usize> {
        let ids = ids.to_vec();
        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                let mut removed = 0;
                for id in &ids {
                    removed += tx.execute("DELETE FROM knowledge_records WHERE id = ?1", params![id])?;
                }
                tx.commit()?;
                Ok(removed)
            })
            .await
    }
}

#[async_trait]
impl RecordReader for SqliteStore {
    async fn get(&self, id: &str) -> Result<Option<StoreRecord>> {
        let id = id.to_string();
        self.db
            .with_connection(move |conn| {
                let with_hash = migrate::column_exists(conn, TABLE, HASH_COLUMN)?;
                let sql = if with_hash {
                    "SELECT id, doc_id, source, content, metadata_json, content_hash FROM knowledge_records WHERE id = ?1"
                } else {
                    "SELECT id, doc_id, source, content, metadata_json FROM knowledge_records WHERE id = ?1"
                };
                let found = conn
                    .query_row(sql, params![id], |row| read_record(row, with_hash))
                    .optional()?;

                match found {
                    Some((mut record, metadata_json)) => {
                        record.metadata = serde_json::from_str(&metadata_json)?;
                        Ok(Some(record))
                    }
                    None => Ok(None),
                }
            })
            .await
    }

    async fn has_hash_column(&self) -> Result<bool> {
        self.db
            .with_connection(|conn| migrate::column_exists(conn, TABLE, HASH_COLUMN))
            .await
    }

    async fn ensure_hash_column(&self) -> Result<()> {
        let added = self
            .db
            .with_connection(|conn| migrate::ensure_column(conn, HASH_COLUMN_VERSION, TABLE, HASH_COLUMN, "TEXT"))
            .await?;
        if added {
            log::info!("Added {} column to {}", HASH_COLUMN, TABLE);
        }
        Ok(())
    }

    async fn stored_hashes(&self, source: &str) -> Result<HashMap<String, Option<String>>> {
        let source = source.to_string();
        self.db
            .with_connection(move |conn| {
                let with_hash = migrate::column_exists(conn, TABLE, HASH_COLUMN)?;
                let sql = if with_hash {
                    "SELECT id, content_hash FROM knowledge_records WHERE source = ?1"
                } else {
                    "SELECT id, NULL FROM knowledge_records WHERE source = ?1"
                };
                let mut stmt = conn.prepare(sql)?;
                let rows = stmt.query_map(params![source], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
                })?;
                let mut hashes = HashMap::new();
                for row in rows {
                    let (id, hash) = row?;
                    hashes.insert(id, hash);
                }
                Ok::<HashMap<String, Option<String>>, KbenrichError>(hashes)
            })
            .await
    }
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn remove_by_doc_id(&self, doc_id: &str, keep: &[String]) -> Result<usize> {
        let doc_id = doc_id.to_string();
        let keep = keep.to_vec();
        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                let mut removed = 0;
                {
                    let mut stmt = tx.prepare("SELECT id FROM knowledge_records WHERE doc_id = ?1")?;
                    let stale: Vec<String> = stmt
                        .query_map(params![doc_id], |row| row.get::<_, String>(0))?
                        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?
                        .into_iter()
                        .filter(|id| !keep.contains(id))
                        .collect();
                    for id in stale {
                        removed += tx.execute("DELETE FROM knowledge_records WHERE id = ?1", params![id])?;
                    }
                }
                tx.commit()?;
                Ok(removed)
            })
            .await
    }
}
