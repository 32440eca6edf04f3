use rusqlite::{Connection, OptionalExtension, params};
use std::fs;
use std::path::Path;
use crate::error::{KbenrichError, Result};

/// Migration metadata
struct Migration {
    version: u32,
    name: String,
    sql: String,
}

/// Create schema_migrations table if it doesn't exist
fn ensure_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get list of applied migrations
pub fn get_applied_migrations(conn: &Connection) -> Result<Vec<String>> {
    ensure_migrations_table(conn)?;
    let mut stmt = conn.prepare("SELECT name FROM schema_migrations ORDER BY version")?;
    let names: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
        .map_err(KbenrichError::Database)?;
    Ok(names)
}

/// Load migration files from migrations directory
fn load_migrations(migrations_dir: &Path) -> Result<Vec<Migration>> {
    let entries = fs::read_dir(migrations_dir).map_err(|e| {
        KbenrichError::Config(format!(
            "Cannot read migrations directory {}: {}",
            migrations_dir.display(),
            e
        ))
    })?;

    let mut files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();
    files.sort_by_key(|e| e.file_name());

    let mut migrations = Vec::new();
    for entry in files {
        let path = entry.path();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| KbenrichError::Config("Invalid migration filename".to_string()))?;

        // "001_knowledge_records.sql" -> 1
        let version_str = filename
            .split('_')
            .next()
            .ok_or_else(|| KbenrichError::Config(format!("Invalid migration filename: {}", filename)))?;
        let version: u32 = version_str
            .parse()
            .map_err(|_| KbenrichError::Config(format!("Invalid migration version: {}", version_str)))?;

        let sql = fs::read_to_string(&path).map_err(KbenrichError::Io)?;
        let name = filename.trim_end_matches(".sql").to_string();

        migrations.push(Migration { version, name, sql });
    }

    migrations.sort_by_key(|m| m.version);
    Ok(migrations)
}

/// Run all pending migrations
pub fn run_migrations(conn: &mut Connection, migrations_dir: &Path) -> Result<()> {
    ensure_migrations_table(conn)?;

    let applied = get_applied_migrations(conn)?;
    let migrations = load_migrations(migrations_dir)?;

    for migration in migrations {
        if applied.contains(&migration.name) {
            log::debug!("Migration {} already applied, skipping", migration.name);
            continue;
        }

        log::info!("Applying migration: {} (version {})", migration.name, migration.version);

        let tx = conn.transaction()?;
        tx.execute_batch(&migration.sql).map_err(|e| {
            KbenrichError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("Failed to execute migration {}: {}", migration.name, e)),
            ))
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;

        log::info!("Migration {} applied successfully", migration.name);
    }

    log::debug!("All migrations completed");
    Ok(())
}

/// Whether `table` has a column named `column`.
pub fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2",
            params![table, column],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Add a column unless it is already there.
///
/// The change is recorded in `schema_migrations` under a synthetic name at
/// `version` so later runs and `verify` can see it. Returns true when the
/// column was added by this call.
pub fn ensure_column(
    conn: &mut Connection,
    version: u32,
    table: &str,
    column: &str,
    definition: &str,
) -> Result<bool> {
    ensure_migrations_table(conn)?;
    if column_exists(conn, table, column)? {
        return Ok(false);
    }

    let name = format!("{:03}_add_{}_{}", version, table, column);
    log::info!("Applying migration: {} (version {})", name, version);

    let tx = conn.transaction()?;
    tx.execute_batch(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, definition))?;
    tx.execute(
        "INSERT OR REPLACE INTO schema_migrations (version, name) VALUES (?1, ?2)",
        params![version, name],
    )?;
    tx.commit()?;

    Ok(true)
}
