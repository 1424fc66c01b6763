//! Store bootstrap: connection setup, schema migrations, ingestion checkpoint.

use crate::sqlite_pragma::apply_optimized_pragmas;
use rusqlite::{Connection, OptionalExtension};
use std::fs;
use std::path::Path;

/// Schema shipped with the crate, for tests and local runs.
pub const BUNDLED_SCHEMA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/sql");

/// Run schema migrations from SQL files
///
/// Reads all .sql files from `schema_dir` in lexical order (00_, 01_, ...)
/// and executes them. Every file must use `IF NOT EXISTS` so reruns are no-ops.
pub fn run_schema_migrations(
    conn: &mut Connection,
    schema_dir: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let schema_path = Path::new(schema_dir);

    if !schema_path.exists() {
        return Err(format!("Schema directory not found: {}", schema_dir).into());
    }

    let mut sql_files: Vec<_> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();

    sql_files.sort_by_key(|entry| entry.file_name());

    log::info!("🔧 Running schema migrations from: {}", schema_dir);

    for entry in sql_files {
        let path = entry.path();
        let filename = entry.file_name().to_string_lossy().into_owned();

        log::info!("   ├─ Executing: {}", filename);
        let sql_content = fs::read_to_string(&path)?;
        conn.execute_batch(&sql_content)?;
    }

    log::info!("✅ All schema migrations completed successfully");

    Ok(())
}

/// Open (creating if needed) the store at `db_path`, tuned and migrated.
pub fn open_store(
    db_path: impl AsRef<Path>,
    schema_dir: &str,
) -> Result<Connection, Box<dyn std::error::Error>> {
    if let Some(parent) = db_path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                format!("Failed to create database directory {}: {}", parent.display(), e)
            })?;
        }
    }

    let mut conn = Connection::open(db_path)?;
    apply_optimized_pragmas(&conn)?;
    run_schema_migrations(&mut conn, schema_dir)?;
    Ok(conn)
}

/// Highest fully ingested block as `(height, hash)`.
pub fn ingestion_checkpoint(conn: &Connection) -> rusqlite::Result<Option<(u64, String)>> {
    conn.query_row(
        "SELECT height, hash FROM blocks ORDER BY height DESC LIMIT 1",
        [],
        |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, String>(1)?)),
    )
    .optional()
}
