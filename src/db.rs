//! Local SQLite database layer for the attendance desk.
//!
//! Uses rusqlite with WAL mode. Provides schema migrations, settings helpers,
//! and the `attendance_records` table backing the local record store.

use rusqlite::{params, Connection, ErrorCode};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Shared state holding the database connection.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Initialize the database at `{app_data_dir}/attendance.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations. A file SQLite reports as corrupt or not
/// a database is moved aside to `attendance.db.corrupt-<ts>` and a fresh one
/// is created. Every other open failure is returned; records are never
/// removed.
pub fn init(app_data_dir: &Path) -> Result<DbState, String> {
    fs::create_dir_all(app_data_dir).map_err(|e| format!("Failed to create data dir: {e}"))?;

    let db_path = app_data_dir.join("attendance.db");
    info!("Opening database at {}", db_path.display());

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) if is_corruption(&first_err) => {
            let moved = quarantine(&db_path)?;
            warn!(
                "Database at {} is unreadable ({first_err}), moved to {} and recreating",
                db_path.display(),
                moved.display()
            );
            open_and_configure(&db_path)
                .map_err(|e| format!("Database open failed after quarantine: {e}"))?
        }
        Err(e) => {
            error!("Database open failed: {e}");
            return Err(format!("Database open failed: {e}"));
        }
    };

    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

fn is_corruption(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt)
    )
}

/// Rename the database (and its WAL/SHM side files) out of the way.
fn quarantine(db_path: &Path) -> Result<PathBuf, String> {
    let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
    let moved = PathBuf::from(format!("{}.corrupt-{stamp}", db_path.display()));
    fs::rename(db_path, &moved).map_err(|e| format!("Failed to move unreadable database: {e}"))?;
    for suffix in ["-wal", "-shm"] {
        let side = PathBuf::from(format!("{}{suffix}", db_path.display()));
        if side.exists() {
            let target = PathBuf::from(format!("{}{suffix}", moved.display()));
            fs::rename(&side, &target)
                .map_err(|e| format!("Failed to move database side file: {e}"))?;
        }
    }
    Ok(moved)
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("create schema_version: {e}"))?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Migration v1: settings store.
fn migrate_v1(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS local_settings (
            id TEXT PRIMARY KEY DEFAULT (lower(hex(randomblob(16)))),
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now')),
            updated_at TEXT DEFAULT (datetime('now')),
            UNIQUE(setting_category, setting_key)
        );

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        format!("migration v1: {e}")
    })?;

    info!("Applied migration v1 (local_settings)");
    Ok(())
}

/// Migration v2: append-only record collections.
fn migrate_v2(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS attendance_records (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            collection TEXT NOT NULL,
            record_key TEXT NOT NULL UNIQUE,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_attendance_records_collection
            ON attendance_records(collection, seq);

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        format!("migration v2: {e}")
    })?;

    info!("Applied migration v2 (attendance_records)");
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

/// Get a single setting value.
pub fn get_setting(conn: &Connection, category: &str, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT setting_value FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
        |row| row.get(0),
    )
    .ok()
}

/// Insert or update a setting.
pub fn set_setting(
    conn: &Connection,
    category: &str,
    key: &str,
    value: &str,
) -> Result<(), String> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )
    .map_err(|e| format!("set_setting: {e}"))?;
    Ok(())
}

/// Get all settings grouped by category as JSON.
pub fn get_all_settings(conn: &Connection) -> Result<Value, String> {
    let mut stmt = conn
        .prepare(
            "SELECT setting_category, setting_key, setting_value FROM local_settings
             ORDER BY setting_category, setting_key",
        )
        .map_err(|e| format!("get_all_settings prepare: {e}"))?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .map_err(|e| format!("get_all_settings query: {e}"))?;

    let mut result = Map::new();
    for (cat, key, val) in rows.flatten() {
        let category = result
            .entry(cat)
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(ref mut map) = category {
            map.insert(key, Value::String(val));
        }
    }

    Ok(Value::Object(result))
}

// ---------------------------------------------------------------------------
// Record collections
// ---------------------------------------------------------------------------

/// Append a payload to `collection` and return its generated key.
pub fn insert_record(
    conn: &Connection,
    collection: &str,
    payload: &Map<String, Value>,
) -> Result<String, String> {
    let key = uuid::Uuid::new_v4().to_string();
    let body = serde_json::to_string(payload).map_err(|e| format!("serialize payload: {e}"))?;
    conn.execute(
        "INSERT INTO attendance_records (collection, record_key, payload) VALUES (?1, ?2, ?3)",
        params![collection, key, body],
    )
    .map_err(|e| format!("insert_record: {e}"))?;
    Ok(key)
}

/// Every `(key, payload)` pair of `collection` in insertion order.
///
/// Rows whose payload no longer parses are skipped with a warning.
pub fn fetch_collection(conn: &Connection, collection: &str) -> Result<Vec<(String, Value)>, String> {
    let mut stmt = conn
        .prepare(
            "SELECT record_key, payload FROM attendance_records
             WHERE collection = ?1 ORDER BY seq ASC",
        )
        .map_err(|e| format!("fetch_collection prepare: {e}"))?;

    let rows = stmt
        .query_map(params![collection], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(|e| format!("fetch_collection query: {e}"))?;

    let mut out = Vec::new();
    for row in rows {
        let (key, body) = row.map_err(|e| format!("fetch_collection row: {e}"))?;
        match serde_json::from_str::<Value>(&body) {
            Ok(payload) => out.push((key, payload)),
            Err(e) => warn!(collection, key = %key, "Skipping unreadable record payload: {e}"),
        }
    }
    Ok(out)
}

/// Run all migrations on the given connection (test helper, not public API).
#[cfg(test)]
pub fn run_migrations_for_test(conn: &Connection) {
    run_migrations(conn).expect("run_migrations should succeed in test");
}

// ===========================================================================
// Tests
// ===========================================================================
