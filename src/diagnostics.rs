//! Diagnostics for the attendance desk.
//!
//! Provides:
//! - **About info**: version, build timestamp, git SHA, platform
//! - **System health**: schema version, backend, local record counts
//! - **Diagnostics export**: about + health + redacted settings + logs in a zip
//! - **Log rotation helpers**: used by `lib.rs` to configure rolling log files.

use rusqlite::Connection;
use serde_json::{json, Map, Value};
use std::fs;
use std::io::{Read as _, Write as _};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::warn;

use crate::config::StoreConfig;
use crate::db::{self, DbState};
use crate::records::Category;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum number of log files to retain.
pub const MAX_LOG_FILES: usize = 10;

/// Maximum size per log file copied into a diagnostics bundle (5 MB).
pub const MAX_LOG_SIZE: u64 = 5 * 1024 * 1024;

/// File name prefix of the daily rolling log.
pub const LOG_FILE_PREFIX: &str = "attendance";

// ---------------------------------------------------------------------------
// About info
// ---------------------------------------------------------------------------

/// Returns version, build timestamp, git SHA, and platform info.
pub fn get_about_info() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "buildTimestamp": env!("BUILD_TIMESTAMP"),
        "gitSha": env!("BUILD_GIT_SHA"),
        "platform": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "rustVersion": env!("CARGO_PKG_RUST_VERSION"),
    })
}

// ---------------------------------------------------------------------------
// System health
// ---------------------------------------------------------------------------

fn local_record_counts(conn: &Connection, root: &str) -> Value {
    let mut counts = Map::new();
    for category in Category::ALL {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM attendance_records WHERE collection = ?1",
                [category.collection(root)],
                |row| row.get(0),
            )
            .unwrap_or(0);
        counts.insert(category.as_str().to_string(), json!(count));
    }
    Value::Object(counts)
}

/// Collects health status for the settings screen. Never includes secrets.
pub fn get_system_health(db: &DbState, store: &StoreConfig) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let schema_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);
    let db_size = fs::metadata(&db.db_path).map(|m| m.len()).unwrap_or(0);

    Ok(json!({
        "schemaVersion": schema_version,
        "backend": store.backend,
        "databaseUrl": store.database_url,
        "collectionRoot": store.collection_root,
        "secretConfigured": store.secret.is_some(),
        "localRecords": local_record_counts(&conn, &store.collection_root),
        "dbSizeBytes": db_size,
    }))
}

// ---------------------------------------------------------------------------
// Diagnostics export (zip bundle)
// ---------------------------------------------------------------------------

fn should_redact_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    ["secret", "token", "password", "auth", "key"]
        .iter()
        .any(|marker| key.contains(marker))
}

fn redact_sensitive_fields(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    if should_redact_key(&k) {
                        (k, json!("[REDACTED]"))
                    } else {
                        (k, redact_sensitive_fields(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(redact_sensitive_fields).collect()),
        other => other,
    }
}

fn is_log_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(&format!("{LOG_FILE_PREFIX}.")))
}

/// Writes a diagnostics zip into `output_dir` and returns its path.
pub fn export_diagnostics(
    db: &DbState,
    store: &StoreConfig,
    output_dir: &Path,
) -> Result<String, String> {
    let health = get_system_health(db, store)?;
    let settings = {
        let conn = db.conn.lock().map_err(|e| e.to_string())?;
        redact_sensitive_fields(db::get_all_settings(&conn)?)
    };

    fs::create_dir_all(output_dir)
        .map_err(|e| format!("Failed to create output dir: {e}"))?;
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string();
    let zip_path = output_dir.join(format!("attendance-desk-diagnostics-{timestamp}.zip"));

    let file = fs::File::create(&zip_path)
        .map_err(|e| format!("Failed to create diagnostics zip: {e}"))?;
    let mut zip = zip::ZipWriter::new(file);
    let zip_options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for (name, value) in [
        ("about.json", get_about_info()),
        ("system_health.json", health),
        ("settings.json", settings),
    ] {
        let body = serde_json::to_string_pretty(&value).map_err(|e| e.to_string())?;
        zip.start_file(name, zip_options)
            .map_err(|e| e.to_string())?;
        zip.write_all(body.as_bytes()).map_err(|e| e.to_string())?;
    }

    let log_dir = get_log_dir();
    if let Ok(entries) = fs::read_dir(&log_dir) {
        for path in entries.flatten().map(|e| e.path()).filter(|p| is_log_file(p)) {
            let fname = path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string();
            if zip.start_file(format!("logs/{fname}"), zip_options).is_ok() {
                if let Ok(f) = fs::File::open(&path) {
                    let mut buf = Vec::new();
                    let _ = f.take(MAX_LOG_SIZE).read_to_end(&mut buf);
                    let _ = zip.write_all(&buf);
                }
            }
        }
    }

    zip.finish().map_err(|e| e.to_string())?;
    Ok(zip_path.to_string_lossy().to_string())
}

// ---------------------------------------------------------------------------
// Logs
// ---------------------------------------------------------------------------

pub fn get_log_dir() -> PathBuf {
    let base = std::env::var("LOCALAPPDATA")
        .or_else(|_| std::env::var("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            #[cfg(target_os = "windows")]
            {
                PathBuf::from(std::env::var("USERPROFILE").unwrap_or_else(|_| ".".into()))
                    .join("AppData")
                    .join("Local")
            }
            #[cfg(not(target_os = "windows"))]
            {
                PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                    .join(".local")
                    .join("share")
            }
        });
    base.join("attendance-desk").join("logs")
}

/// Keep the newest [`MAX_LOG_FILES`] log files in `log_dir`.
pub fn prune_old_logs(log_dir: &Path) {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return;
    };

    let mut log_files: Vec<(PathBuf, SystemTime)> = entries
        .flatten()
        .filter(|entry| entry.path().is_file() && is_log_file(&entry.path()))
        .map(|entry| {
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(std::time::UNIX_EPOCH);
            (entry.path(), modified)
        })
        .collect();

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to prune log file {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_about_info_has_required_fields() {
        let info = get_about_info();
        assert!(info.get("version").is_some());
        assert!(info.get("buildTimestamp").is_some());
        assert!(info.get("gitSha").is_some());
        assert!(info.get("platform").is_some());
        assert!(info.get("arch").is_some());
    }

    #[test]
    fn test_log_dir_is_stable() {
        let d1 = get_log_dir();
        assert_eq!(d1, get_log_dir());
        assert!(d1.to_string_lossy().contains("attendance-desk"));
    }

    #[test]
    fn test_system_health_counts_local_records() {
        let dir = std::env::temp_dir().join(format!("diag_test_{}", uuid::Uuid::new_v4()));
        let db_state = db::init(&dir).unwrap();
        {
            let conn = db_state.conn.lock().unwrap();
            db::insert_record(&conn, "atendimentos/caixa", &Map::new()).unwrap();
        }
        let health = get_system_health(&db_state, &StoreConfig::default()).unwrap();
        assert_eq!(health["schemaVersion"], 2);
        assert_eq!(health["backend"], "local");
        assert_eq!(health["localRecords"]["caixa"], 1);
        assert_eq!(health["localRecords"]["loja-fisica"], 0);
        assert_eq!(health["secretConfigured"], false);
        drop(db_state);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_export_diagnostics_redacts_settings() {
        let dir = std::env::temp_dir().join(format!("diag_export_{}", uuid::Uuid::new_v4()));
        let db_state = db::init(&dir).unwrap();
        {
            let conn = db_state.conn.lock().unwrap();
            db::set_setting(&conn, "store", "auth_token", "abc").unwrap();
            db::set_setting(&conn, "store", "backend", "local").unwrap();
        }
        let zip_path = export_diagnostics(&db_state, &StoreConfig::default(), &dir).unwrap();

        let file = fs::File::open(&zip_path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        assert!(archive.len() >= 3);
        let mut settings = String::new();
        archive
            .by_name("settings.json")
            .unwrap()
            .read_to_string(&mut settings)
            .unwrap();
        assert!(settings.contains("[REDACTED]"));
        assert!(!settings.contains("abc"));
        drop(db_state);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_prune_keeps_newest_log_files() {
        let dir = std::env::temp_dir().join(format!("diag_prune_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        for day in 1..=12 {
            fs::write(dir.join(format!("attendance.2026-03-{day:02}")), b"x").unwrap();
        }
        fs::write(dir.join("other.txt"), b"keep").unwrap();

        prune_old_logs(&dir);

        let remaining = fs::read_dir(&dir)
            .unwrap()
            .flatten()
            .filter(|e| is_log_file(&e.path()))
            .count();
        assert_eq!(remaining, MAX_LOG_FILES);
        assert!(dir.join("other.txt").exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_redact_sensitive_fields_recurses() {
        let value = json!({
            "store": { "database_secret": "s", "backend": "firebase" },
            "items": [{ "token": "t" }, { "name": "safe" }]
        });
        let redacted = redact_sensitive_fields(value);
        assert_eq!(redacted["store"]["database_secret"], json!("[REDACTED]"));
        assert_eq!(redacted["store"]["backend"], json!("firebase"));
        assert_eq!(redacted["items"][0]["token"], json!("[REDACTED]"));
        assert_eq!(redacted["items"][1]["name"], json!("safe"));
    }
}
