//! Attendance Desk backend.
//!
//! Records customer attendances for the three store sectors (shop floor,
//! WhatsApp/Instagram and cashier) and turns the stored records into
//! dashboards, tables, reports and CSV/XLSX exports. The presentation layer
//! talks to the [`commands`] module with JSON payloads.

use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod analytics;
pub mod commands;
pub mod config;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod export;
pub mod firebase;
pub mod forms;
pub mod records;
pub mod storage;
pub mod store;
pub mod table;

pub use config::AppConfig;
pub use db::DbState;
pub use error::{ConfigError, ExportError, FormError, StoreError};
pub use records::{AttendanceRecord, Category};
pub use store::{Backend, RecordStore};

pub(crate) fn value_str(v: &serde_json::Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = v.get(*key).and_then(|x| x.as_str()) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// Everything a command needs: the local database, the effective
/// configuration and the record store it selects.
pub struct AppState {
    pub db: Arc<DbState>,
    pub config: AppConfig,
    pub store: Backend,
}

fn load_config(db: &DbState) -> Result<AppConfig, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    AppConfig::load(&conn).map_err(|e| e.to_string())
}

impl AppState {
    /// Open (or create) the database under `app_data_dir` and load config.
    pub fn init(app_data_dir: &Path) -> Result<Self, String> {
        let db = Arc::new(db::init(app_data_dir)?);
        Self::from_db(db)
    }

    pub fn from_db(db: Arc<DbState>) -> Result<Self, String> {
        let config = load_config(&db)?;
        let store = Backend::from_config(&config.store, Arc::clone(&db))?;
        info!(
            backend = ?store.kind(),
            root = %config.store.collection_root,
            "Attendance store ready"
        );
        Ok(Self { db, config, store })
    }

    /// Re-read configuration and rebuild the store. On error the current
    /// state is kept.
    pub fn reload(&mut self) -> Result<(), String> {
        let config = load_config(&self.db)?;
        self.store = Backend::from_config(&config.store, Arc::clone(&self.db))?;
        self.config = config;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Startup
// ---------------------------------------------------------------------------

/// Install console + daily rolling file logging. Keep the returned guard
/// alive for the lifetime of the process; dropping it flushes the file log.
pub fn init_logging(log_dir: &Path) -> WorkerGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,attendance_desk=debug"));

    // Prune old log files before setting up the appender
    diagnostics::prune_old_logs(log_dir);
    std::fs::create_dir_all(log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(log_dir, diagnostics::LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}

/// Logging plus application state, in that order.
pub fn start(app_data_dir: &Path) -> Result<(AppState, WorkerGuard), String> {
    let guard = init_logging(&diagnostics::get_log_dir());
    info!("Starting Attendance Desk v{}", env!("CARGO_PKG_VERSION"));
    let state = AppState::init(app_data_dir)?;
    Ok((state, guard))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::store::{test_support::memory_db, LocalStore};

    /// Local-backend state over an in-memory database with default config.
    pub(crate) fn test_state() -> AppState {
        let db = memory_db();
        AppState {
            store: Backend::Local(LocalStore::new(
                Arc::clone(&db),
                config::DEFAULT_COLLECTION_ROOT,
            )),
            db,
            config: AppConfig::default(),
        }
    }
}
