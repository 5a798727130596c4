//! Application configuration.
//!
//! Sources, highest priority first:
//! 1. `ATTENDANCE_*` environment variables
//! 2. the `local_settings` table (categories `store` and `reporting`)
//! 3. built-in defaults matching the store's current staff and channels
//!
//! The database secret is never kept in the settings table; it comes from
//! `ATTENDANCE_DATABASE_SECRET` or the OS keyring.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::db;
use crate::error::ConfigError;
use crate::records::Category;
use crate::storage;

pub const ENV_PREFIX: &str = "ATTENDANCE_";
pub const DEFAULT_COLLECTION_ROOT: &str = "atendimentos";
pub const DEFAULT_CURRENCY_PREFIX: &str = "R$";
/// Keyring entry holding the Realtime Database secret.
pub const KEY_DATABASE_SECRET: &str = "database_secret";

/// A staff member known to the reporting engine and the forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    /// Value stored in records (e.g. `daniele`).
    pub id: String,
    pub label: String,
    /// Categories whose forms list this member. Empty means all.
    #[serde(default)]
    pub categories: Vec<Category>,
}

impl StaffMember {
    pub fn new(id: &str, label: &str, categories: &[Category]) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            categories: categories.to_vec(),
        }
    }

    pub fn works_in(&self, category: Category) -> bool {
        self.categories.is_empty() || self.categories.contains(&category)
    }
}

pub fn default_roster() -> Vec<StaffMember> {
    use Category::*;
    vec![
        StaffMember::new("daniele", "Daniele", &[InPerson]),
        StaffMember::new("kaylane", "Kaylane", &[InPerson, Cashier]),
        StaffMember::new("fabiola", "Fabiola", &[InPerson]),
        StaffMember::new("eduarda", "Eduarda", &[InPerson, Cashier]),
        StaffMember::new("daniel", "Daniel", &[SocialChannel]),
    ]
}

pub fn default_channels() -> Vec<String> {
    ["presencial", "whatsapp", "instagram", "facebook"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Records kept in the local SQLite database.
    Local,
    /// Firebase Realtime Database over REST.
    Firebase,
}

impl BackendKind {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "local" | "sqlite" => Ok(Self::Local),
            "firebase" | "rtdb" => Ok(Self::Firebase),
            other => Err(ConfigError::InvalidValue {
                field: "store.backend".into(),
                reason: format!("unknown backend '{other}'"),
            }),
        }
    }
}

#[derive(Clone)]
pub struct StoreConfig {
    pub backend: BackendKind,
    pub database_url: String,
    pub collection_root: String,
    pub secret: Option<Zeroizing<String>>,
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("backend", &self.backend)
            .field("database_url", &self.database_url)
            .field("collection_root", &self.collection_root)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
            database_url: String::new(),
            collection_root: DEFAULT_COLLECTION_ROOT.to_string(),
            secret: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportingConfig {
    pub roster: Vec<StaffMember>,
    /// Channels listed in the per-channel breakdown, in display order.
    pub channels: Vec<String>,
    pub currency_prefix: String,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            roster: default_roster(),
            channels: default_channels(),
            currency_prefix: DEFAULT_CURRENCY_PREFIX.to_string(),
        }
    }
}

impl ReportingConfig {
    /// Display label of a stored staff id, or the id itself when unknown.
    pub fn staff_label<'a>(&'a self, id: &'a str) -> &'a str {
        self.roster
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.label.as_str())
            .unwrap_or(id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub reporting: ReportingConfig,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a list setting given either as a JSON array or comma separated text.
fn parse_list(raw: &str) -> Vec<String> {
    if let Ok(arr) = serde_json::from_str::<Vec<String>>(raw) {
        return arr
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_roster(raw: &str) -> Result<Vec<StaffMember>, ConfigError> {
    let roster: Vec<StaffMember> =
        serde_json::from_str(raw).map_err(|e| ConfigError::InvalidValue {
            field: "reporting.staff_roster".into(),
            reason: e.to_string(),
        })?;
    if roster.iter().any(|m| m.id.trim().is_empty()) {
        return Err(ConfigError::InvalidValue {
            field: "reporting.staff_roster".into(),
            reason: "staff member with empty id".into(),
        });
    }
    Ok(roster)
}

impl AppConfig {
    /// Load from environment, the settings table and the OS keyring.
    pub fn load(conn: &Connection) -> Result<Self, ConfigError> {
        Self::from_sources(
            |category, key| db::get_setting(conn, category, key),
            |name| std::env::var(format!("{ENV_PREFIX}{name}")).ok(),
            || storage::get_credential(KEY_DATABASE_SECRET),
        )
    }

    /// Assemble configuration from explicit lookups. `setting(category, key)`
    /// reads the settings table, `env(name)` reads an unprefixed variable
    /// name, `secret()` reads the keyring.
    pub fn from_sources(
        setting: impl Fn(&str, &str) -> Option<String>,
        env: impl Fn(&str) -> Option<String>,
        secret: impl FnOnce() -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let pick = |env_name: &str, category: &str, key: &str| {
            non_empty(env(env_name)).or_else(|| non_empty(setting(category, key)))
        };

        let mut store = StoreConfig::default();
        if let Some(raw) = pick("BACKEND", "store", "backend") {
            store.backend = BackendKind::parse(&raw)?;
        }
        if let Some(url) = pick("DATABASE_URL", "store", "database_url") {
            store.database_url = url;
        }
        if let Some(root) = pick("COLLECTION_ROOT", "store", "collection_root") {
            store.collection_root = root.trim_matches('/').to_string();
        }

        if store.backend == BackendKind::Firebase {
            if store.database_url.is_empty() {
                return Err(ConfigError::NotConfigured {
                    section: "store".into(),
                });
            }
            store.secret = non_empty(env("DATABASE_SECRET"))
                .or_else(|| non_empty(secret()))
                .map(Zeroizing::new);
            if store.secret.is_none() {
                debug!("No database secret configured, using unauthenticated requests");
            }
        }

        let mut reporting = ReportingConfig::default();
        if let Some(raw) = pick("STAFF_ROSTER", "reporting", "staff_roster") {
            reporting.roster = parse_roster(&raw)?;
        }
        if let Some(raw) = pick("CHANNELS", "reporting", "channels") {
            let channels = parse_list(&raw);
            if channels.is_empty() {
                warn!("Configured channel list is empty, keeping defaults");
            } else {
                reporting.channels = channels;
            }
        }
        if let Some(prefix) = pick("CURRENCY_PREFIX", "reporting", "currency_prefix") {
            reporting.currency_prefix = prefix;
        }

        Ok(Self { store, reporting })
    }
}
