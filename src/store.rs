//! Record store: append-only collections, one per category.
//!
//! `append` stamps the payload with both creation timestamps and persists it
//! under a freshly generated key. `fetch_all` returns a whole collection; a
//! collection that does not exist yet is empty, not an error.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::{BackendKind, StoreConfig};
use crate::db::{self, DbState};
use crate::error::StoreError;
use crate::firebase::FirebaseClient;
use crate::records::{Category, CATEGORY_KEY, CREATED_AT_KEY, ID_KEY, TIMESTAMP_KEY};

#[allow(async_fn_in_trait)]
pub trait RecordStore {
    /// Persist one record and return its key. On error nothing was written.
    async fn append(&self, category: Category, payload: Map<String, Value>)
        -> Result<String, StoreError>;

    /// Every stored `key -> payload` of the category's collection.
    async fn fetch_all(&self, category: Category) -> Result<Map<String, Value>, StoreError>;
}

/// Add `timestamp` / `createdAt` for `now`. Keys that only the store may set
/// (`id`, `setor`, and the timestamps themselves) are replaced or dropped.
pub fn stamp_payload(mut payload: Map<String, Value>, now: DateTime<Utc>) -> Map<String, Value> {
    payload.shift_remove(ID_KEY);
    payload.shift_remove(CATEGORY_KEY);
    payload.shift_remove(TIMESTAMP_KEY);
    payload.shift_remove(CREATED_AT_KEY);
    payload.insert(
        TIMESTAMP_KEY.to_string(),
        Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    payload.insert(
        CREATED_AT_KEY.to_string(),
        Value::from(now.timestamp_millis()),
    );
    payload
}

fn pairs_to_map(pairs: Vec<(String, Value)>) -> Map<String, Value> {
    pairs.into_iter().collect()
}

// ---------------------------------------------------------------------------
// Local SQLite backend
// ---------------------------------------------------------------------------

pub struct LocalStore {
    db: Arc<DbState>,
    root: String,
}

impl LocalStore {
    pub fn new(db: Arc<DbState>, root: impl Into<String>) -> Self {
        Self {
            db,
            root: root.into(),
        }
    }
}

impl RecordStore for LocalStore {
    async fn append(
        &self,
        category: Category,
        payload: Map<String, Value>,
    ) -> Result<String, StoreError> {
        let collection = category.collection(&self.root);
        let payload = stamp_payload(payload, Utc::now());
        let conn = self
            .db
            .conn
            .lock()
            .map_err(|e| StoreError::persistence(category, e.to_string()))?;
        let key = db::insert_record(&conn, &collection, &payload).map_err(|e| {
            error!(%category, "Failed to append record: {e}");
            StoreError::persistence(category, e)
        })?;
        info!(%category, key = %key, "Record appended");
        Ok(key)
    }

    async fn fetch_all(&self, category: Category) -> Result<Map<String, Value>, StoreError> {
        let collection = category.collection(&self.root);
        let conn = self
            .db
            .conn
            .lock()
            .map_err(|e| StoreError::fetch(category, e.to_string()))?;
        db::fetch_collection(&conn, &collection)
            .map(pairs_to_map)
            .map_err(|e| StoreError::fetch(category, e))
    }
}

// ---------------------------------------------------------------------------
// Firebase backend
// ---------------------------------------------------------------------------

pub struct FirebaseStore {
    client: FirebaseClient,
    root: String,
}

impl FirebaseStore {
    pub fn new(client: FirebaseClient, root: impl Into<String>) -> Self {
        Self {
            client,
            root: root.into(),
        }
    }

    pub fn client(&self) -> &FirebaseClient {
        &self.client
    }
}

impl RecordStore for FirebaseStore {
    async fn append(
        &self,
        category: Category,
        payload: Map<String, Value>,
    ) -> Result<String, StoreError> {
        let collection = category.collection(&self.root);
        let payload = stamp_payload(payload, Utc::now());
        let key = self.client.push(&collection, &payload).await.map_err(|e| {
            error!(%category, "Failed to append record: {e}");
            StoreError::persistence(category, e)
        })?;
        info!(%category, key = %key, "Record appended");
        Ok(key)
    }

    async fn fetch_all(&self, category: Category) -> Result<Map<String, Value>, StoreError> {
        let collection = category.collection(&self.root);
        self.client
            .fetch(&collection)
            .await
            .map(pairs_to_map)
            .map_err(|e| StoreError::fetch(category, e))
    }
}

// ---------------------------------------------------------------------------
// Backend selection
// ---------------------------------------------------------------------------

/// The store selected by configuration.
pub enum Backend {
    Local(LocalStore),
    Firebase(FirebaseStore),
}

impl Backend {
    pub fn from_config(config: &StoreConfig, db: Arc<DbState>) -> Result<Self, String> {
        match config.backend {
            BackendKind::Local => Ok(Self::Local(LocalStore::new(db, &config.collection_root))),
            BackendKind::Firebase => {
                let client = FirebaseClient::new(&config.database_url, config.secret.clone())?;
                info!(url = client.base_url(), "Using Firebase record store");
                Ok(Self::Firebase(FirebaseStore::new(
                    client,
                    &config.collection_root,
                )))
            }
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Local(_) => BackendKind::Local,
            Self::Firebase(_) => BackendKind::Firebase,
        }
    }
}

impl RecordStore for Backend {
    async fn append(
        &self,
        category: Category,
        payload: Map<String, Value>,
    ) -> Result<String, StoreError> {
        match self {
            Self::Local(s) => s.append(category, payload).await,
            Self::Firebase(s) => s.append(category, payload).await,
        }
    }

    async fn fetch_all(&self, category: Category) -> Result<Map<String, Value>, StoreError> {
        match self {
            Self::Local(s) => s.fetch_all(category).await,
            Self::Firebase(s) => s.fetch_all(category).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use rusqlite::Connection;
    use std::path::PathBuf;
    use std::sync::Mutex;

    pub(crate) fn memory_db() -> Arc<DbState> {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::run_migrations_for_test(&conn);
        Arc::new(DbState {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        })
    }

    pub(crate) fn memory_store() -> LocalStore {
        LocalStore::new(memory_db(), "atendimentos")
    }
}
