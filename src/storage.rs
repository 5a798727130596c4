//! Secret storage using the OS credential store.
//!
//! On Windows this uses the Credential Manager (via the `keyring` crate), on
//! macOS Keychain, and on Linux the Secret Service API. Only the Realtime
//! Database secret lives here; everything else is in `local_settings`.

use keyring::Entry;
use serde_json::Value;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::config::KEY_DATABASE_SECRET;

const SERVICE_NAME: &str = "attendance-desk";

/// All credential keys managed by this module.
const ALL_KEYS: &[&str] = &[KEY_DATABASE_SECRET];

// ---------------------------------------------------------------------------
// Low-level helpers
// ---------------------------------------------------------------------------

/// Retrieve a single credential from the OS keyring. Returns `None` when the
/// entry does not exist (or the platform returns a "not found" error).
pub fn get_credential(key: &str) -> Option<String> {
    let entry = match Entry::new(SERVICE_NAME, key) {
        Ok(e) => e,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to create entry");
            return None;
        }
    };
    match entry.get_password() {
        Ok(pw) => Some(pw),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to read credential");
            None
        }
    }
}

/// Store a credential in the OS keyring.
pub fn set_credential(key: &str, value: &str) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| e.to_string())?;
    entry.set_password(value).map_err(|e| e.to_string())?;
    Ok(())
}

/// Delete a credential from the OS keyring. Silently succeeds if the entry
/// does not exist.
pub fn delete_credential(key: &str) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| e.to_string())?;
    match entry.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// High-level API
// ---------------------------------------------------------------------------

/// Pull the database secret out of a settings payload.
///
/// Accepts `databaseSecret`, `database_secret` or `secret`. Blank values
/// count as absent.
fn secret_from_payload(payload: &Value) -> Option<Zeroizing<String>> {
    ["databaseSecret", "database_secret", "secret"]
        .iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Zeroizing::new(s.to_string()))
}

/// Store the database secret carried by `payload`, if any.
///
/// Returns whether a secret was written.
pub fn store_database_secret(payload: &Value) -> Result<bool, String> {
    let Some(secret) = secret_from_payload(payload) else {
        return Ok(false);
    };
    set_credential(KEY_DATABASE_SECRET, &secret)
        .map_err(|e| format!("Failed to store database secret: {e}"))?;
    info!("Database secret stored in OS keyring");
    Ok(true)
}

/// Remove every credential managed by this module.
pub fn clear_credentials() -> Result<(), String> {
    for key in ALL_KEYS {
        delete_credential(key)?;
    }
    info!("Cleared stored credentials");
    Ok(())
}
