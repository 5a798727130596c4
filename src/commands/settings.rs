use serde_json::{json, Map, Value};
use std::path::PathBuf;
use tracing::{info, warn};

use super::payload_arg0_as_string;
use crate::config::BackendKind;
use crate::firebase::FirebaseClient;
use crate::store::Backend;
use crate::{db, diagnostics, storage, AppState};

/// Setting keys accepted per category, as `(stored key, accepted aliases)`.
const STORE_KEYS: &[(&str, &[&str])] = &[
    ("backend", &["backend"]),
    ("database_url", &["databaseUrl", "database_url", "url"]),
    ("collection_root", &["collectionRoot", "collection_root"]),
];

const REPORTING_KEYS: &[(&str, &[&str])] = &[
    ("staff_roster", &["staffRoster", "staff_roster", "roster"]),
    ("channels", &["channels", "canais"]),
    ("currency_prefix", &["currencyPrefix", "currency_prefix"]),
];

const SECRET_ALIASES: &[&str] = &["databaseSecret", "database_secret", "secret"];

#[derive(Debug, Default, PartialEq)]
struct SettingsUpdatePayload {
    /// `(category, key, value)` rows for `local_settings`.
    updates: Vec<(String, String, String)>,
    /// Section carrying the database secret, kept out of `local_settings`.
    secret_section: Option<Value>,
}

fn value_to_settings_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn known_keys(category: &str) -> Option<&'static [(&'static str, &'static [&'static str])]> {
    match category {
        "store" => Some(STORE_KEYS),
        "reporting" => Some(REPORTING_KEYS),
        _ => None,
    }
}

fn collect_section(
    category: &str,
    section: &Map<String, Value>,
    parsed: &mut SettingsUpdatePayload,
) -> Result<(), String> {
    let keys = known_keys(category).ok_or_else(|| format!("Unknown settings category: {category}"))?;
    for (name, value) in section {
        if SECRET_ALIASES.contains(&name.as_str()) {
            if category != "store" {
                return Err(format!("Unknown setting: {category}.{name}"));
            }
            parsed.secret_section = Some(Value::Object(section.clone()));
            continue;
        }
        let (stored, _) = keys
            .iter()
            .find(|(_, aliases)| aliases.contains(&name.as_str()))
            .ok_or_else(|| format!("Unknown setting: {category}.{name}"))?;
        parsed.updates.push((
            category.to_string(),
            stored.to_string(),
            value_to_settings_string(value),
        ));
    }
    Ok(())
}

/// Accepts `{ store: {...}, reporting: {...} }` or the bridge form
/// `{ settingType, settings: {...} }`.
fn parse_settings_update_payload(arg0: Option<Value>) -> Result<SettingsUpdatePayload, String> {
    let Some(Value::Object(obj)) = arg0 else {
        return Err("settings update expects an object payload".into());
    };
    let mut parsed = SettingsUpdatePayload::default();

    if let Some(category) = obj
        .get("settingType")
        .or_else(|| obj.get("category"))
        .and_then(Value::as_str)
    {
        let section = obj
            .get("settings")
            .and_then(Value::as_object)
            .ok_or("settings update expects { settingType, settings }")?;
        collect_section(category.trim(), section, &mut parsed)?;
    } else {
        for (category, section) in &obj {
            let section = section
                .as_object()
                .ok_or_else(|| format!("Settings section {category} must be an object"))?;
            collect_section(category, section, &mut parsed)?;
        }
    }

    if parsed.updates.is_empty() && parsed.secret_section.is_none() {
        return Err("No settings to update".into());
    }
    Ok(parsed)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Effective configuration. The database secret is reported as a flag only.
pub fn settings_get(state: &AppState) -> Result<Value, String> {
    let stored = {
        let conn = state.db.conn.lock().map_err(|e| e.to_string())?;
        db::get_all_settings(&conn)?
    };
    let store = &state.config.store;
    let reporting = &state.config.reporting;
    Ok(json!({
        "success": true,
        "store": {
            "backend": store.backend,
            "databaseUrl": store.database_url,
            "collectionRoot": store.collection_root,
            "secretConfigured": store.secret.is_some(),
        },
        "reporting": {
            "staffRoster": reporting.roster,
            "channels": reporting.channels,
            "currencyPrefix": reporting.currency_prefix,
        },
        "stored": stored,
    }))
}

/// Persist settings, validate the resulting configuration and switch the
/// active store. An invalid configuration leaves the stored settings as they
/// were.
pub fn settings_update(arg0: Option<Value>, state: &mut AppState) -> Result<Value, String> {
    let parsed = parse_settings_update_payload(arg0)?;

    {
        let conn = state.db.conn.lock().map_err(|e| e.to_string())?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| format!("settings transaction: {e}"))?;
        for (category, key, value) in &parsed.updates {
            db::set_setting(&tx, category, key, value)?;
        }
        crate::config::AppConfig::load(&tx).map_err(|e| {
            warn!("Rejected settings update: {e}");
            e.to_string()
        })?;
        tx.commit().map_err(|e| format!("settings commit: {e}"))?;
    }

    let secret_stored = match &parsed.secret_section {
        Some(section) => storage::store_database_secret(section)?,
        None => false,
    };

    state.reload()?;
    info!(
        updated = parsed.updates.len(),
        secret_stored,
        backend = ?state.store.kind(),
        "Settings updated"
    );
    settings_get(state)
}

/// Remove the stored credentials and reload.
pub fn settings_clear_secret(state: &mut AppState) -> Result<Value, String> {
    storage::clear_credentials()?;
    state.reload()?;
    Ok(json!({ "success": true }))
}

/// Probe the Realtime Database. A payload with `databaseUrl` tests that URL
/// (and optional secret) before it is saved; otherwise the active store is
/// tested.
pub async fn settings_test_connection(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let candidate = arg0
        .as_ref()
        .and_then(|v| crate::value_str(v, &["databaseUrl", "database_url", "url"]));

    let result = match (candidate, &state.store) {
        (Some(url), _) => {
            let secret = arg0
                .as_ref()
                .and_then(|v| crate::value_str(v, SECRET_ALIASES))
                .map(zeroize::Zeroizing::new);
            FirebaseClient::new(&url, secret)?.test_connectivity().await
        }
        (None, Backend::Firebase(store)) => store.client().test_connectivity().await,
        (None, Backend::Local(_)) => {
            return Ok(json!({
                "success": true,
                "backend": BackendKind::Local,
            }));
        }
    };
    let mut value = serde_json::to_value(&result).map_err(|e| e.to_string())?;
    value["backend"] = json!(BackendKind::Firebase);
    Ok(value)
}

pub fn diagnostics_get_about() -> Value {
    diagnostics::get_about_info()
}

pub fn diagnostics_get_system_health(state: &AppState) -> Result<Value, String> {
    diagnostics::get_system_health(&state.db, &state.config.store)
}

pub fn diagnostics_export(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let dir = payload_arg0_as_string(arg0, &["path", "dir", "exportPath", "export_path"])
        .map(PathBuf::from)
        .ok_or("Missing diagnostics export path")?;
    let path = diagnostics::export_diagnostics(&state.db, &state.config.store, &dir)?;
    info!(path = %path, "Diagnostics exported");
    Ok(json!({ "success": true, "path": path }))
}

#[cfg(test)]
mod dto_tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn parse_settings_update_supports_sections_and_bridge_form() {
        let parsed = parse_settings_update_payload(Some(json!({
            "store": { "backend": "local", "collectionRoot": "lojas/centro" },
            "reporting": { "channels": ["presencial", "tiktok"], "currencyPrefix": "R$" }
        })))
        .expect("sections should parse");
        assert!(parsed.updates.contains(&(
            "store".into(),
            "collection_root".into(),
            "lojas/centro".into()
        )));
        assert!(parsed.updates.contains(&(
            "reporting".into(),
            "channels".into(),
            "[\"presencial\",\"tiktok\"]".into()
        )));
        assert!(parsed.secret_section.is_none());

        let bridge = parse_settings_update_payload(Some(json!({
            "settingType": "store",
            "settings": { "databaseUrl": "loja.firebaseio.com", "databaseSecret": "s3" }
        })))
        .expect("bridge form should parse");
        assert_eq!(
            bridge.updates,
            vec![(
                "store".to_string(),
                "database_url".to_string(),
                "loja.firebaseio.com".to_string()
            )]
        );
        assert!(bridge.secret_section.is_some());
    }

    #[test]
    fn parse_settings_update_rejects_unknown_keys() {
        let err = parse_settings_update_payload(Some(json!({ "store": { "color": "blue" } })))
            .unwrap_err();
        assert!(err.contains("Unknown setting: store.color"));
        let err = parse_settings_update_payload(Some(json!({ "printer": {} }))).unwrap_err();
        assert!(err.contains("Unknown settings category"));
        let err = parse_settings_update_payload(Some(json!({}))).unwrap_err();
        assert!(err.contains("No settings to update"));
    }

    #[test]
    #[serial]
    fn update_persists_and_reloads_configuration() {
        let mut state = crate::test_support::test_state();
        let result = settings_update(
            Some(json!({ "reporting": { "currencyPrefix": "BRL" } })),
            &mut state,
        )
        .expect("update should succeed");
        assert_eq!(result["reporting"]["currencyPrefix"], json!("BRL"));
        assert_eq!(state.config.reporting.currency_prefix, "BRL");
        assert_eq!(result["stored"]["reporting"]["currency_prefix"], json!("BRL"));
    }

    #[test]
    #[serial]
    fn invalid_update_is_rolled_back() {
        let mut state = crate::test_support::test_state();
        let err = settings_update(Some(json!({ "store": { "backend": "firebase" } })), &mut state)
            .expect_err("firebase without url should fail");
        assert!(err.contains("store"));

        let conn = state.db.conn.lock().unwrap();
        assert_eq!(db::get_setting(&conn, "store", "backend"), None);
        drop(conn);
        assert_eq!(state.store.kind(), BackendKind::Local);
    }

    #[tokio::test]
    async fn local_backend_connection_test_is_trivially_ok() {
        let state = crate::test_support::test_state();
        let result = settings_test_connection(None, &state).await.unwrap();
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["backend"], json!("local"));
    }

    #[test]
    fn diagnostics_export_requires_path() {
        let state = crate::test_support::test_state();
        let err = diagnostics_export(Some(json!({})), &state).unwrap_err();
        assert!(err.contains("Missing diagnostics export path"));
    }
}
