//! Payload-facing command surface.
//!
//! Every command takes loosely shaped JSON from the presentation layer,
//! normalizes it into a typed payload, and answers with
//! `Result<serde_json::Value, String>`.

pub mod attendance;
pub mod reports;
pub mod settings;

use serde_json::Value;

use crate::records::Category;

/// Keys accepted for the category selector in any payload.
pub(crate) const CATEGORY_KEYS: &[&str] = &["category", "setor", "sector"];

pub(crate) fn payload_arg0_as_string(arg0: Option<Value>, keys: &[&str]) -> Option<String> {
    match arg0 {
        Some(Value::String(s)) => {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        }
        Some(payload @ Value::Object(_)) => crate::value_str(&payload, keys),
        _ => None,
    }
}

pub(crate) fn parse_category(raw: Option<String>) -> Result<Category, String> {
    let raw = raw.ok_or("Missing category")?;
    Category::parse(&raw).ok_or_else(|| format!("Unknown category: {raw}"))
}

#[cfg(test)]
mod dto_tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_arg0_as_string_supports_string_and_object() {
        assert_eq!(
            payload_arg0_as_string(Some(json!(" caixa ")), CATEGORY_KEYS),
            Some("caixa".to_string())
        );
        assert_eq!(
            payload_arg0_as_string(Some(json!({ "setor": "caixa" })), CATEGORY_KEYS),
            Some("caixa".to_string())
        );
        assert_eq!(payload_arg0_as_string(Some(json!("  ")), CATEGORY_KEYS), None);
        assert_eq!(payload_arg0_as_string(Some(json!(3)), CATEGORY_KEYS), None);
    }

    #[test]
    fn parse_category_accepts_tag_and_logical_name() {
        assert_eq!(
            parse_category(Some("loja-fisica".into())).unwrap(),
            Category::InPerson
        );
        assert_eq!(
            parse_category(Some("social-channel".into())).unwrap(),
            Category::SocialChannel
        );
        assert!(parse_category(None).unwrap_err().contains("Missing category"));
        assert!(parse_category(Some("balcao".into()))
            .unwrap_err()
            .contains("Unknown category: balcao"));
    }
}
