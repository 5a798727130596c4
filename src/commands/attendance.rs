use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

use super::{parse_category, payload_arg0_as_string, CATEGORY_KEYS};
use crate::forms;
use crate::records::Category;
use crate::store::RecordStore;
use crate::AppState;

#[derive(Debug, PartialEq)]
struct AttendanceSubmitPayload {
    category: Category,
    values: Value,
}

/// Accepts `{ category, values }` (also `fields` / `data`) or a flat object
/// carrying the category next to the form fields.
fn parse_attendance_submit_payload(arg0: Option<Value>) -> Result<AttendanceSubmitPayload, String> {
    let Some(Value::Object(mut obj)) = arg0 else {
        return Err("attendance submit expects an object payload".into());
    };

    let raw_category = CATEGORY_KEYS
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let category = parse_category(raw_category)?;

    for key in ["values", "fields", "data"] {
        if let Some(values) = obj.remove(key) {
            return Ok(AttendanceSubmitPayload { category, values });
        }
    }

    for key in CATEGORY_KEYS {
        obj.remove(*key);
    }
    Ok(AttendanceSubmitPayload {
        category,
        values: Value::Object(obj),
    })
}

fn success_message(category: Category) -> &'static str {
    match category {
        Category::Cashier => "Operação registrada com sucesso!",
        _ => "Atendimento registrado com sucesso!",
    }
}

pub fn attendance_get_categories() -> Value {
    let categories: Vec<Value> = Category::ALL
        .iter()
        .map(|c| {
            json!({
                "value": c.as_str(),
                "label": c.label(),
                "title": forms::form_spec(*c).title,
            })
        })
        .collect();
    json!({ "success": true, "categories": categories })
}

pub fn attendance_get_form(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let category = parse_category(payload_arg0_as_string(arg0, CATEGORY_KEYS))?;
    Ok(forms::describe_form(
        category,
        &state.config.reporting.roster,
    ))
}

/// Validate a form submission and append it to its category collection.
pub async fn attendance_submit(arg0: Option<Value>, state: &AppState) -> Result<Value, String> {
    let payload = parse_attendance_submit_payload(arg0)?;
    let category = payload.category;

    let record: Map<String, Value> = forms::build_payload(category, &payload.values).map_err(|e| {
        warn!(%category, "Attendance form rejected: {e}");
        e.to_string()
    })?;

    match state.store.append(category, record).await {
        Ok(id) => {
            info!(%category, id = %id, "Attendance submitted");
            Ok(json!({
                "success": true,
                "id": id,
                "message": success_message(category),
            }))
        }
        Err(e) => {
            error!(%category, "Attendance submit failed: {e}");
            Err(e.user_message().to_string())
        }
    }
}

#[cfg(test)]
mod dto_tests {
    use super::*;
    use crate::analytics::load_snapshot;

    #[test]
    fn parse_submit_payload_supports_nested_and_flat_forms() {
        let nested = parse_attendance_submit_payload(Some(json!({
            "category": "caixa",
            "values": { "operador": "kaylane" }
        })))
        .expect("nested payload should parse");
        assert_eq!(nested.category, Category::Cashier);
        assert_eq!(nested.values, json!({ "operador": "kaylane" }));

        let flat = parse_attendance_submit_payload(Some(json!({
            "setor": "loja-fisica",
            "vendedor": "daniele"
        })))
        .expect("flat payload should parse");
        assert_eq!(flat.category, Category::InPerson);
        assert_eq!(flat.values, json!({ "vendedor": "daniele" }));
    }

    #[test]
    fn parse_submit_payload_rejects_missing_category() {
        let err = parse_attendance_submit_payload(Some(json!({ "vendedor": "x" })))
            .expect_err("missing category should fail");
        assert!(err.contains("Missing category"));

        let err = parse_attendance_submit_payload(Some(json!("caixa")))
            .expect_err("string payload should fail");
        assert!(err.contains("object payload"));
    }

    #[test]
    fn categories_list_all_three() {
        let listed = attendance_get_categories();
        let categories = listed["categories"].as_array().unwrap();
        assert_eq!(categories.len(), 3);
        assert_eq!(categories[2]["value"], json!("caixa"));
        assert_eq!(categories[2]["label"], json!("Caixa"));
    }

    #[test]
    fn get_form_accepts_bare_category_string() {
        let state = crate::test_support::test_state();
        let form = attendance_get_form(Some(json!("whatsapp-instagram")), &state).unwrap();
        assert_eq!(form["category"], json!("whatsapp-instagram"));
        assert!(attendance_get_form(None, &state).is_err());
    }

    #[tokio::test]
    async fn submit_persists_one_record_with_cashier_message() {
        let state = crate::test_support::test_state();
        let result = attendance_submit(
            Some(json!({
                "category": "caixa",
                "values": {
                    "operador": "eduarda",
                    "nomeCliente": "Lu",
                    "tipoOperacao": "pagamento-compra",
                    "valorTotal": "45",
                    "formaPagamento": "pix"
                }
            })),
            &state,
        )
        .await
        .expect("submit should succeed");

        assert_eq!(result["success"], json!(true));
        assert_eq!(result["message"], json!("Operação registrada com sucesso!"));

        let snapshot = load_snapshot(&state.store).await.unwrap();
        assert_eq!(snapshot.len(), 1);
        let record = &snapshot.records()[0];
        assert_eq!(record.id, result["id"].as_str().unwrap());
        assert_eq!(record.category, Category::Cashier);
        assert!(record.created_at().is_some());
    }

    #[tokio::test]
    async fn submit_with_missing_required_field_writes_nothing() {
        let state = crate::test_support::test_state();
        let err = attendance_submit(
            Some(json!({
                "category": "loja-fisica",
                "vendedor": "daniele",
                "tipoAtendimento": "venda-concluida"
            })),
            &state,
        )
        .await
        .expect_err("missing customer name should fail");
        assert!(err.contains("Nome do Cliente"));

        let snapshot = load_snapshot(&state.store).await.unwrap();
        assert!(snapshot.is_empty());
    }
}
