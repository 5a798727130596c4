//! Tabular rendering of a filtered record set.
//!
//! The active category filter picks the column set; every cell is resolved
//! through the record's logical fields, so the same column reads `vendedor`,
//! `atendente` or `operador` depending on where the record came from.

use serde::Serialize;
use serde_json::Value;

use crate::config::ReportingConfig;
use crate::records::{payment_method_label, AttendanceRecord, Category, LogicalField};

pub const EMPTY_NOTICE: &str = "Nenhum dado encontrado com os filtros selecionados.";
const MISSING: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Category,
    Date,
    Customer,
    Staff,
    SubType,
    Channel,
    Product,
    Value,
    PaymentMethod,
    Actions,
}

const ALL_COLUMNS: &[(Column, &str)] = &[
    (Column::Category, "Setor"),
    (Column::Date, "Data"),
    (Column::Customer, "Nome do Cliente"),
    (Column::Staff, "Vendedor/Atendente"),
    (Column::SubType, "Tipo"),
    (Column::Channel, "Canal"),
    (Column::Value, "Valor"),
    (Column::Actions, "Ações"),
];

const IN_PERSON_COLUMNS: &[(Column, &str)] = &[
    (Column::Date, "Data"),
    (Column::Staff, "Vendedor"),
    (Column::Customer, "Nome do Cliente"),
    (Column::SubType, "Tipo de Atendimento"),
    (Column::Channel, "Canal"),
    (Column::Product, "Produto"),
    (Column::Value, "Valor"),
    (Column::Actions, "Ações"),
];

const SOCIAL_COLUMNS: &[(Column, &str)] = &[
    (Column::Date, "Data"),
    (Column::Staff, "Atendente"),
    (Column::Customer, "Nome do Cliente"),
    (Column::Channel, "Canal"),
    (Column::SubType, "Tipo de Interação"),
    (Column::Product, "Produto"),
    (Column::Value, "Valor"),
    (Column::Actions, "Ações"),
];

const CASHIER_COLUMNS: &[(Column, &str)] = &[
    (Column::Date, "Data"),
    (Column::Staff, "Operador"),
    (Column::Customer, "Nome do Cliente"),
    (Column::SubType, "Tipo de Operação"),
    (Column::Value, "Valor"),
    (Column::PaymentMethod, "Forma de Pagamento"),
    (Column::Actions, "Ações"),
];

/// Column set for the active category filter (`None` = all categories).
pub fn columns(category: Option<Category>) -> &'static [(Column, &'static str)] {
    match category {
        None => ALL_COLUMNS,
        Some(Category::InPerson) => IN_PERSON_COLUMNS,
        Some(Category::SocialChannel) => SOCIAL_COLUMNS,
        Some(Category::Cashier) => CASHIER_COLUMNS,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub id: String,
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub headers: Vec<&'static str>,
    pub rows: Vec<Row>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<&'static str>,
}

/// Raw text of a monetary value; empty or non-scalar values read as `0`.
fn value_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "0".to_string(),
    }
}

pub fn cell(record: &AttendanceRecord, column: Column, reporting: &ReportingConfig) -> String {
    match column {
        Column::Category => record.category.label().to_string(),
        Column::Date => record
            .created_date()
            .map(|d| d.format("%d/%m/%Y").to_string())
            .unwrap_or_else(|| MISSING.to_string()),
        Column::Customer => record.customer_name().unwrap_or_default().to_string(),
        Column::Staff => record
            .staff()
            .map(|id| reporting.staff_label(id).to_string())
            .unwrap_or_else(|| MISSING.to_string()),
        Column::SubType => record
            .sub_type()
            .map(|v| record.category.sub_type_label(v).unwrap_or(v).to_string())
            .unwrap_or_else(|| MISSING.to_string()),
        Column::Channel => record
            .channel()
            .map(|v| record.category.channel_label(v).unwrap_or(v).to_string())
            .unwrap_or_else(|| MISSING.to_string()),
        Column::Product => record
            .display_product()
            .unwrap_or(MISSING)
            .to_string(),
        Column::Value => match record.key_of(LogicalField::MonetaryValue) {
            Some(key) => format!("{} {}", reporting.currency_prefix, value_text(record.get(key))),
            None => MISSING.to_string(),
        },
        Column::PaymentMethod => record
            .payment_method()
            .map(|v| payment_method_label(v).unwrap_or(v).to_string())
            .unwrap_or_else(|| MISSING.to_string()),
        Column::Actions => record.id.clone(),
    }
}

pub fn render(
    records: &[&AttendanceRecord],
    category: Option<Category>,
    reporting: &ReportingConfig,
) -> Table {
    let columns = columns(category);
    let rows = records
        .iter()
        .map(|record| Row {
            id: record.id.clone(),
            cells: columns
                .iter()
                .map(|(column, _)| cell(record, *column, reporting))
                .collect(),
        })
        .collect::<Vec<_>>();
    Table {
        headers: columns.iter().map(|(_, header)| *header).collect(),
        notice: rows.is_empty().then_some(EMPTY_NOTICE),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::test_support::record;
    use serde_json::json;

    fn sample() -> Vec<AttendanceRecord> {
        vec![
            record(
                Category::InPerson,
                "lf-1",
                "2026-03-05T14:00:00.000Z",
                json!({
                    "vendedor": "kaylane",
                    "canalAtendimento": "presencial",
                    "nomeCliente": "Ana",
                    "tipoAtendimento": "venda-concluida",
                    "produtoVendido": "Vestido",
                    "valorVenda": ""
                }),
            ),
            record(
                Category::Cashier,
                "cx-1",
                "2026-03-06T09:00:00.000Z",
                json!({
                    "operador": "eduarda",
                    "nomeCliente": "Bia",
                    "tipoOperacao": "pagamento-compra",
                    "valorTotal": 120.5,
                    "formaPagamento": "cartao-debito"
                }),
            ),
            record(
                Category::SocialChannel,
                "wi-1",
                "2026-03-07T09:00:00.000Z",
                json!({
                    "atendente": "daniel",
                    "canal": "facebook",
                    "nomeCliente": "Cris",
                    "tipoInteracao": "prova",
                    "produtosProva": "Saia, Blusa"
                }),
            ),
        ]
    }

    #[test]
    fn all_categories_use_generic_columns() {
        let data = sample();
        let all: Vec<&AttendanceRecord> = data.iter().collect();
        let table = render(&all, None, &ReportingConfig::default());
        assert_eq!(table.headers.len(), 8);
        assert_eq!(table.headers[0], "Setor");
        assert!(table.notice.is_none());

        assert_eq!(
            table.rows[0].cells,
            vec![
                "Loja Física",
                "05/03/2026",
                "Ana",
                "Kaylane",
                "Venda Concluída",
                "Presencial",
                "R$ 0",
                "lf-1"
            ]
        );
        // Cashier purchase payments have no channel field.
        assert_eq!(table.rows[1].cells[5], "-");
        assert_eq!(table.rows[1].cells[6], "R$ 120.5");
        // Fittings carry no monetary field.
        assert_eq!(table.rows[2].cells[6], "-");
    }

    #[test]
    fn cashier_columns_show_payment_method() {
        let data = sample();
        let cashier: Vec<&AttendanceRecord> = data
            .iter()
            .filter(|r| r.category == Category::Cashier)
            .collect();
        let table = render(&cashier, Some(Category::Cashier), &ReportingConfig::default());
        assert_eq!(
            table.headers,
            vec![
                "Data",
                "Operador",
                "Nome do Cliente",
                "Tipo de Operação",
                "Valor",
                "Forma de Pagamento",
                "Ações"
            ]
        );
        assert_eq!(table.rows[0].cells[5], "Cartão de Débito");
    }

    #[test]
    fn social_columns_show_fitting_products() {
        let data = sample();
        let social: Vec<&AttendanceRecord> = data
            .iter()
            .filter(|r| r.category == Category::SocialChannel)
            .collect();
        let table = render(&social, Some(Category::SocialChannel), &ReportingConfig::default());
        assert_eq!(table.rows[0].cells[3], "Facebook");
        assert_eq!(table.rows[0].cells[5], "Saia, Blusa");
    }

    #[test]
    fn empty_set_carries_notice() {
        let table = render(&[], Some(Category::InPerson), &ReportingConfig::default());
        assert!(table.rows.is_empty());
        assert_eq!(table.notice, Some(EMPTY_NOTICE));
        assert_eq!(table.headers.len(), 8);
    }
}
