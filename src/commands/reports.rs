//! Reporting commands. A [`ReportSession`] holds one immutable snapshot;
//! every filter, table, report and export in the session reads from it.

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use tracing::{error, info};

use super::payload_arg0_as_string;
use crate::analytics::{charts, load_snapshot, stats, FilterCriteria, Snapshot};
use crate::config::ReportingConfig;
use crate::error::ExportError;
use crate::export::{self, ExportFormat};
use crate::records::{number_from_value, AttendanceRecord, Category};
use crate::table;
use crate::AppState;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct ReportSession {
    snapshot: Snapshot,
    reporting: ReportingConfig,
}

impl ReportSession {
    pub fn new(snapshot: Snapshot, reporting: ReportingConfig) -> Self {
        Self {
            snapshot,
            reporting,
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    fn select(&self, criteria: &FilterCriteria) -> Vec<&AttendanceRecord> {
        criteria.apply(&self.snapshot.all())
    }
}

/// Load a fresh snapshot from the configured store. A failed load yields no
/// session at all, never a partial one.
pub async fn reports_open_session(state: &AppState) -> Result<ReportSession, String> {
    let snapshot = load_snapshot(&state.store).await.map_err(|e| {
        error!("Report session load failed: {e}");
        e.user_message().to_string()
    })?;
    Ok(ReportSession::new(snapshot, state.config.reporting.clone()))
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct FilterPayload {
    #[serde(default, alias = "dataInicio", alias = "start_date", alias = "from")]
    start_date: Option<String>,
    #[serde(default, alias = "dataFim", alias = "end_date", alias = "to")]
    end_date: Option<String>,
    #[serde(default, alias = "setor", alias = "sector")]
    category: Option<String>,
    #[serde(default, alias = "vendedor", alias = "staffMember")]
    staff: Option<String>,
    #[serde(default, alias = "tipo", alias = "sub_type")]
    sub_type: Option<String>,
    #[serde(default, alias = "canal")]
    channel: Option<String>,
    #[serde(default, alias = "valorMin", alias = "min_value")]
    min_value: Option<Value>,
    #[serde(default, alias = "valorMax", alias = "max_value")]
    max_value: Option<Value>,
    #[serde(default, alias = "busca", alias = "query")]
    search: Option<String>,
}

/// Blank and `all` selectors mean "no constraint".
fn active(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && s != "all" && s != "todos")
}

fn parse_date(raw: Option<String>, which: &str) -> Result<Option<NaiveDate>, String> {
    active(raw)
        .map(|s| {
            NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_err(|_| format!("Invalid {which} date: {s}"))
        })
        .transpose()
}

fn parse_filter_payload(arg0: Option<Value>) -> Result<FilterCriteria, String> {
    let payload = match arg0 {
        Some(Value::Object(mut obj)) => match obj.remove("filters") {
            Some(filters @ Value::Object(_)) => filters,
            _ => Value::Object(obj),
        },
        None | Some(Value::Null) => json!({}),
        Some(_) => return Err("Filter payload must be an object".into()),
    };
    let raw: FilterPayload =
        serde_json::from_value(payload).map_err(|e| format!("Invalid filter payload: {e}"))?;

    let category = active(raw.category)
        .map(|c| Category::parse(&c).ok_or_else(|| format!("Unknown category: {c}")))
        .transpose()?;

    Ok(FilterCriteria {
        start_date: parse_date(raw.start_date, "start")?,
        end_date: parse_date(raw.end_date, "end")?,
        category,
        staff: active(raw.staff),
        sub_type: active(raw.sub_type),
        channel: active(raw.channel),
        min_value: raw.min_value.as_ref().and_then(number_from_value),
        max_value: raw.max_value.as_ref().and_then(number_from_value),
        search: active(raw.search),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportKind {
    General,
    Staff,
    Channels,
    Products,
}

impl ReportKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "geral" | "general" => Some(Self::General),
            "vendedores" | "staff" => Some(Self::Staff),
            "canais" | "channels" => Some(Self::Channels),
            "produtos" | "products" => Some(Self::Products),
            _ => None,
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::General => "Relatório Geral",
            Self::Staff => "Relatório por Vendedor",
            Self::Channels => "Relatório por Canal",
            Self::Products => "Relatório de Produtos",
        }
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| format!("serialize report: {e}"))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub fn reports_dashboard(arg0: Option<Value>, session: &ReportSession) -> Result<Value, String> {
    reports_dashboard_at(arg0, session, Utc::now().date_naive())
}

/// Headline metrics, breakdowns and every chart for the filtered set, with
/// the daily series ending `today`.
pub fn reports_dashboard_at(
    arg0: Option<Value>,
    session: &ReportSession,
    today: NaiveDate,
) -> Result<Value, String> {
    let criteria = parse_filter_payload(arg0)?;
    let records = session.select(&criteria);
    let summary = stats::summarize(&records, &session.reporting);
    let top = stats::top_products(&records, stats::TOP_PRODUCTS_LIMIT);

    Ok(json!({
        "success": true,
        "filters": to_value(&criteria)?,
        "period": stats::period_label(&criteria),
        "summary": to_value(&summary)?,
        "charts": to_value(&charts::dashboard(&records, &session.reporting, today))?,
        "topProducts": {
            "sold": to_value(&charts::products("Quantidade Vendida", &top.sold))?,
            "interest": to_value(&charts::products("Quantidade de Interesse", &top.interest))?,
        },
    }))
}

pub fn reports_filter(arg0: Option<Value>, session: &ReportSession) -> Result<Value, String> {
    let criteria = parse_filter_payload(arg0)?;
    let records = session.select(&criteria);
    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    Ok(json!({
        "success": true,
        "count": records.len(),
        "total": session.snapshot.len(),
        "ids": ids,
    }))
}

pub fn reports_table(arg0: Option<Value>, session: &ReportSession) -> Result<Value, String> {
    let criteria = parse_filter_payload(arg0)?;
    let records = session.select(&criteria);
    let rendered = table::render(&records, criteria.category, &session.reporting);
    Ok(json!({
        "success": true,
        "table": to_value(&rendered)?,
    }))
}

/// One of the four printable reports (`geral`, `vendedores`, `canais`,
/// `produtos`) over the filtered set.
pub fn reports_get(arg0: Option<Value>, session: &ReportSession) -> Result<Value, String> {
    let kind_raw = payload_arg0_as_string(arg0.clone(), &["kind", "report", "tipoRelatorio"])
        .ok_or("Missing report kind")?;
    let kind = ReportKind::parse(&kind_raw).ok_or_else(|| format!("Unknown report: {kind_raw}"))?;
    let criteria = match arg0 {
        Some(Value::String(_)) => FilterCriteria::default(),
        other => parse_filter_payload(other)?,
    };
    let records = session.select(&criteria);
    let reporting = &session.reporting;

    let body = match kind {
        ReportKind::General => {
            let summary = stats::summarize(&records, reporting);
            json!({
                "total": summary.metrics.total,
                "salesConcluded": summary.metrics.sales_concluded,
                "totalValue": summary.metrics.total_value,
                "totalValueText": format!(
                    "{} {:.2}",
                    reporting.currency_prefix, summary.metrics.total_value
                ),
                "conversionRate": summary.metrics.conversion_rate,
                "averagePerDay": summary.average_per_day,
                "byCategory": to_value(&stats::category_distribution(&records))?,
            })
        }
        ReportKind::Staff => to_value(&stats::staff_breakdown(&records, &reporting.roster))?,
        ReportKind::Channels => to_value(&stats::channel_breakdown(&records, &reporting.channels))?,
        ReportKind::Products => to_value(&stats::top_products(&records, stats::TOP_PRODUCTS_LIMIT))?,
    };

    Ok(json!({
        "success": true,
        "title": kind.title(),
        "period": stats::period_label(&criteria),
        "report": body,
    }))
}

pub fn reports_export(
    arg0: Option<Value>,
    session: &ReportSession,
    out_dir: &Path,
) -> Result<Value, String> {
    reports_export_at(arg0, session, out_dir, Utc::now().date_naive())
}

/// Export the filtered set as CSV or XLSX into `out_dir`. An empty set is a
/// no-op answered with the user notice.
pub fn reports_export_at(
    arg0: Option<Value>,
    session: &ReportSession,
    out_dir: &Path,
    today: NaiveDate,
) -> Result<Value, String> {
    let format_raw = payload_arg0_as_string(arg0.clone(), &["format", "formato"])
        .ok_or("Missing export format")?;
    let format =
        ExportFormat::parse(&format_raw).ok_or_else(|| format!("Unknown export format: {format_raw}"))?;
    let criteria = match arg0 {
        Some(Value::String(_)) => FilterCriteria::default(),
        other => parse_filter_payload(other)?,
    };
    let records = session.select(&criteria);

    let file = match export::encode(format, &records, today) {
        Ok(file) => file,
        Err(ExportError::EmptyResult) => {
            info!("Export skipped: no records match the filters");
            return Ok(json!({
                "success": false,
                "message": ExportError::EmptyResult.to_string(),
            }));
        }
        Err(e) => {
            error!("Export failed: {e}");
            return Err(e.to_string());
        }
    };

    let path = export::write_to_dir(&file, out_dir).map_err(|e| {
        error!("Export write failed: {e}");
        e.to_string()
    })?;
    info!(rows = records.len(), path = %path.display(), "Report exported");
    Ok(json!({
        "success": true,
        "path": path.to_string_lossy(),
        "fileName": file.file_name,
        "mimeType": file.mime_type,
        "rows": records.len(),
    }))
}

#[cfg(test)]
mod dto_tests {
    use super::*;
    use crate::records::test_support::record;

    fn session() -> ReportSession {
        let records = vec![
            record(
                Category::InPerson,
                "lf-1",
                "2026-03-09T10:00:00.000Z",
                json!({
                    "vendedor": "daniele",
                    "canalAtendimento": "presencial",
                    "nomeCliente": "Ana",
                    "tipoAtendimento": "venda-concluida",
                    "produtoVendido": "Vestido",
                    "valorVenda": "100"
                }),
            ),
            record(
                Category::InPerson,
                "lf-2",
                "2026-03-10T10:00:00.000Z",
                json!({
                    "vendedor": "kaylane",
                    "canalAtendimento": "whatsapp",
                    "nomeCliente": "Bia",
                    "tipoAtendimento": "venda-nao-concluida",
                    "produtoInteresse": "Saia"
                }),
            ),
            record(
                Category::Cashier,
                "cx-1",
                "2026-03-10T11:00:00.000Z",
                json!({
                    "operador": "eduarda",
                    "nomeCliente": "Cris",
                    "tipoOperacao": "pagamento-compra",
                    "valorTotal": "50",
                    "formaPagamento": "pix"
                }),
            ),
        ];
        ReportSession::new(Snapshot::new(records), ReportingConfig::default())
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    #[test]
    fn parse_filter_payload_supports_aliases_and_all() {
        let criteria = parse_filter_payload(Some(json!({
            "filters": {
                "dataInicio": "2026-03-01",
                "dataFim": "2026-03-31",
                "setor": "all",
                "vendedor": "daniele",
                "valorMin": "10,5",
                "busca": "  "
            }
        })))
        .expect("filters should parse");
        assert_eq!(criteria.start_date, NaiveDate::from_ymd_opt(2026, 3, 1));
        assert_eq!(criteria.end_date, NaiveDate::from_ymd_opt(2026, 3, 31));
        assert_eq!(criteria.category, None);
        assert_eq!(criteria.staff.as_deref(), Some("daniele"));
        assert_eq!(criteria.min_value, Some(10.5));
        assert_eq!(criteria.search, None);

        assert!(parse_filter_payload(None).unwrap().is_unconstrained());
    }

    #[test]
    fn parse_filter_payload_rejects_bad_dates_and_categories() {
        let err = parse_filter_payload(Some(json!({ "startDate": "10/03/2026" }))).unwrap_err();
        assert!(err.contains("Invalid start date"));
        let err = parse_filter_payload(Some(json!({ "category": "balcao" }))).unwrap_err();
        assert!(err.contains("Unknown category"));
    }

    #[test]
    fn dashboard_reports_filtered_summary() {
        let session = session();
        let dashboard = reports_dashboard_at(
            Some(json!({ "category": "loja-fisica" })),
            &session,
            day(),
        )
        .unwrap();
        assert_eq!(dashboard["summary"]["total"], json!(2));
        assert_eq!(dashboard["summary"]["salesConcluded"], json!(1));
        assert_eq!(dashboard["summary"]["conversionRate"], json!(50.0));
        assert_eq!(dashboard["period"], json!(stats::ALL_PERIODS_LABEL));
        assert_eq!(dashboard["topProducts"]["sold"]["labels"], json!(["Vestido"]));
        assert_eq!(
            dashboard["charts"]["customersPerDay"]["labels"]
                .as_array()
                .unwrap()
                .len(),
            30
        );
    }

    #[test]
    fn filter_and_table_share_criteria() {
        let session = session();
        let filtered = reports_filter(Some(json!({ "search": "saia" })), &session).unwrap();
        assert_eq!(filtered["count"], json!(1));
        assert_eq!(filtered["total"], json!(3));
        assert_eq!(filtered["ids"], json!(["lf-2"]));

        let table = reports_table(Some(json!({ "category": "caixa" })), &session).unwrap();
        assert_eq!(table["table"]["rows"].as_array().unwrap().len(), 1);
        assert_eq!(table["table"]["headers"][1], json!("Operador"));

        let empty = reports_table(Some(json!({ "staff": "ninguem" })), &session).unwrap();
        assert_eq!(empty["table"]["notice"], json!(table::EMPTY_NOTICE));
    }

    #[test]
    fn general_report_counts_cashier_value_but_not_sale() {
        let session = session();
        let report = reports_get(
            Some(json!({
                "kind": "geral",
                "startDate": "2026-03-01",
                "endDate": "2026-03-10"
            })),
            &session,
        )
        .unwrap();
        assert_eq!(report["title"], json!("Relatório Geral"));
        assert_eq!(report["period"], json!("01/03/2026 a 10/03/2026"));
        assert_eq!(report["report"]["total"], json!(3));
        assert_eq!(report["report"]["salesConcluded"], json!(1));
        assert_eq!(report["report"]["totalValue"], json!(150.0));
        assert_eq!(report["report"]["totalValueText"], json!("R$ 150.00"));

        let products = reports_get(Some(json!("produtos")), &session).unwrap();
        assert_eq!(products["report"]["interest"][0]["product"], json!("Saia"));

        assert!(reports_get(Some(json!("mensal")), &session).is_err());
    }

    #[test]
    fn export_writes_named_file() {
        let dir = std::env::temp_dir().join(format!("reports_export_{}", uuid::Uuid::new_v4()));
        let session = session();
        let result = reports_export_at(
            Some(json!({ "format": "csv", "category": "caixa" })),
            &session,
            &dir,
            day(),
        )
        .unwrap();
        assert_eq!(result["success"], json!(true));
        assert_eq!(result["fileName"], json!("report_2026-03-10.csv"));
        assert_eq!(result["rows"], json!(1));
        let written = std::fs::read_to_string(result["path"].as_str().unwrap()).unwrap();
        assert!(written.contains("\"Cris\""));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn export_of_empty_set_is_a_noop_with_notice() {
        let dir = std::env::temp_dir().join(format!("reports_empty_{}", uuid::Uuid::new_v4()));
        let result = reports_export_at(
            Some(json!({ "format": "xlsx", "staff": "ninguem" })),
            &session(),
            &dir,
            day(),
        )
        .unwrap();
        assert_eq!(result["success"], json!(false));
        assert_eq!(result["message"], json!("Não há dados para exportar."));
        assert!(!dir.exists());
    }
}
