//! Chart-ready projections: labels plus one or more numeric datasets.
//! Styling is left to the presentation layer.

use chrono::NaiveDate;
use serde::Serialize;

use super::stats::{self, Breakdown, DailyCount, ProductCount, Slice};
use crate::config::ReportingConfig;
use crate::records::{AttendanceRecord, Category};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub label: String,
    pub data: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

impl ChartData {
    fn single(label: &str, labels: Vec<String>, data: Vec<f64>) -> Self {
        Self {
            labels,
            datasets: vec![Dataset {
                label: label.to_string(),
                data,
            }],
        }
    }
}

pub fn customers_per_day(series: &[DailyCount]) -> ChartData {
    ChartData::single(
        "Clientes Atendidos",
        series
            .iter()
            .map(|d| d.date.format("%Y-%m-%d").to_string())
            .collect(),
        series.iter().map(|d| d.count as f64).collect(),
    )
}

pub fn distribution(label: &str, slices: &[Slice]) -> ChartData {
    ChartData::single(
        label,
        slices.iter().map(|s| s.label.clone()).collect(),
        slices.iter().map(|s| s.count as f64).collect(),
    )
}

/// Total records and concluded sales per staff member.
pub fn staff_performance(rows: &[Breakdown]) -> ChartData {
    ChartData {
        labels: rows.iter().map(|r| r.label.clone()).collect(),
        datasets: vec![
            Dataset {
                label: "Total de Atendimentos".into(),
                data: rows.iter().map(|r| r.metrics.total as f64).collect(),
            },
            Dataset {
                label: "Vendas Concluídas".into(),
                data: rows
                    .iter()
                    .map(|r| r.metrics.sales_concluded as f64)
                    .collect(),
            },
        ],
    }
}

pub fn products(label: &str, ranked: &[ProductCount]) -> ChartData {
    ChartData::single(
        label,
        ranked.iter().map(|p| p.product.clone()).collect(),
        ranked.iter().map(|p| p.count as f64).collect(),
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCharts {
    pub customers_per_day: ChartData,
    pub by_category: ChartData,
    pub staff_performance: ChartData,
    pub in_person_sub_types: ChartData,
    pub social_channels: ChartData,
    pub cashier_payment_methods: ChartData,
}

/// Every dashboard chart for `records`, with the daily series ending `today`.
pub fn dashboard(
    records: &[&AttendanceRecord],
    reporting: &ReportingConfig,
    today: NaiveDate,
) -> DashboardCharts {
    DashboardCharts {
        customers_per_day: customers_per_day(&stats::daily_series(
            records,
            today,
            stats::SERIES_DAYS,
        )),
        by_category: distribution(
            "Atendimentos por Setor",
            &stats::category_distribution(records),
        ),
        staff_performance: staff_performance(&stats::staff_breakdown(records, &reporting.roster)),
        in_person_sub_types: distribution(
            "Tipos de Atendimento",
            &stats::sub_type_distribution(records, Category::InPerson),
        ),
        social_channels: distribution(
            "Canais",
            &stats::channel_distribution(records, Category::SocialChannel),
        ),
        cashier_payment_methods: distribution(
            "Formas de Pagamento",
            &stats::payment_method_distribution(records),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::test_support::record;
    use serde_json::json;

    #[test]
    fn dashboard_shapes() {
        let data = vec![
            record(
                Category::SocialChannel,
                "wi",
                "2026-03-10T12:00:00.000Z",
                json!({
                    "atendente": "daniel",
                    "canal": "instagram",
                    "tipoInteracao": "compra-direta",
                    "produtoVendido": "Bolsa",
                    "valorVenda": "80"
                }),
            ),
        ];
        let all: Vec<&AttendanceRecord> = data.iter().collect();
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let charts = dashboard(&all, &ReportingConfig::default(), today);

        assert_eq!(charts.customers_per_day.labels.len(), 30);
        assert_eq!(charts.customers_per_day.labels[29], "2026-03-10");
        assert_eq!(charts.customers_per_day.datasets[0].data[29], 1.0);

        assert_eq!(
            charts.by_category.labels,
            vec!["Loja Física", "WhatsApp/Instagram", "Caixa"]
        );
        assert_eq!(charts.by_category.datasets[0].data, vec![0.0, 1.0, 0.0]);

        assert_eq!(charts.staff_performance.datasets.len(), 2);
        let daniel = charts
            .staff_performance
            .labels
            .iter()
            .position(|l| l == "Daniel")
            .unwrap();
        assert_eq!(charts.staff_performance.datasets[1].data[daniel], 1.0);

        assert_eq!(charts.social_channels.labels[0], "Instagram");
        assert_eq!(charts.social_channels.datasets[0].data[0], 1.0);
    }

    #[test]
    fn product_chart_keeps_ranking_order() {
        let ranked = vec![
            ProductCount {
                product: "Saia".into(),
                count: 3,
            },
            ProductCount {
                product: "Blusa".into(),
                count: 1,
            },
        ];
        let chart = products("Quantidade Vendida", &ranked);
        assert_eq!(chart.labels, vec!["Saia", "Blusa"]);
        assert_eq!(chart.datasets[0].label, "Quantidade Vendida");
        assert_eq!(chart.datasets[0].data, vec![3.0, 1.0]);
    }
}
