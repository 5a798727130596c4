use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

use crate::records::{AttendanceRecord, Category, LogicalField};

/// Active filter criteria. Every field is optional; `None` means no
/// constraint. A record passes when every active criterion matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    pub start_date: Option<NaiveDate>,
    /// Inclusive through the last millisecond of the day.
    pub end_date: Option<NaiveDate>,
    pub category: Option<Category>,
    pub staff: Option<String>,
    pub sub_type: Option<String>,
    pub channel: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub search: Option<String>,
}

impl FilterCriteria {
    pub fn is_unconstrained(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        self.matches_category(record)
            && self.matches_staff(record)
            && self.matches_sub_type(record)
            && self.matches_channel(record)
            && self.matches_value(record)
            && self.matches_search(record)
            && self.matches_dates(record)
    }

    /// Records passing every criterion, in input order.
    pub fn apply<'a>(&self, records: &[&'a AttendanceRecord]) -> Vec<&'a AttendanceRecord> {
        records.iter().copied().filter(|r| self.matches(r)).collect()
    }

    fn matches_category(&self, record: &AttendanceRecord) -> bool {
        self.category.map_or(true, |c| record.category == c)
    }

    fn matches_staff(&self, record: &AttendanceRecord) -> bool {
        match &self.staff {
            None => true,
            Some(staff) => record.staff() == Some(staff.as_str()),
        }
    }

    fn matches_sub_type(&self, record: &AttendanceRecord) -> bool {
        match &self.sub_type {
            None => true,
            Some(sub_type) => record.sub_type() == Some(sub_type.as_str()),
        }
    }

    /// Records without a channel field (cashier operations other than
    /// installments) are not constrained.
    fn matches_channel(&self, record: &AttendanceRecord) -> bool {
        let Some(channel) = &self.channel else {
            return true;
        };
        if record.key_of(LogicalField::Channel).is_none() {
            return true;
        }
        record.channel() == Some(channel.as_str())
    }

    /// Records without a monetary field, or whose value does not parse, are
    /// not constrained.
    fn matches_value(&self, record: &AttendanceRecord) -> bool {
        if self.min_value.is_none() && self.max_value.is_none() {
            return true;
        }
        let Some(value) = record.monetary_value() else {
            return true;
        };
        self.min_value.map_or(true, |min| value >= min)
            && self.max_value.map_or(true, |max| value <= max)
    }

    /// Case-insensitive substring of the customer name or of the searchable
    /// product. Notes are never searched.
    fn matches_search(&self, record: &AttendanceRecord) -> bool {
        let Some(term) = self.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
            return true;
        };
        let needle = term.to_lowercase();
        let contains = |hay: Option<&str>| hay.is_some_and(|h| h.to_lowercase().contains(&needle));
        contains(record.customer_name()) || contains(record.search_product())
    }

    /// Records without a readable creation time fail an active date bound.
    fn matches_dates(&self, record: &AttendanceRecord) -> bool {
        if self.start_date.is_none() && self.end_date.is_none() {
            return true;
        }
        let Some(created) = record.created_at() else {
            return false;
        };
        let created = created.naive_utc();
        if let Some(start) = self.start_date {
            if created < start.and_time(NaiveTime::MIN) {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            let end_of_day = end
                .and_hms_milli_opt(23, 59, 59, 999)
                .unwrap_or_else(|| end.and_time(NaiveTime::MIN));
            if created > end_of_day {
                return false;
            }
        }
        true
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
                "2026-03-01T10:00:00.000Z",
                json!({
                    "vendedor": "daniele",
                    "canalAtendimento": "presencial",
                    "nomeCliente": "Maria Souza",
                    "tipoAtendimento": "venda-concluida",
                    "produtoVendido": "Vestido Floral",
                    "valorVenda": "150",
                    "observacoes": "cliente pediu embrulho azul"
                }),
            ),
            record(
                Category::InPerson,
                "lf-2",
                "2026-03-02T15:30:00.000Z",
                json!({
                    "vendedor": "fabiola",
                    "canalAtendimento": "whatsapp",
                    "nomeCliente": "Joana",
                    "tipoAtendimento": "venda-nao-concluida",
                    "produtoInteresse": "Sandália Dourada",
                    "motivoNaoCompra": "preco"
                }),
            ),
            record(
                Category::SocialChannel,
                "wi-1",
                "2026-03-03T09:00:00.000Z",
                json!({
                    "atendente": "daniel",
                    "canal": "instagram",
                    "nomeCliente": "Carla",
                    "tipoInteracao": "compra-direta",
                    "produtoVendido": "Bolsa",
                    "valorVenda": "80"
                }),
            ),
            record(
                Category::Cashier,
                "cx-1",
                "2026-03-03T23:59:59.500Z",
                json!({
                    "operador": "kaylane",
                    "nomeCliente": "Paula",
                    "tipoOperacao": "pagamento-compra",
                    "valorTotal": "200",
                    "formaPagamento": "pix"
                }),
            ),
            record(
                Category::Cashier,
                "cx-2",
                "2026-03-04T00:00:00.000Z",
                json!({
                    "operador": "eduarda",
                    "nomeCliente": "Rita",
                    "tipoOperacao": "pagamento-carne",
                    "canalAtendimento": "whatsapp",
                    "valorTotal": "45,50",
                    "formaPagamento": "dinheiro"
                }),
            ),
        ]
    }

    fn ids(records: &[&AttendanceRecord]) -> Vec<String> {
        records.iter().map(|r| r.id.clone()).collect()
    }

    fn run(criteria: &FilterCriteria, data: &[AttendanceRecord]) -> Vec<String> {
        let all: Vec<&AttendanceRecord> = data.iter().collect();
        ids(&criteria.apply(&all))
    }

    #[test]
    fn unconstrained_passes_everything() {
        let data = sample();
        let criteria = FilterCriteria::default();
        assert!(criteria.is_unconstrained());
        assert_eq!(run(&criteria, &data).len(), data.len());
    }

    #[test]
    fn cashier_category_ignores_channel_outside_installments() {
        let data = sample();
        let criteria = FilterCriteria {
            category: Some(Category::Cashier),
            channel: Some("loja-fisica".into()),
            ..Default::default()
        };
        // cx-1 has no channel field and passes; cx-2 carries whatsapp and fails.
        assert_eq!(run(&criteria, &data), vec!["cx-1"]);

        let criteria = FilterCriteria {
            category: Some(Category::Cashier),
            channel: Some("whatsapp".into()),
            ..Default::default()
        };
        assert_eq!(run(&criteria, &data), vec!["cx-1", "cx-2"]);
    }

    #[test]
    fn staff_and_sub_type_resolve_per_category() {
        let data = sample();
        let by_staff = FilterCriteria {
            staff: Some("daniel".into()),
            ..Default::default()
        };
        assert_eq!(run(&by_staff, &data), vec!["wi-1"]);

        let by_sub_type = FilterCriteria {
            sub_type: Some("pagamento-carne".into()),
            ..Default::default()
        };
        assert_eq!(run(&by_sub_type, &data), vec!["cx-2"]);
    }

    #[test]
    fn search_covers_name_and_product_but_not_notes() {
        let data = sample();
        let search = |term: &str| {
            run(
                &FilterCriteria {
                    search: Some(term.into()),
                    ..Default::default()
                },
                &data,
            )
        };
        assert_eq!(search("sandália"), vec!["lf-2"]);
        assert_eq!(search("FLORAL"), vec!["lf-1"]);
        assert_eq!(search("maria"), vec!["lf-1"]);
        assert!(search("embrulho").is_empty());
    }

    #[test]
    fn value_range_skips_records_without_monetary_field() {
        let data = sample();
        let criteria = FilterCriteria {
            min_value: Some(100.0),
            max_value: Some(180.0),
            ..Default::default()
        };
        // lf-2 has no monetary field; the others are outside the range.
        assert_eq!(run(&criteria, &data), vec!["lf-1", "lf-2"]);

        let only_min = FilterCriteria {
            min_value: Some(46.0),
            ..Default::default()
        };
        assert_eq!(run(&only_min, &data), vec!["lf-1", "lf-2", "wi-1", "cx-1"]);
    }

    #[test]
    fn end_date_is_inclusive_through_end_of_day() {
        let data = sample();
        let criteria = FilterCriteria {
            start_date: NaiveDate::from_ymd_opt(2026, 3, 2),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 3),
            ..Default::default()
        };
        assert_eq!(run(&criteria, &data), vec!["lf-2", "wi-1", "cx-1"]);
    }

    #[test]
    fn criteria_commute() {
        let data = sample();
        let all: Vec<&AttendanceRecord> = data.iter().collect();
        let parts = [
            FilterCriteria {
                category: Some(Category::InPerson),
                ..Default::default()
            },
            FilterCriteria {
                search: Some("a".into()),
                ..Default::default()
            },
            FilterCriteria {
                min_value: Some(10.0),
                ..Default::default()
            },
            FilterCriteria {
                end_date: NaiveDate::from_ymd_opt(2026, 3, 2),
                ..Default::default()
            },
        ];

        let forward = parts.iter().fold(all.clone(), |acc, c| c.apply(&acc));
        let backward = parts.iter().rev().fold(all.clone(), |acc, c| c.apply(&acc));
        let combined = FilterCriteria {
            category: Some(Category::InPerson),
            search: Some("a".into()),
            min_value: Some(10.0),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 2),
            ..Default::default()
        };
        assert_eq!(ids(&forward), ids(&backward));
        assert_eq!(ids(&forward), ids(&combined.apply(&all)));
        assert_eq!(ids(&forward), vec!["lf-1", "lf-2"]);
    }

    #[test]
    fn unreadable_sale_value_is_not_constrained_by_value_range() {
        let sale = |id: &str, value: &str| {
            record(
                Category::InPerson,
                id,
                "2026-03-05T12:00:00.000Z",
                json!({
                    "vendedor": "daniele",
                    "canalAtendimento": "presencial",
                    "nomeCliente": "Bia",
                    "tipoAtendimento": "venda-concluida",
                    "produtoVendido": "Saia",
                    "valorVenda": value
                }),
            )
        };
        let data = vec![
            sale("lf-na", "n/a"),
            sale("lf-empty", ""),
            sale("lf-low", "20"),
            sale("lf-high", "90"),
        ];
        let criteria = FilterCriteria {
            min_value: Some(50.0),
            ..Default::default()
        };
        assert_eq!(run(&criteria, &data), vec!["lf-na", "lf-empty", "lf-high"]);

        let criteria = FilterCriteria {
            max_value: Some(50.0),
            ..Default::default()
        };
        assert_eq!(run(&criteria, &data), vec!["lf-na", "lf-empty", "lf-low"]);
    }
}
