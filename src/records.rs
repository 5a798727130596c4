//! Attendance record model.
//!
//! Three categories of record share one spine (customer name, timestamps,
//! "who handled it", "what kind of interaction") but name those fields
//! differently. Every component that needs a field goes through
//! [`field_key`], the single `(category, sub-type, logical field) -> key`
//! table, instead of branching on category strings itself.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Stored key holding the RFC 3339 creation time.
pub const TIMESTAMP_KEY: &str = "timestamp";
/// Stored key holding the creation time in epoch milliseconds.
pub const CREATED_AT_KEY: &str = "createdAt";
/// Key carrying the source category on merged/exported rows.
pub const CATEGORY_KEY: &str = "setor";
pub const ID_KEY: &str = "id";
pub const CUSTOMER_NAME_KEY: &str = "nomeCliente";

// ---------------------------------------------------------------------------
// Vocabularies
// ---------------------------------------------------------------------------

pub mod sub_type {
    pub const COMPLETED_SALE: &str = "venda-concluida";
    pub const LOST_SALE: &str = "venda-nao-concluida";
    pub const EXCHANGE: &str = "troca";
    pub const FITTING: &str = "prova";
    pub const INFO_REQUEST: &str = "pedido-informacao";
    pub const DIRECT_PURCHASE: &str = "compra-direta";
    pub const PURCHASE_PAYMENT: &str = "pagamento-compra";
    pub const INSTALLMENT_CHECK: &str = "consulta-parcela";
    pub const INSTALLMENT_PAYMENT: &str = "pagamento-carne";
}

/// A stored value and the label shown for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub value: &'static str,
    pub label: &'static str,
}

const fn choice(value: &'static str, label: &'static str) -> Choice {
    Choice { value, label }
}

const IN_PERSON_SUB_TYPES: &[Choice] = &[
    choice(sub_type::COMPLETED_SALE, "Venda Concluída"),
    choice(sub_type::LOST_SALE, "Venda não Concluída"),
    choice(sub_type::EXCHANGE, "Troca"),
    choice(sub_type::FITTING, "Prova"),
];

const SOCIAL_SUB_TYPES: &[Choice] = &[
    choice(sub_type::INFO_REQUEST, "Pedido de Informação"),
    choice(sub_type::DIRECT_PURCHASE, "Compra Direta"),
    choice(sub_type::FITTING, "Prova"),
];

const CASHIER_SUB_TYPES: &[Choice] = &[
    choice(sub_type::PURCHASE_PAYMENT, "Pagamento de Compra"),
    choice(sub_type::EXCHANGE, "Troca"),
    choice(sub_type::INSTALLMENT_CHECK, "Consulta de Parcela"),
    choice(sub_type::INSTALLMENT_PAYMENT, "Pagamento de Carnê"),
];

const IN_PERSON_CHANNELS: &[Choice] = &[
    choice("presencial", "Presencial"),
    choice("whatsapp", "WhatsApp"),
];

const SOCIAL_CHANNELS: &[Choice] = &[
    choice("instagram", "Instagram"),
    choice("whatsapp", "WhatsApp"),
    choice("facebook", "Facebook"),
];

const CASHIER_CHANNELS: &[Choice] = &[
    choice("loja-fisica", "Loja Física"),
    choice("whatsapp", "WhatsApp"),
];

pub const PAYMENT_METHODS: &[Choice] = &[
    choice("dinheiro", "Dinheiro"),
    choice("cartao-credito", "Cartão de Crédito"),
    choice("cartao-debito", "Cartão de Débito"),
    choice("pix", "PIX"),
    choice("transferencia", "Transferência"),
];

fn label_in(choices: &[Choice], value: &str) -> Option<&'static str> {
    choices.iter().find(|c| c.value == value).map(|c| c.label)
}

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// Source category of a record. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "loja-fisica", alias = "in-person")]
    InPerson,
    #[serde(rename = "whatsapp-instagram", alias = "social-channel")]
    SocialChannel,
    #[serde(rename = "caixa", alias = "cashier")]
    Cashier,
}

impl Category {
    pub const ALL: [Category; 3] = [Self::InPerson, Self::SocialChannel, Self::Cashier];

    /// Stored tag, also the collection path segment.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InPerson => "loja-fisica",
            Self::SocialChannel => "whatsapp-instagram",
            Self::Cashier => "caixa",
        }
    }

    /// Accepts the stored tag or the logical name.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "loja-fisica" | "in-person" => Some(Self::InPerson),
            "whatsapp-instagram" | "social-channel" => Some(Self::SocialChannel),
            "caixa" | "cashier" => Some(Self::Cashier),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::InPerson => "Loja Física",
            Self::SocialChannel => "WhatsApp/Instagram",
            Self::Cashier => "Caixa",
        }
    }

    /// Full collection path under `root`, e.g. `atendimentos/caixa`.
    pub fn collection(self, root: &str) -> String {
        let root = root.trim().trim_matches('/');
        if root.is_empty() {
            self.as_str().to_string()
        } else {
            format!("{root}/{}", self.as_str())
        }
    }

    pub const fn sub_types(self) -> &'static [Choice] {
        match self {
            Self::InPerson => IN_PERSON_SUB_TYPES,
            Self::SocialChannel => SOCIAL_SUB_TYPES,
            Self::Cashier => CASHIER_SUB_TYPES,
        }
    }

    pub const fn channels(self) -> &'static [Choice] {
        match self {
            Self::InPerson => IN_PERSON_CHANNELS,
            Self::SocialChannel => SOCIAL_CHANNELS,
            Self::Cashier => CASHIER_CHANNELS,
        }
    }

    pub fn sub_type_label(self, value: &str) -> Option<&'static str> {
        label_in(self.sub_types(), value)
    }

    pub fn channel_label(self, value: &str) -> Option<&'static str> {
        label_in(self.channels(), value)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn payment_method_label(value: &str) -> Option<&'static str> {
    label_in(PAYMENT_METHODS, value)
}

// ---------------------------------------------------------------------------
// Field resolution
// ---------------------------------------------------------------------------

/// Category-independent name of a field a consumer wants to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalField {
    Staff,
    SubType,
    Channel,
    ProductSold,
    ProductOfInterest,
    FittingProducts,
    MonetaryValue,
    PaymentMethod,
}

/// Concrete key of `field` for a record of `category` whose sub-type is
/// `sub_type`. `None` means the record has no such field. Total over every
/// input, including unknown sub-types.
pub fn field_key(
    category: Category,
    sub_type: Option<&str>,
    field: LogicalField,
) -> Option<&'static str> {
    use self::sub_type::*;
    use Category::*;
    use LogicalField::*;

    let st = sub_type.unwrap_or("");
    match (category, field) {
        (InPerson, Staff) => Some("vendedor"),
        (SocialChannel, Staff) => Some("atendente"),
        (Cashier, Staff) => Some("operador"),

        (InPerson, SubType) => Some("tipoAtendimento"),
        (SocialChannel, SubType) => Some("tipoInteracao"),
        (Cashier, SubType) => Some("tipoOperacao"),

        (InPerson, Channel) => Some("canalAtendimento"),
        (SocialChannel, Channel) => Some("canal"),
        (Cashier, Channel) if st == INSTALLMENT_CHECK || st == INSTALLMENT_PAYMENT => {
            Some("canalAtendimento")
        }

        (InPerson, ProductSold) if st == COMPLETED_SALE => Some("produtoVendido"),
        (SocialChannel, ProductSold) if st == DIRECT_PURCHASE => Some("produtoVendido"),

        (InPerson, ProductOfInterest) if st == LOST_SALE => Some("produtoInteresse"),
        (SocialChannel, ProductOfInterest) if st == INFO_REQUEST => Some("produtoInteresse"),

        (InPerson | SocialChannel, FittingProducts) if st == FITTING => Some("produtosProva"),

        (InPerson, MonetaryValue) if st == COMPLETED_SALE => Some("valorVenda"),
        (SocialChannel, MonetaryValue) if st == DIRECT_PURCHASE => Some("valorVenda"),
        (Cashier, MonetaryValue) => Some("valorTotal"),

        (Cashier, PaymentMethod) => Some("formaPagamento"),

        _ => None,
    }
}

/// Read a number from a JSON number or a numeric string (`"10.5"`, `"10,5"`).
pub fn number_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            let normalized = if trimmed.contains(',') && !trimmed.contains('.') {
                trimmed.replace(',', ".")
            } else {
                trimmed.to_string()
            };
            normalized.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// AttendanceRecord
// ---------------------------------------------------------------------------

/// One loaded record: store key, authoritative category, and the stored
/// payload (timestamps included) in write order.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRecord {
    pub id: String,
    pub category: Category,
    pub fields: Map<String, Value>,
}

impl AttendanceRecord {
    /// Build from a stored `(key, payload)` pair. Returns `None` for payloads
    /// that are not JSON objects. Any `id` / `setor` inside the payload is
    /// discarded; the store key and source collection are authoritative.
    pub fn from_stored(category: Category, id: impl Into<String>, payload: Value) -> Option<Self> {
        let Value::Object(mut fields) = payload else {
            return None;
        };
        fields.shift_remove(ID_KEY);
        fields.shift_remove(CATEGORY_KEY);
        Some(Self {
            id: id.into(),
            category,
            fields,
        })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Trimmed, non-empty string value of `key`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn created_at_iso(&self) -> Option<&str> {
        self.get_str(TIMESTAMP_KEY)
    }

    pub fn created_at_ms(&self) -> Option<i64> {
        self.fields.get(CREATED_AT_KEY).and_then(Value::as_i64)
    }

    /// Creation instant from `timestamp`, falling back to `createdAt`.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at_iso()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| {
                self.created_at_ms()
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            })
    }

    /// UTC calendar date of creation.
    pub fn created_date(&self) -> Option<NaiveDate> {
        self.created_at().map(|dt| dt.date_naive())
    }

    pub fn customer_name(&self) -> Option<&str> {
        self.get_str(CUSTOMER_NAME_KEY)
    }

    pub fn sub_type(&self) -> Option<&str> {
        field_key(self.category, None, LogicalField::SubType).and_then(|key| self.get_str(key))
    }

    /// Key of `field` for this record, if the record has such a field.
    pub fn key_of(&self, field: LogicalField) -> Option<&'static str> {
        field_key(self.category, self.sub_type(), field)
    }

    /// Raw value of `field`; `None` when the field does not exist for this
    /// record or is absent from the payload.
    pub fn resolve(&self, field: LogicalField) -> Option<&Value> {
        self.key_of(field).and_then(|key| self.fields.get(key))
    }

    pub fn resolve_str(&self, field: LogicalField) -> Option<&str> {
        self.key_of(field).and_then(|key| self.get_str(key))
    }

    pub fn staff(&self) -> Option<&str> {
        self.resolve_str(LogicalField::Staff)
    }

    pub fn channel(&self) -> Option<&str> {
        self.resolve_str(LogicalField::Channel)
    }

    pub fn product_sold(&self) -> Option<&str> {
        self.resolve_str(LogicalField::ProductSold)
    }

    pub fn product_of_interest(&self) -> Option<&str> {
        self.resolve_str(LogicalField::ProductOfInterest)
    }

    /// Product matched by free-text search: sold or of interest.
    pub fn search_product(&self) -> Option<&str> {
        self.product_sold().or_else(|| self.product_of_interest())
    }

    /// Product shown in tables: sold, of interest, or the fitting list.
    pub fn display_product(&self) -> Option<&str> {
        self.search_product()
            .or_else(|| self.resolve_str(LogicalField::FittingProducts))
    }

    pub fn payment_method(&self) -> Option<&str> {
        self.resolve_str(LogicalField::PaymentMethod)
    }

    /// Parsed monetary value; `None` when there is no monetary field or the
    /// stored value is missing or not numeric.
    pub fn monetary_value(&self) -> Option<f64> {
        self.resolve(LogicalField::MonetaryValue)
            .and_then(number_from_value)
    }

    /// Completed in-person sale or social-channel direct purchase. Cashier
    /// payments settle earlier sales and are not new sales.
    pub fn is_sale_concluded(&self) -> bool {
        matches!(
            (self.category, self.sub_type()),
            (Category::InPerson, Some(sub_type::COMPLETED_SALE))
                | (Category::SocialChannel, Some(sub_type::DIRECT_PURCHASE))
        )
    }

    /// Whether this record contributes to the total sale value.
    pub fn counts_toward_sale_value(&self) -> bool {
        self.is_sale_concluded()
            || (self.category == Category::Cashier
                && self.sub_type() == Some(sub_type::PURCHASE_PAYMENT))
    }

    /// Contribution to the total sale value (zero when missing or not numeric).
    pub fn sale_value(&self) -> f64 {
        if self.counts_toward_sale_value() {
            self.monetary_value().unwrap_or(0.0)
        } else {
            0.0
        }
    }

    /// Flat row: `id`, the stored fields in order, then the category tag.
    pub fn to_row(&self) -> Map<String, Value> {
        let mut row = Map::with_capacity(self.fields.len() + 2);
        row.insert(ID_KEY.to_string(), Value::String(self.id.clone()));
        for (k, v) in &self.fields {
            row.insert(k.clone(), v.clone());
        }
        row.insert(
            CATEGORY_KEY.to_string(),
            Value::String(self.category.as_str().to_string()),
        );
        row
    }
}
