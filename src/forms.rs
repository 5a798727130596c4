//! Attendance forms.
//!
//! One parameterised form drives all three categories: each category has a
//! static [`FormSpec`] listing its fields in display order, which fields are
//! required, and which only appear for certain values of an earlier field.
//! `build_payload` turns raw form input into the payload handed to the store.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::StaffMember;
use crate::error::FormError;
use crate::records::{sub_type, Category, Choice, PAYMENT_METHODS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Select,
    Radio,
    Text,
    Number,
    TextArea,
}

/// Field is shown only while `field` holds one of `any_of`.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub field: &'static str,
    pub any_of: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub options: &'static [Choice],
    pub required: bool,
    pub default: Option<&'static str>,
    pub visible_when: Option<Condition>,
    /// Options come from the configured staff roster.
    pub staff_roster: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSpec {
    pub category: Category,
    pub title: &'static str,
    pub fields: &'static [FieldSpec],
}

const fn field(name: &'static str, label: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        label,
        kind,
        options: &[],
        required: false,
        default: None,
        visible_when: None,
        staff_roster: false,
    }
}

impl FieldSpec {
    const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    const fn options(mut self, options: &'static [Choice]) -> Self {
        self.options = options;
        self
    }

    const fn with_default(mut self, value: &'static str) -> Self {
        self.default = Some(value);
        self
    }

    const fn when(mut self, field: &'static str, any_of: &'static [&'static str]) -> Self {
        self.visible_when = Some(Condition { field, any_of });
        self
    }

    const fn roster(mut self) -> Self {
        self.staff_roster = true;
        self
    }
}

const YES_NO: &[Choice] = &[
    Choice {
        value: "sim",
        label: "Sim",
    },
    Choice {
        value: "nao",
        label: "Não",
    },
];

const EXCHANGE_KINDS: &[Choice] = &[
    Choice {
        value: "troca-tamanho",
        label: "Troca de Tamanho",
    },
    Choice {
        value: "troca-produto",
        label: "Troca por Outro Produto",
    },
];

use FieldKind::{Number, Radio, Select, Text, TextArea};

const IN_PERSON_FIELDS: &[FieldSpec] = &[
    field("vendedor", "Vendedor(a)", Select).roster().required(),
    field("canalAtendimento", "Canal de Atendimento", Radio)
        .options(Category::InPerson.channels())
        .with_default("presencial"),
    field("nomeCliente", "Nome do Cliente", Text).required(),
    field("contato", "Contato", Text),
    field("tipoAtendimento", "Tipo de Atendimento", Select)
        .options(Category::InPerson.sub_types())
        .required(),
    field("produtoVendido", "Produto Vendido", Text)
        .required()
        .when("tipoAtendimento", &[sub_type::COMPLETED_SALE]),
    field("valorVenda", "Valor da Venda (R$)", Number)
        .required()
        .when("tipoAtendimento", &[sub_type::COMPLETED_SALE]),
    field("produtoInteresse", "Produto de Interesse", Text)
        .required()
        .when("tipoAtendimento", &[sub_type::LOST_SALE]),
    field("motivoNaoCompra", "Motivo da Não Compra", TextArea)
        .required()
        .when("tipoAtendimento", &[sub_type::LOST_SALE]),
    field("tipoTroca", "Tipo de Troca", Select)
        .options(EXCHANGE_KINDS)
        .required()
        .when("tipoAtendimento", &[sub_type::EXCHANGE]),
    field("tamanhoAntigo", "Tamanho que não serviu", Text)
        .required()
        .when("tipoTroca", &["troca-tamanho"]),
    field("tamanhoNovo", "Tamanho novo", Text)
        .required()
        .when("tipoTroca", &["troca-tamanho"]),
    field("produtoAntigo", "Produto Antigo", Text)
        .required()
        .when("tipoTroca", &["troca-produto"]),
    field("produtoNovo", "Produto Novo", Text)
        .required()
        .when("tipoTroca", &["troca-produto"]),
    field("produtosProva", "Produtos para Prova", TextArea)
        .required()
        .when("tipoAtendimento", &[sub_type::FITTING]),
    field("valorTotalProva", "Valor Total da Prova (R$)", Number)
        .required()
        .when("tipoAtendimento", &[sub_type::FITTING]),
    field("observacoes", "Observações", TextArea),
];

const SOCIAL_FIELDS: &[FieldSpec] = &[
    field("atendente", "Atendente", Select).roster().required(),
    field("canal", "Canal", Radio)
        .options(Category::SocialChannel.channels())
        .required(),
    field("nomeCliente", "Nome do Cliente", Text).required(),
    field("contato", "Contato", Text),
    field("tipoInteracao", "Tipo de Interação", Select)
        .options(Category::SocialChannel.sub_types())
        .required(),
    field("produtoVendido", "Produto Vendido", Text)
        .required()
        .when("tipoInteracao", &[sub_type::DIRECT_PURCHASE]),
    field("valorVenda", "Valor da Venda (R$)", Number)
        .required()
        .when("tipoInteracao", &[sub_type::DIRECT_PURCHASE]),
    field("produtoInteresse", "Produto de Interesse", Text)
        .required()
        .when("tipoInteracao", &[sub_type::INFO_REQUEST]),
    field("produtosProva", "Produtos para Prova", TextArea)
        .required()
        .when("tipoInteracao", &[sub_type::FITTING]),
    field("valorTotalProva", "Valor Total da Prova (R$)", Number)
        .required()
        .when("tipoInteracao", &[sub_type::FITTING]),
    field("clienteCadastrado", "Cliente Cadastrado", Select).options(YES_NO),
    field("observacoes", "Observações", TextArea),
];

const CASHIER_FIELDS: &[FieldSpec] = &[
    field("operador", "Operador(a) de Caixa", Select).roster().required(),
    field("nomeCliente", "Nome do Cliente", Text).required(),
    field("tipoOperacao", "Tipo de Operação", Radio)
        .options(Category::Cashier.sub_types())
        .required(),
    field("canalAtendimento", "Canal de Atendimento", Radio)
        .options(Category::Cashier.channels())
        .with_default("loja-fisica")
        .required()
        .when(
            "tipoOperacao",
            &[sub_type::INSTALLMENT_CHECK, sub_type::INSTALLMENT_PAYMENT],
        ),
    field("tipoTroca", "Tipo de Troca", Select)
        .options(EXCHANGE_KINDS)
        .required()
        .when("tipoOperacao", &[sub_type::EXCHANGE]),
    field("tamanhoAntigo", "Tamanho que não serviu", Text)
        .required()
        .when("tipoTroca", &["troca-tamanho"]),
    field("tamanhoNovo", "Tamanho novo", Text)
        .required()
        .when("tipoTroca", &["troca-tamanho"]),
    field("produtoAntigo", "Produto Antigo", Text)
        .required()
        .when("tipoTroca", &["troca-produto"]),
    field("produtoNovo", "Produto Novo", Text)
        .required()
        .when("tipoTroca", &["troca-produto"]),
    field("parcelaPaga", "Parcela foi paga?", Select)
        .options(YES_NO)
        .required()
        .when("tipoOperacao", &[sub_type::INSTALLMENT_CHECK]),
    field("valorTotal", "Valor Total (R$)", Number).required(),
    field("formaPagamento", "Forma de Pagamento", Select)
        .options(PAYMENT_METHODS)
        .required(),
    field("observacoes", "Observações", TextArea),
];

const IN_PERSON_FORM: FormSpec = FormSpec {
    category: Category::InPerson,
    title: "Loja Física",
    fields: IN_PERSON_FIELDS,
};

const SOCIAL_FORM: FormSpec = FormSpec {
    category: Category::SocialChannel,
    title: "WhatsApp/Instagram",
    fields: SOCIAL_FIELDS,
};

const CASHIER_FORM: FormSpec = FormSpec {
    category: Category::Cashier,
    title: "Caixa",
    fields: CASHIER_FIELDS,
};

pub fn form_spec(category: Category) -> &'static FormSpec {
    match category {
        Category::InPerson => &IN_PERSON_FORM,
        Category::SocialChannel => &SOCIAL_FORM,
        Category::Cashier => &CASHIER_FORM,
    }
}

/// Form description for the presentation layer, with the staff select filled
/// from the roster members working in `category`.
pub fn describe_form(category: Category, roster: &[StaffMember]) -> Value {
    let spec = form_spec(category);
    let staff_options: Vec<Value> = roster
        .iter()
        .filter(|m| m.works_in(category))
        .map(|m| serde_json::json!({ "value": m.id, "label": m.label }))
        .collect();

    let fields: Vec<Value> = spec
        .fields
        .iter()
        .map(|f| {
            let mut v = serde_json::to_value(f).unwrap_or(Value::Null);
            if f.staff_roster {
                v["options"] = Value::Array(staff_options.clone());
            }
            if let Value::Object(ref mut obj) = v {
                obj.remove("staffRoster");
            }
            v
        })
        .collect();

    serde_json::json!({
        "category": category.as_str(),
        "title": spec.title,
        "fields": fields,
    })
}

fn input_value(input: &Map<String, Value>, name: &str) -> Option<Value> {
    match input.get(name)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| Value::String(trimmed.to_string()))
        }
        Value::Number(n) => Some(Value::Number(n.clone())),
        _ => None,
    }
}

/// Validate `input` against the category form and build the store payload.
///
/// Hidden fields are dropped, visible optional fields default to `""`, and the
/// first visible required field without a value fails the submission.
pub fn build_payload(category: Category, input: &Value) -> Result<Map<String, Value>, FormError> {
    let input = input.as_object().ok_or(FormError::NotAnObject)?;
    let spec = form_spec(category);
    let mut payload = Map::new();

    for f in spec.fields {
        if let Some(cond) = f.visible_when {
            let current = payload.get(cond.field).and_then(Value::as_str).unwrap_or("");
            if !cond.any_of.contains(&current) {
                continue;
            }
        }

        let value = input_value(input, f.name)
            .or_else(|| f.default.map(|d| Value::String(d.to_string())));
        match value {
            Some(v) => {
                payload.insert(f.name.to_string(), v);
            }
            None if f.required => {
                return Err(FormError::MissingRequired {
                    field: f.name.to_string(),
                    label: f.label.to_string(),
                });
            }
            None => {
                payload.insert(f.name.to_string(), Value::String(String::new()));
            }
        }
    }

    Ok(payload)
}
